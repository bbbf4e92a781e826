use epg_common::Currency;
use ethers::types::Address;

#[allow(async_fn_in_trait)]
pub trait CurrencyManagement: Clone {
    type Error: std::error::Error;

    /// Stores the currency if no currency with the same `(chain_id, address)` exists yet, and returns the stored
    /// record. An existing record is returned unchanged, even if its metadata differs from `currency`.
    async fn fetch_or_create_currency(&self, currency: Currency) -> Result<Currency, Self::Error>;

    async fn fetch_currency(&self, chain_id: u64, address: &Address) -> Result<Option<Currency>, Self::Error>;

    /// All currencies registered on the chain, native currency included.
    async fn fetch_currencies(&self, chain_id: u64) -> Result<Vec<Currency>, Self::Error>;
}

use epg_common::{Currency, TokenAmount};
use ethers::types::Address;

use crate::db_types::{BalanceEntry, InsertResult, NewBalanceEntry};

#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    type Error: std::error::Error;

    /// Appends an entry to the ledger. Entries are unique per `(account, currency, source_reference)`. If a matching
    /// entry already exists, nothing is written and the existing entry is returned as
    /// [`InsertResult::AlreadyExists`]. The uniqueness check and the insert are one atomic operation.
    async fn insert_balance_entry(&self, entry: NewBalanceEntry) -> Result<InsertResult<BalanceEntry>, Self::Error>;

    async fn fetch_balance_entries(
        &self,
        account: &Address,
        currency: &Currency,
    ) -> Result<Vec<BalanceEntry>, Self::Error>;

    /// The sum of all entries for the account in the given currency. Zero if there are none.
    async fn fetch_balance(&self, account: &Address, currency: &Currency) -> Result<TokenAmount, Self::Error> {
        let entries = self.fetch_balance_entries(account, currency).await?;
        Ok(TokenAmount::aggregate(entries.iter().map(|e| &e.amount), currency))
    }
}

use ethers::types::Address;

use crate::wallets::CustodialAccount;

#[allow(async_fn_in_trait)]
pub trait CustodialAccountManagement: Clone {
    type Error: std::error::Error;

    async fn insert_custodial_account(&self, account: &CustodialAccount) -> Result<(), Self::Error>;

    async fn fetch_custodial_account(&self, address: &Address) -> Result<Option<CustodialAccount>, Self::Error>;

    async fn fetch_custodial_accounts(&self) -> Result<Vec<CustodialAccount>, Self::Error>;

    /// The lowest derivation index that is not yet used by a derived account.
    async fn next_derivation_index(&self) -> Result<u32, Self::Error>;
}

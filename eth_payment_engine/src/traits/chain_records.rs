use ethers::types::H256;

use crate::chain::{ConfirmedLog, ConfirmedTransaction};

#[allow(async_fn_in_trait)]
pub trait ChainRecordManagement: Clone {
    type Error: std::error::Error;

    /// Stores the transaction. Returns `false` if it had already been stored.
    async fn insert_transaction(&self, tx: &ConfirmedTransaction) -> Result<bool, Self::Error>;

    async fn fetch_transaction(&self, hash: &H256) -> Result<Option<ConfirmedTransaction>, Self::Error>;

    /// The highest block number among the stored transactions, or `None` if nothing has been ingested yet.
    async fn fetch_confirmed_height(&self) -> Result<Option<u64>, Self::Error>;

    /// Stores the log. Returns `false` if it had already been stored.
    async fn insert_log(&self, log: &ConfirmedLog) -> Result<bool, Self::Error>;

    /// The logs of the transaction, in log index order.
    async fn fetch_logs(&self, transaction_hash: &H256) -> Result<Vec<ConfirmedLog>, Self::Error>;
}

use ethers::types::{Address, H256};

use crate::db_types::{InsertResult, NewBalanceEntry, NewTransfer, Transfer};

/// Outbound transfers. A transfer starts `Pending` and is moved to `Confirmed` or `Failed` exactly once. All the
/// state-changing methods fail if the transfer is no longer pending.
#[allow(async_fn_in_trait)]
pub trait TransferManagement: Clone {
    type Error: std::error::Error;

    /// Stores a pending transfer. Transfers are unique by reference; a repeated request returns the stored transfer.
    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<InsertResult<Transfer>, Self::Error>;

    async fn fetch_transfer(&self, id: i64) -> Result<Option<Transfer>, Self::Error>;

    async fn fetch_transfer_by_reference(&self, reference: &str) -> Result<Option<Transfer>, Self::Error>;

    /// Pending transfers that have not been broadcast yet and are not claimed by an executor.
    async fn fetch_unsubmitted_transfers(&self) -> Result<Vec<Transfer>, Self::Error>;

    /// Pending transfers that have been broadcast and are waiting for a receipt.
    async fn fetch_submitted_transfers(&self) -> Result<Vec<Transfer>, Self::Error>;

    /// Atomically takes a pending, unsubmitted transfer over for broadcast. Returns `false` if the transfer is
    /// already claimed, already broadcast, or no longer pending.
    async fn claim_transfer(&self, id: i64) -> Result<bool, Self::Error>;

    /// Releases the claim on a transfer that was not broadcast, so it can be executed again.
    async fn release_transfer_claim(&self, id: i64) -> Result<(), Self::Error>;

    async fn mark_transfer_submitted(&self, id: i64, sender: &Address, hash: &H256) -> Result<Transfer, Self::Error>;

    async fn mark_transfer_failed(&self, id: i64, reason: &str) -> Result<Transfer, Self::Error>;

    /// Atomically appends the debits to the ledger and marks the transfer `Confirmed`.
    async fn confirm_transfer(&self, id: i64, debits: Vec<NewBalanceEntry>) -> Result<Transfer, Self::Error>;
}

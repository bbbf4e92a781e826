//! # Chain boundary
//!
//! Everything the engine knows about the chain arrives through the types and traits in this module. The engine never
//! talks to a node directly. Confirmed transactions and logs are pushed in through [`crate::ChainFeedApi`], while
//! chain state (gas price, nonces, the block height), broadcasting and receipts are reached through the
//! [`ChainState`], [`Broadcaster`] and [`ReceiptSource`] traits. The server crate implements these over JSON-RPC; the
//! test utilities provide an in-memory implementation.
mod abi;
mod decoder;
mod types;

pub use abi::{encode_transfer_data, TRANSFER_SELECTOR};
pub use decoder::{DecodedTransfer, TransferDecoder};
use ethers::types::{Address, Bytes, H256, U256};
use thiserror::Error;
pub use types::{ConfirmedLog, ConfirmedTransaction, TransferReceipt};

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Chain request failed: {0}")]
    RequestFailed(String),
    #[error("Unexpected response from the chain: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    #[error("Transaction nonce is too low: {0}")]
    NonceTooLow(String),
    #[error("Transaction was rejected: {0}")]
    Rejected(String),
    #[error("Could not reach the chain: {0}")]
    Unavailable(String),
}

/// Read access to the live state of the chain.
#[allow(async_fn_in_trait)]
pub trait ChainState {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    /// The nonce the next transaction sent from `address` must carry. This includes transactions still in the
    /// mempool.
    async fn next_nonce(&self, address: &Address) -> Result<U256, ChainError>;

    async fn current_block(&self) -> Result<u64, ChainError>;
}

#[allow(async_fn_in_trait)]
pub trait Broadcaster {
    /// Submits a signed, RLP-encoded transaction and returns its hash.
    async fn submit(&self, raw_transaction: Bytes) -> Result<H256, BroadcastError>;
}

#[allow(async_fn_in_trait)]
pub trait ReceiptSource {
    /// Returns the receipt for the transaction, or `None` if it has not been mined yet.
    async fn receipt(&self, transaction_hash: &H256) -> Result<Option<TransferReceipt>, ChainError>;
}

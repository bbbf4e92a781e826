use std::fmt::Display;

use epg_common::{AmountError, TokenAmount};
use ethers::types::H256;
use thiserror::Error;

use crate::{
    chain::ChainError,
    db_types::{OrderStatusType, RouteType, TransferStatus},
    wallets::CustodyError,
};

/// Storage errors are reported as text, so that the API errors do not depend on the backend in use.
macro_rules! database_error {
    ($name:ident) => {
        impl $name {
            pub(crate) fn database<E: Display>(e: E) -> Self {
                $name::DatabaseError(e.to_string())
            }
        }
    };
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Ledger amounts cannot be negative. Got {0}")]
    NegativeAmount(TokenAmount),
}

database_error!(LedgerError);

#[derive(Debug, Clone, Error)]
pub enum DepositWatcherError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

database_error!(DepositWatcherError);

#[derive(Debug, Clone, Error)]
pub enum ChainFeedError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0}")]
    WatcherError(#[from] DepositWatcherError),
}

database_error!(ChainFeedError);

#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Order #{order_id} is {status}, not open")]
    OrderNotOpen { order_id: i64, status: OrderStatusType },
    #[error("Order #{order_id} has no open {route_type} route")]
    NoOpenRoute { order_id: i64, route_type: RouteType },
    #[error("Payment route #{0} has expired")]
    RouteExpired(i64),
    #[error("Every custodial account is already bound to an open route")]
    NoAvailableAccount,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0}")]
    AmountError(#[from] AmountError),
}

database_error!(RouteError);

#[derive(Debug, Clone, Error)]
pub enum WalletApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} is not an ERC20 token")]
    NotAToken(String),
    #[error("{0}")]
    CustodyError(#[from] CustodyError),
}

database_error!(WalletApiError);

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Invalid transfer request: {0}")]
    InvalidTransfer(String),
    #[error("Currency {0} is not registered")]
    UnknownCurrency(String),
    #[error("Transfer #{0} does not exist")]
    TransferNotFound(i64),
    #[error("Transfer #{0} is {1}, not pending")]
    TransferNotPending(i64, TransferStatus),
    #[error("Transfer #{0} has not been broadcast")]
    TransferNotSubmitted(i64),
    #[error("Receipt {receipt:#x} does not belong to transfer #{id}")]
    ReceiptMismatch { id: i64, receipt: H256 },
    #[error("No custodial account holds enough funds to pay {0} plus gas")]
    InsufficientFunds(TokenAmount),
    #[error("Connected to chain {actual}, but the transfer is for chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("{0}")]
    ChainError(#[from] ChainError),
    #[error("{0}")]
    CustodyError(#[from] CustodyError),
    #[error("{0}")]
    AmountError(#[from] AmountError),
    #[error("Transaction was rejected by the network: {0}")]
    BroadcastRejected(String),
    #[error("Transaction could not be broadcast: {0}")]
    BroadcastUnavailable(String),
    #[error("Transaction {0:#x} reverted")]
    TransactionReverted(H256),
    #[error("Transfer #{0} is already being broadcast")]
    TransferInProgress(i64),
    #[error("Transfer #{id} was broadcast in {hash:#x}, but that could not be recorded: {reason}")]
    SubmissionNotRecorded { id: i64, hash: H256, reason: String },
}

database_error!(SettlementError);

impl SettlementError {
    /// True if the transfer is still pending and may succeed if it is executed again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::InsufficientFunds(_) |
                SettlementError::ChainError(_) |
                SettlementError::BroadcastUnavailable(_) |
                SettlementError::DatabaseError(_)
        )
    }
}

#[cfg(test)]
mod test {
    use epg_common::Currency;

    use super::*;

    #[test]
    fn retryable_settlement_errors() {
        let amount = TokenAmount::zero(Currency::ether(1));
        assert!(SettlementError::InsufficientFunds(amount).is_retryable());
        assert!(SettlementError::BroadcastUnavailable("timeout".into()).is_retryable());
        assert!(!SettlementError::BroadcastRejected("insufficient funds for gas".into()).is_retryable());
        assert!(!SettlementError::ChainMismatch { expected: 1, actual: 5 }.is_retryable());
        assert!(!SettlementError::TransactionReverted(H256::zero()).is_retryable());
        assert!(!SettlementError::TransferInProgress(1).is_retryable());
        let unrecorded = SettlementError::SubmissionNotRecorded { id: 1, hash: H256::zero(), reason: "locked".into() };
        assert!(!unrecorded.is_retryable());
    }

    #[test]
    fn database_errors_are_text() {
        let err = LedgerError::database("disk I/O error");
        assert_eq!(err.to_string(), "Database error: disk I/O error");
    }
}

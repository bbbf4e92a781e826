use eth_payment_engine::{LedgerError, RouteError, SettlementError, SqliteDatabaseError, WalletApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The node is on chain {actual}, but the gateway is configured for chain {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
}

impl From<SqliteDatabaseError> for ServerError {
    fn from(e: SqliteDatabaseError) -> Self {
        Self::BackendError(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Unknown currency {0}. Tokens must be listed in EPG_TRACKED_TOKENS")]
    UnknownCurrency(String),
    #[error("Invalid amount {0}")]
    InvalidAmount(String),
    #[error("Invalid address. {0}")]
    InvalidAddress(String),
    #[error("There is no order with reference [{0}]")]
    OrderNotFound(String),
    #[error(transparent)]
    Wallet(#[from] WalletApiError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("Database error. {0}")]
    Database(#[from] SqliteDatabaseError),
}

use epg_common::AmountError;
use thiserror::Error;

use crate::db_types::TransferStatus;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database driver error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Could not run database migrations: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Stored value could not be converted: {0}")]
    ConversionError(String),
    #[error("{0}")]
    AmountError(#[from] AmountError),
    #[error("Currency {0} is not registered")]
    CurrencyNotFound(String),
    #[error("An order with reference {0} already exists")]
    DuplicateOrder(String),
    #[error("Order #{0} does not exist")]
    OrderNotFound(i64),
    #[error("Payment route #{0} does not exist")]
    RouteNotFound(i64),
    #[error("Cannot open route: {0}")]
    RouteAlreadyOpen(String),
    #[error("Transfer #{0} does not exist")]
    TransferNotFound(i64),
    #[error("Transfer #{0} is {1}, not pending")]
    TransferNotPending(i64, TransferStatus),
}

impl From<crate::db_types::ConversionError> for SqliteDatabaseError {
    fn from(e: crate::db_types::ConversionError) -> Self {
        SqliteDatabaseError::ConversionError(e.0)
    }
}

//! # SQLite database methods
//!
//! Low-level SQLite interactions for the payment engine.
//!
//! Every interaction is a plain function (rather than a method on a stateful struct) that accepts a
//! `&mut SqliteConnection`. Callers obtain a connection from the pool, or open an atomic transaction when several
//! calls need to succeed or fail together, and call through to these functions without any other changes.
//!
//! Storage conventions: addresses are stored in checksum casing, hashes as `0x`-prefixed lower-case hex, token
//! amounts as decimal text and `U256` values as decimal integer text. A currency is referenced by its
//! `(chain_id, address)` pair.
use std::{str::FromStr, time::Duration};

use chrono::{DateTime, TimeZone, Utc};
use epg_common::{checksum, parse_address, Currency, Decimal, TokenAmount};
use ethers::types::{Address, H256};
use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

use crate::sqlite::SqliteDatabaseError;

pub mod accounts;
pub mod chain_records;
pub mod currencies;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod routes;
pub mod transfers;

pub const SQLITE_DB_URL: &str = "sqlite://data/epg_store.db";

pub fn db_url() -> String {
    let result = std::env::var("EPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ EPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// The database file is created if it does not exist yet. Its directory must exist.
///
/// Writers wait up to [`BUSY_TIMEOUT`] for each other. Transactions that write must issue a write as their first
/// statement, otherwise SQLite cannot upgrade their read lock while another connection writes.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

pub(crate) fn address_column(address: &Address) -> String {
    checksum(address)
}

pub(crate) fn hash_column(hash: &H256) -> String {
    format!("{hash:#x}")
}

/// Chain ids and block numbers are stored in signed 64-bit columns.
pub(crate) fn int_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_address(value: &str) -> Result<Address, SqliteDatabaseError> {
    parse_address(value).map_err(|e| SqliteDatabaseError::ConversionError(e.to_string()))
}

pub(crate) fn to_hash(value: &str) -> Result<H256, SqliteDatabaseError> {
    let hex_value = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(hex_value).map_err(|e| SqliteDatabaseError::ConversionError(format!("{value}: {e}")))?;
    if bytes.len() != 32 {
        return Err(SqliteDatabaseError::ConversionError(format!("{value} is not a 32-byte hash")));
    }
    Ok(H256::from_slice(&bytes))
}

pub(crate) fn to_u64(value: i64) -> Result<u64, SqliteDatabaseError> {
    u64::try_from(value).map_err(|_| SqliteDatabaseError::ConversionError(format!("{value} is negative")))
}

pub(crate) fn to_timestamp(value: i64) -> Result<DateTime<Utc>, SqliteDatabaseError> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| SqliteDatabaseError::ConversionError(format!("{value} is not a valid timestamp")))
}

/// The currency and amount columns that every amount-carrying row shares.
pub(crate) struct AmountColumns<'a> {
    pub amount: &'a str,
    pub chain_id: i64,
    pub currency_address: &'a str,
    pub code: String,
    pub name: String,
    pub decimals: i64,
}

impl AmountColumns<'_> {
    pub fn into_amount(self) -> Result<TokenAmount, SqliteDatabaseError> {
        let address = to_address(self.currency_address)?;
        let decimals = u32::try_from(self.decimals)
            .map_err(|_| SqliteDatabaseError::ConversionError(format!("{} decimals", self.decimals)))?;
        let currency = Currency::token(to_u64(self.chain_id)?, address, self.code, self.name, decimals);
        let amount = Decimal::from_str(self.amount)
            .map_err(|e| SqliteDatabaseError::ConversionError(format!("{}: {e}", self.amount)))?;
        Ok(TokenAmount::new(amount, currency))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn column_conversions() {
        let hash = H256::repeat_byte(0xab);
        assert_eq!(to_hash(&hash_column(&hash)).unwrap(), hash);
        assert!(to_hash("0x1234").is_err());
        assert_eq!(int_column(u64::MAX), i64::MAX);
        assert!(to_u64(-1).is_err());
        let address = Address::repeat_byte(0x11);
        assert_eq!(to_address(&address_column(&address)).unwrap(), address);
    }

    #[test]
    fn amount_columns() {
        let columns = AmountColumns {
            amount: "0.498",
            chain_id: 1,
            currency_address: epg_common::NULL_ADDRESS,
            code: "ETH".into(),
            name: "Ethereum".into(),
            decimals: 18,
        };
        let amount = columns.into_amount().unwrap();
        assert!(amount.is_native());
        assert_eq!(amount.to_string(), "0.498 ETH");
    }
}

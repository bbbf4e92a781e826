use epg_common::Currency;
use ethers::types::Address;
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, int_column, to_address, to_u64};
use crate::sqlite::SqliteDatabaseError;

#[derive(Debug, FromRow)]
struct CurrencyRow {
    chain_id: i64,
    address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<CurrencyRow> for Currency {
    type Error = SqliteDatabaseError;

    fn try_from(row: CurrencyRow) -> Result<Self, Self::Error> {
        let decimals = u32::try_from(row.decimals)
            .map_err(|_| SqliteDatabaseError::ConversionError(format!("{} decimals", row.decimals)))?;
        Ok(Currency::token(to_u64(row.chain_id)?, to_address(&row.address)?, row.code, row.name, decimals))
    }
}

/// Inserts the currency unless one with the same `(chain_id, address)` already exists, then returns the stored row.
pub async fn fetch_or_create(currency: Currency, conn: &mut SqliteConnection) -> Result<Currency, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"INSERT INTO currencies (chain_id, address, code, name, decimals) VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (chain_id, address) DO NOTHING"#,
    )
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .bind(&currency.code)
    .bind(&currency.name)
    .bind(i64::from(currency.decimals))
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() > 0 {
        debug!("🗃️ Registered currency {currency}");
    }
    fetch(currency.chain_id, &currency.address, conn)
        .await?
        .ok_or_else(|| SqliteDatabaseError::CurrencyNotFound(currency.to_string()))
}

pub async fn fetch(
    chain_id: u64,
    address: &Address,
    conn: &mut SqliteConnection,
) -> Result<Option<Currency>, SqliteDatabaseError> {
    let row: Option<CurrencyRow> = sqlx::query_as(
        "SELECT chain_id, address, code, name, decimals FROM currencies WHERE chain_id = $1 AND address = $2",
    )
    .bind(int_column(chain_id))
    .bind(address_column(address))
    .fetch_optional(conn)
    .await?;
    row.map(Currency::try_from).transpose()
}

pub async fn fetch_for_chain(chain_id: u64, conn: &mut SqliteConnection) -> Result<Vec<Currency>, SqliteDatabaseError> {
    let rows: Vec<CurrencyRow> = sqlx::query_as(
        "SELECT chain_id, address, code, name, decimals FROM currencies WHERE chain_id = $1 ORDER BY id",
    )
    .bind(int_column(chain_id))
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(Currency::try_from).collect()
}

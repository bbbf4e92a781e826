use chrono::{DateTime, Utc};
use epg_common::Currency;
use ethers::types::Address;
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, int_column, to_address, AmountColumns};
use crate::{
    db_types::{BalanceEntry, InsertResult, NewBalanceEntry},
    sqlite::SqliteDatabaseError,
};

const SELECT_ENTRIES: &str = r#"
    SELECT e.id, e.account, e.amount, e.source_reference, e.created_at,
           c.chain_id, c.address AS currency_address, c.code, c.name, c.decimals
    FROM balance_entries e
    JOIN currencies c ON c.chain_id = e.chain_id AND c.address = e.currency_address
"#;

#[derive(Debug, FromRow)]
struct BalanceEntryRow {
    id: i64,
    account: String,
    amount: String,
    source_reference: String,
    created_at: DateTime<Utc>,
    chain_id: i64,
    currency_address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<BalanceEntryRow> for BalanceEntry {
    type Error = SqliteDatabaseError;

    fn try_from(row: BalanceEntryRow) -> Result<Self, Self::Error> {
        let amount = AmountColumns {
            amount: &row.amount,
            chain_id: row.chain_id,
            currency_address: &row.currency_address,
            code: row.code,
            name: row.name,
            decimals: row.decimals,
        }
        .into_amount()?;
        Ok(BalanceEntry {
            id: row.id,
            account: to_address(&row.account)?,
            amount,
            source_reference: row.source_reference,
            created_at: row.created_at,
        })
    }
}

/// Inserts the entry, relying on the `(account, currency, source_reference)` unique constraint to reject
/// duplicates. On a duplicate, the stored entry is returned instead.
pub async fn idempotent_insert(
    entry: NewBalanceEntry,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<BalanceEntry>, SqliteDatabaseError> {
    let account = address_column(&entry.account);
    let chain_id = int_column(entry.amount.currency.chain_id);
    let currency_address = address_column(&entry.amount.currency.address);
    let result = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO balance_entries (account, chain_id, currency_address, amount, source_reference)
           VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
    )
    .bind(&account)
    .bind(chain_id)
    .bind(&currency_address)
    .bind(entry.amount.amount.to_string())
    .bind(&entry.source_reference)
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(id) => {
            trace!("🗃️ Ledger entry #{id}: {} on {account} for [{}]", entry.amount, entry.source_reference);
            let stored = fetch_by_id(id, conn).await?;
            Ok(InsertResult::Inserted(stored))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Ledger entry for [{}] on {account} has already been recorded", entry.source_reference);
            let stored = fetch_by_reference(&entry.account, &entry.amount.currency, &entry.source_reference, conn)
                .await?
                .ok_or_else(|| SqliteDatabaseError::ConversionError("duplicate entry vanished".into()))?;
            Ok(InsertResult::AlreadyExists(stored))
        },
        Err(e) => Err(e.into()),
    }
}

async fn fetch_by_id(id: i64, conn: &mut SqliteConnection) -> Result<BalanceEntry, SqliteDatabaseError> {
    let row: BalanceEntryRow =
        sqlx::query_as(&format!("{SELECT_ENTRIES} WHERE e.id = $1")).bind(id).fetch_one(conn).await?;
    BalanceEntry::try_from(row)
}

async fn fetch_by_reference(
    account: &Address,
    currency: &Currency,
    source_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<BalanceEntry>, SqliteDatabaseError> {
    let row: Option<BalanceEntryRow> = sqlx::query_as(&format!(
        "{SELECT_ENTRIES} WHERE e.account = $1 AND e.chain_id = $2 AND e.currency_address = $3 AND \
         e.source_reference = $4"
    ))
    .bind(address_column(account))
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .bind(source_reference)
    .fetch_optional(conn)
    .await?;
    row.map(BalanceEntry::try_from).transpose()
}

pub async fn fetch_entries(
    account: &Address,
    currency: &Currency,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceEntry>, SqliteDatabaseError> {
    let rows: Vec<BalanceEntryRow> = sqlx::query_as(&format!(
        "{SELECT_ENTRIES} WHERE e.account = $1 AND e.chain_id = $2 AND e.currency_address = $3 ORDER BY e.id"
    ))
    .bind(address_column(account))
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(BalanceEntry::try_from).collect()
}

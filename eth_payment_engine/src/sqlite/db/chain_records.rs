use ethers::types::{H256, U256};
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, hash_column, int_column, to_address, to_hash, to_u64};
use crate::{
    chain::{ConfirmedLog, ConfirmedTransaction},
    sqlite::SqliteDatabaseError,
};

#[derive(Debug, FromRow)]
struct TransactionRow {
    hash: String,
    sender: String,
    recipient: Option<String>,
    value: String,
    data: String,
    block_number: i64,
}

impl TryFrom<TransactionRow> for ConfirmedTransaction {
    type Error = SqliteDatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let value = U256::from_dec_str(&row.value)
            .map_err(|e| SqliteDatabaseError::ConversionError(format!("{}: {e}", row.value)))?;
        Ok(ConfirmedTransaction {
            hash: to_hash(&row.hash)?,
            from: to_address(&row.sender)?,
            to: row.recipient.as_deref().map(to_address).transpose()?,
            value,
            data: row.data,
            block_number: to_u64(row.block_number)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct LogRow {
    transaction_hash: String,
    log_index: i64,
    data: String,
}

impl TryFrom<LogRow> for ConfirmedLog {
    type Error = SqliteDatabaseError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(ConfirmedLog {
            transaction_hash: to_hash(&row.transaction_hash)?,
            log_index: to_u64(row.log_index)?,
            data: row.data,
        })
    }
}

pub async fn insert_transaction(
    tx: &ConfirmedTransaction,
    conn: &mut SqliteConnection,
) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"INSERT INTO chain_transactions (hash, sender, recipient, value, data, block_number)
           VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (hash) DO NOTHING"#,
    )
    .bind(hash_column(&tx.hash))
    .bind(address_column(&tx.from))
    .bind(tx.to.as_ref().map(address_column))
    .bind(tx.value.to_string())
    .bind(&tx.data)
    .bind(int_column(tx.block_number))
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_transaction(
    hash: &H256,
    conn: &mut SqliteConnection,
) -> Result<Option<ConfirmedTransaction>, SqliteDatabaseError> {
    let row: Option<TransactionRow> = sqlx::query_as(
        "SELECT hash, sender, recipient, value, data, block_number FROM chain_transactions WHERE hash = $1",
    )
    .bind(hash_column(hash))
    .fetch_optional(conn)
    .await?;
    row.map(ConfirmedTransaction::try_from).transpose()
}

/// The highest block of any stored transaction.
pub async fn fetch_highest_block(conn: &mut SqliteConnection) -> Result<Option<u64>, SqliteDatabaseError> {
    let block: Option<i64> =
        sqlx::query_scalar("SELECT MAX(block_number) FROM chain_transactions").fetch_one(conn).await?;
    block.map(to_u64).transpose()
}

pub async fn insert_log(log: &ConfirmedLog, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let result = sqlx::query(
        r#"INSERT INTO transaction_logs (transaction_hash, log_index, data) VALUES ($1, $2, $3)
           ON CONFLICT (transaction_hash, log_index) DO NOTHING"#,
    )
    .bind(hash_column(&log.transaction_hash))
    .bind(int_column(log.log_index))
    .bind(&log.data)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_logs(hash: &H256, conn: &mut SqliteConnection) -> Result<Vec<ConfirmedLog>, SqliteDatabaseError> {
    let rows: Vec<LogRow> = sqlx::query_as(
        "SELECT transaction_hash, log_index, data FROM transaction_logs WHERE transaction_hash = $1 ORDER BY log_index",
    )
    .bind(hash_column(hash))
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(ConfirmedLog::try_from).collect()
}

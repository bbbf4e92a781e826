use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, hash_column, int_column, to_address, to_hash, AmountColumns};
use crate::{
    db_types::{InsertResult, NewTransfer, Transfer, TransferStatus},
    sqlite::SqliteDatabaseError,
};

const SELECT_TRANSFERS: &str = r#"
    SELECT t.id, t.reference, t.amount, t.recipient, t.status, t.sender, t.transaction_hash, t.failure_reason,
           t.claimed_at, t.created_at, t.updated_at,
           c.chain_id, c.address AS currency_address, c.code, c.name, c.decimals
    FROM transfers t
    JOIN currencies c ON c.chain_id = t.chain_id AND c.address = t.currency_address
"#;

#[derive(Debug, FromRow)]
struct TransferRow {
    id: i64,
    reference: String,
    amount: String,
    recipient: String,
    status: String,
    sender: Option<String>,
    transaction_hash: Option<String>,
    failure_reason: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    chain_id: i64,
    currency_address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = SqliteDatabaseError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let amount = AmountColumns {
            amount: &row.amount,
            chain_id: row.chain_id,
            currency_address: &row.currency_address,
            code: row.code,
            name: row.name,
            decimals: row.decimals,
        }
        .into_amount()?;
        Ok(Transfer {
            id: row.id,
            reference: row.reference,
            amount,
            recipient: to_address(&row.recipient)?,
            status: row.status.parse()?,
            sender: row.sender.as_deref().map(to_address).transpose()?,
            transaction_hash: row.transaction_hash.as_deref().map(to_hash).transpose()?,
            failure_reason: row.failure_reason,
            claimed_at: row.claimed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_transfers(rows: Vec<TransferRow>) -> Result<Vec<Transfer>, SqliteDatabaseError> {
    rows.into_iter().map(Transfer::try_from).collect()
}

pub async fn idempotent_insert(
    transfer: NewTransfer,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<Transfer>, SqliteDatabaseError> {
    let currency = &transfer.amount.currency;
    let result = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO transfers (reference, amount, chain_id, currency_address, recipient)
           VALUES ($1, $2, $3, $4, $5) RETURNING id"#,
    )
    .bind(&transfer.reference)
    .bind(transfer.amount.amount.to_string())
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .bind(address_column(&transfer.recipient))
    .fetch_one(&mut *conn)
    .await;
    match result {
        Ok(id) => {
            debug!("🗃️ Transfer [{}] of {} stored with id {id}", transfer.reference, transfer.amount);
            let stored = fetch(id, conn).await?.ok_or(SqliteDatabaseError::TransferNotFound(id))?;
            Ok(InsertResult::Inserted(stored))
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!("🗃️ Transfer [{}] has already been requested", transfer.reference);
            let stored = fetch_by_reference(&transfer.reference, conn)
                .await?
                .ok_or_else(|| SqliteDatabaseError::ConversionError("duplicate transfer vanished".into()))?;
            Ok(InsertResult::AlreadyExists(stored))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<Transfer>, SqliteDatabaseError> {
    let row: Option<TransferRow> =
        sqlx::query_as(&format!("{SELECT_TRANSFERS} WHERE t.id = $1")).bind(id).fetch_optional(conn).await?;
    row.map(Transfer::try_from).transpose()
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transfer>, SqliteDatabaseError> {
    let row: Option<TransferRow> = sqlx::query_as(&format!("{SELECT_TRANSFERS} WHERE t.reference = $1"))
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    row.map(Transfer::try_from).transpose()
}

/// Pending transfers that have been broadcast, or those that are free to be broadcast. Claimed transfers are in
/// neither set.
pub async fn fetch_pending(submitted: bool, conn: &mut SqliteConnection) -> Result<Vec<Transfer>, SqliteDatabaseError> {
    let filter = if submitted {
        "t.transaction_hash IS NOT NULL"
    } else {
        "t.transaction_hash IS NULL AND t.claimed_at IS NULL"
    };
    let rows: Vec<TransferRow> =
        sqlx::query_as(&format!("{SELECT_TRANSFERS} WHERE t.status = 'Pending' AND {filter} ORDER BY t.id"))
    .fetch_all(conn)
    .await?;
    rows_to_transfers(rows)
}

/// Explains why a guarded update touched no rows.
async fn not_updated(id: i64, conn: &mut SqliteConnection) -> SqliteDatabaseError {
    match fetch(id, conn).await {
        Ok(Some(t)) => SqliteDatabaseError::TransferNotPending(id, t.status),
        Ok(None) => SqliteDatabaseError::TransferNotFound(id),
        Err(e) => e,
    }
}

/// Takes the transfer over for broadcast. Only one caller can hold the claim; the others get `false`.
pub async fn claim(id: i64, conn: &mut SqliteConnection) -> Result<bool, SqliteDatabaseError> {
    let updated = sqlx::query(
        r#"UPDATE transfers SET claimed_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
           WHERE id = $1 AND status = 'Pending' AND transaction_hash IS NULL AND claimed_at IS NULL"#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    let claimed = updated.rows_affected() == 1;
    trace!("🗃️ Claim on transfer #{id}: {claimed}");
    Ok(claimed)
}

/// Gives up a claim on a transfer that was not broadcast.
pub async fn release_claim(id: i64, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    sqlx::query(
        r#"UPDATE transfers SET claimed_at = NULL, updated_at = CURRENT_TIMESTAMP
           WHERE id = $1 AND transaction_hash IS NULL"#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    trace!("🗃️ Claim on transfer #{id} released");
    Ok(())
}

pub async fn mark_submitted(
    id: i64,
    sender: &Address,
    hash: &H256,
    conn: &mut SqliteConnection,
) -> Result<Transfer, SqliteDatabaseError> {
    let updated = sqlx::query(
        r#"UPDATE transfers SET sender = $1, transaction_hash = $2, updated_at = CURRENT_TIMESTAMP
           WHERE id = $3 AND status = 'Pending' AND transaction_hash IS NULL"#,
    )
    .bind(address_column(sender))
    .bind(hash_column(hash))
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(not_updated(id, conn).await);
    }
    trace!("🗃️ Transfer #{id} submitted in transaction {hash:#x}");
    fetch(id, conn).await?.ok_or(SqliteDatabaseError::TransferNotFound(id))
}

pub async fn finalize(
    id: i64,
    status: TransferStatus,
    failure_reason: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Transfer, SqliteDatabaseError> {
    let updated = sqlx::query(
        r#"UPDATE transfers SET status = $1, failure_reason = $2, updated_at = CURRENT_TIMESTAMP
           WHERE id = $3 AND status = 'Pending'"#,
    )
    .bind(status.to_string())
    .bind(failure_reason)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(not_updated(id, conn).await);
    }
    trace!("🗃️ Transfer #{id} is now {status}");
    fetch(id, conn).await?.ok_or(SqliteDatabaseError::TransferNotFound(id))
}

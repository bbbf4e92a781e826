use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, hash_column, int_column, to_address, to_hash, AmountColumns};
use crate::{
    db_types::{InsertResult, NewPayment, NewUnreconciledDeposit, Payment, UnreconciledDeposit},
    sqlite::SqliteDatabaseError,
};

const SELECT_PAYMENTS: &str = r#"
    SELECT p.id, p.order_id, p.route_id, p.amount, p.source_reference, p.created_at,
           c.chain_id, c.address AS currency_address, c.code, c.name, c.decimals
    FROM payments p
    JOIN currencies c ON c.chain_id = p.chain_id AND c.address = p.currency_address
"#;

const SELECT_UNRECONCILED: &str = r#"
    SELECT u.id, u.route_id, u.account, u.transaction_hash, u.amount, u.created_at,
           c.chain_id, c.address AS currency_address, c.code, c.name, c.decimals
    FROM unreconciled_deposits u
    JOIN currencies c ON c.chain_id = u.chain_id AND c.address = u.currency_address
"#;

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    route_id: i64,
    amount: String,
    source_reference: String,
    created_at: DateTime<Utc>,
    chain_id: i64,
    currency_address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = SqliteDatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let amount = AmountColumns {
            amount: &row.amount,
            chain_id: row.chain_id,
            currency_address: &row.currency_address,
            code: row.code,
            name: row.name,
            decimals: row.decimals,
        }
        .into_amount()?;
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            route_id: row.route_id,
            amount,
            source_reference: row.source_reference,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UnreconciledRow {
    id: i64,
    route_id: i64,
    account: String,
    transaction_hash: String,
    amount: String,
    created_at: DateTime<Utc>,
    chain_id: i64,
    currency_address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<UnreconciledRow> for UnreconciledDeposit {
    type Error = SqliteDatabaseError;

    fn try_from(row: UnreconciledRow) -> Result<Self, Self::Error> {
        let amount = AmountColumns {
            amount: &row.amount,
            chain_id: row.chain_id,
            currency_address: &row.currency_address,
            code: row.code,
            name: row.name,
            decimals: row.decimals,
        }
        .into_amount()?;
        Ok(UnreconciledDeposit {
            id: row.id,
            route_id: row.route_id,
            account: to_address(&row.account)?,
            transaction_hash: to_hash(&row.transaction_hash)?,
            amount,
            created_at: row.created_at,
        })
    }
}

/// Stores the payment unless one with the same `(route, source_reference)` exists.
pub async fn idempotent_insert(
    payment: NewPayment,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<Payment>, SqliteDatabaseError> {
    let currency = &payment.amount.currency;
    let result = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO payments (order_id, route_id, amount, chain_id, currency_address, source_reference)
           VALUES ($1, $2, $3, $4, $5, $6) RETURNING id"#,
    )
    .bind(payment.order_id)
    .bind(payment.route_id)
    .bind(payment.amount.amount.to_string())
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .bind(&payment.source_reference)
    .fetch_one(&mut *conn)
    .await;
    let (id, inserted) = match result {
        Ok(id) => (id, true),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!(
                "🗃️ Payment [{}] on route #{} has already been recorded",
                payment.source_reference, payment.route_id
            );
            let id = sqlx::query_scalar("SELECT id FROM payments WHERE route_id = $1 AND source_reference = $2")
                .bind(payment.route_id)
                .bind(&payment.source_reference)
                .fetch_one(&mut *conn)
                .await?;
            (id, false)
        },
        Err(e) => return Err(e.into()),
    };
    let row: PaymentRow = sqlx::query_as(&format!("{SELECT_PAYMENTS} WHERE p.id = $1")).bind(id).fetch_one(conn).await?;
    let stored = Payment::try_from(row)?;
    Ok(if inserted { InsertResult::Inserted(stored) } else { InsertResult::AlreadyExists(stored) })
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Payment>, SqliteDatabaseError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(&format!("{SELECT_PAYMENTS} WHERE p.order_id = $1 ORDER BY p.id"))
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    rows.into_iter().map(Payment::try_from).collect()
}

pub async fn insert_unreconciled(
    deposit: NewUnreconciledDeposit,
    conn: &mut SqliteConnection,
) -> Result<InsertResult<UnreconciledDeposit>, SqliteDatabaseError> {
    let currency = &deposit.amount.currency;
    let result = sqlx::query(
        r#"INSERT INTO unreconciled_deposits (route_id, account, transaction_hash, amount, chain_id, currency_address)
           VALUES ($1, $2, $3, $4, $5, $6)
           ON CONFLICT (route_id, transaction_hash, chain_id, currency_address) DO NOTHING"#,
    )
    .bind(deposit.route_id)
    .bind(address_column(&deposit.account))
    .bind(hash_column(&deposit.transaction_hash))
    .bind(deposit.amount.amount.to_string())
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .execute(&mut *conn)
    .await?;
    let row: UnreconciledRow = sqlx::query_as(&format!(
        "{SELECT_UNRECONCILED} WHERE u.route_id = $1 AND u.transaction_hash = $2 AND u.chain_id = $3 AND \
         u.currency_address = $4"
    ))
    .bind(deposit.route_id)
    .bind(hash_column(&deposit.transaction_hash))
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .fetch_one(conn)
    .await?;
    let stored = UnreconciledDeposit::try_from(row)?;
    if result.rows_affected() > 0 {
        info!("🗃️ Unreconciled deposit #{} of {} stored against route #{}", stored.id, stored.amount, stored.route_id);
        Ok(InsertResult::Inserted(stored))
    } else {
        Ok(InsertResult::AlreadyExists(stored))
    }
}

pub async fn fetch_unreconciled(conn: &mut SqliteConnection) -> Result<Vec<UnreconciledDeposit>, SqliteDatabaseError> {
    let rows: Vec<UnreconciledRow> =
        sqlx::query_as(&format!("{SELECT_UNRECONCILED} ORDER BY u.id")).fetch_all(conn).await?;
    rows.into_iter().map(UnreconciledDeposit::try_from).collect()
}

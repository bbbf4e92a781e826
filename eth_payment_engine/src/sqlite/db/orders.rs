use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, int_column, AmountColumns};
use crate::{
    db_types::{NewOrder, Order, OrderStatusType},
    sqlite::SqliteDatabaseError,
};

const SELECT_ORDERS: &str = r#"
    SELECT o.id, o.reference, o.amount, o.status, o.created_at, o.updated_at,
           c.chain_id, c.address AS currency_address, c.code, c.name, c.decimals
    FROM orders o
    JOIN currencies c ON c.chain_id = o.chain_id AND c.address = o.currency_address
"#;

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    reference: String,
    amount: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    chain_id: i64,
    currency_address: String,
    code: String,
    name: String,
    decimals: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = SqliteDatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let requested = AmountColumns {
            amount: &row.amount,
            chain_id: row.chain_id,
            currency_address: &row.currency_address,
            code: row.code,
            name: row.name,
            decimals: row.decimals,
        }
        .into_amount()?;
        Ok(Order {
            id: row.id,
            reference: row.reference,
            requested,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SqliteDatabaseError> {
    let currency = &order.requested.currency;
    let id = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO orders (reference, amount, chain_id, currency_address) VALUES ($1, $2, $3, $4) RETURNING id"#,
    )
    .bind(&order.reference)
    .bind(order.requested.amount.to_string())
    .bind(int_column(currency.chain_id))
    .bind(address_column(&currency.address))
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            SqliteDatabaseError::DuplicateOrder(order.reference.clone())
        },
        _ => SqliteDatabaseError::from(e),
    })?;
    debug!("🗃️ Order [{}] for {} stored with id {id}", order.reference, order.requested);
    fetch(id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(id))
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, SqliteDatabaseError> {
    let row: Option<OrderRow> =
        sqlx::query_as(&format!("{SELECT_ORDERS} WHERE o.id = $1")).bind(id).fetch_optional(conn).await?;
    row.map(Order::try_from).transpose()
}

pub async fn fetch_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SqliteDatabaseError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDERS} WHERE o.reference = $1"))
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    row.map(Order::try_from).transpose()
}

pub async fn update_status(
    id: i64,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Order, SqliteDatabaseError> {
    let updated = sqlx::query("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(status.to_string())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(SqliteDatabaseError::OrderNotFound(id));
    }
    trace!("🗃️ Order #{id} is now {status}");
    fetch(id, conn).await?.ok_or(SqliteDatabaseError::OrderNotFound(id))
}

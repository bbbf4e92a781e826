use chrono::{DateTime, Utc};
use ethers::types::Address;
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, int_column, to_address, to_timestamp, to_u64};
use crate::{
    db_types::{PaymentRoute, RouteKind, RouteStatus, RouteType},
    sqlite::SqliteDatabaseError,
};

const ROUTE_COLUMNS: &str = "id, order_id, route_type, receiver, account, start_block, expiration_block, \
                             channel_identity, expiration_time, status, created_at";

#[derive(Debug, FromRow)]
struct RouteRow {
    id: i64,
    order_id: i64,
    route_type: String,
    receiver: Option<String>,
    account: Option<String>,
    start_block: Option<i64>,
    expiration_block: Option<i64>,
    channel_identity: Option<String>,
    expiration_time: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
}

fn missing(id: i64, column: &str) -> SqliteDatabaseError {
    SqliteDatabaseError::ConversionError(format!("route #{id} has no {column}"))
}

impl TryFrom<RouteRow> for PaymentRoute {
    type Error = SqliteDatabaseError;

    fn try_from(row: RouteRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let kind = match row.route_type.parse::<RouteType>()? {
            RouteType::Internal => {
                RouteKind::Internal { receiver: row.receiver.ok_or_else(|| missing(id, "receiver"))? }
            },
            RouteType::Blockchain => RouteKind::Blockchain {
                account: to_address(&row.account.ok_or_else(|| missing(id, "account"))?)?,
                start_block: to_u64(row.start_block.ok_or_else(|| missing(id, "start block"))?)?,
                expiration_block: to_u64(row.expiration_block.ok_or_else(|| missing(id, "expiration block"))?)?,
            },
            RouteType::OffChain => RouteKind::OffChain {
                channel_identity: row.channel_identity.ok_or_else(|| missing(id, "channel identity"))?,
                expiration_time: to_timestamp(row.expiration_time.ok_or_else(|| missing(id, "expiration time"))?)?,
            },
        };
        Ok(PaymentRoute { id, order_id: row.order_id, kind, status: row.status.parse()?, created_at: row.created_at })
    }
}

fn rows_to_routes(rows: Vec<RouteRow>) -> Result<Vec<PaymentRoute>, SqliteDatabaseError> {
    rows.into_iter().map(PaymentRoute::try_from).collect()
}

pub async fn insert(
    order_id: i64,
    kind: RouteKind,
    conn: &mut SqliteConnection,
) -> Result<PaymentRoute, SqliteDatabaseError> {
    let route_type = kind.route_type();
    let query = sqlx::query_scalar::<_, i64>(
        r#"INSERT INTO payment_routes
               (order_id, route_type, receiver, account, start_block, expiration_block, channel_identity, expiration_time)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id"#,
    )
    .bind(order_id)
    .bind(route_type.to_string());
    let query = match &kind {
        RouteKind::Internal { receiver } => query
            .bind(Some(receiver.clone()))
            .bind(None::<String>)
            .bind(None::<i64>)
            .bind(None::<i64>)
            .bind(None::<String>)
            .bind(None::<i64>),
        RouteKind::Blockchain { account, start_block, expiration_block } => query
            .bind(None::<String>)
            .bind(Some(address_column(account)))
            .bind(Some(int_column(*start_block)))
            .bind(Some(int_column(*expiration_block)))
            .bind(None::<String>)
            .bind(None::<i64>),
        RouteKind::OffChain { channel_identity, expiration_time } => query
            .bind(None::<String>)
            .bind(None::<String>)
            .bind(None::<i64>)
            .bind(None::<i64>)
            .bind(Some(channel_identity.clone()))
            .bind(Some(expiration_time.timestamp())),
    };
    let id = query.fetch_one(&mut *conn).await.map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => SqliteDatabaseError::RouteAlreadyOpen(format!(
            "order #{order_id} already has an open {route_type} route, or the account is already in use"
        )),
        _ => SqliteDatabaseError::from(e),
    })?;
    debug!("🗃️ Opened {route_type} route #{id} for order #{order_id}");
    fetch(id, conn).await?.ok_or(SqliteDatabaseError::RouteNotFound(id))
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentRoute>, SqliteDatabaseError> {
    let row: Option<RouteRow> = sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM payment_routes WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(PaymentRoute::try_from).transpose()
}

pub async fn fetch_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRoute>, SqliteDatabaseError> {
    let rows: Vec<RouteRow> =
        sqlx::query_as(&format!("SELECT {ROUTE_COLUMNS} FROM payment_routes WHERE order_id = $1 ORDER BY id"))
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    rows_to_routes(rows)
}

pub async fn fetch_open_for_account(
    account: &Address,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRoute>, SqliteDatabaseError> {
    let row: Option<RouteRow> = sqlx::query_as(&format!(
        "SELECT {ROUTE_COLUMNS} FROM payment_routes WHERE account = $1 AND route_type = 'Blockchain' AND status = \
         'Open'"
    ))
    .bind(address_column(account))
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRoute::try_from).transpose()
}

/// The latest blockchain route of the account whose window contains `block`, as long as it is open or expired.
/// Filled routes are not returned.
pub async fn fetch_for_deposit(
    account: &Address,
    block: u64,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRoute>, SqliteDatabaseError> {
    let row: Option<RouteRow> = sqlx::query_as(&format!(
        r#"SELECT {ROUTE_COLUMNS} FROM payment_routes
           WHERE account = $1 AND route_type = 'Blockchain' AND status IN ('Open', 'Expired')
             AND start_block <= $2 AND expiration_block >= $2
           ORDER BY id DESC LIMIT 1"#
    ))
    .bind(address_column(account))
    .bind(int_column(block))
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRoute::try_from).transpose()
}

pub async fn fetch_available_account(conn: &mut SqliteConnection) -> Result<Option<Address>, SqliteDatabaseError> {
    let address: Option<String> = sqlx::query_scalar(
        r#"SELECT a.address FROM custodial_accounts a
           WHERE NOT EXISTS (
               SELECT 1 FROM payment_routes r
               WHERE r.account = a.address AND r.route_type = 'Blockchain' AND r.status = 'Open'
           )
           ORDER BY a.id LIMIT 1"#,
    )
    .fetch_optional(conn)
    .await?;
    address.as_deref().map(to_address).transpose()
}

/// Moves an open route to `status`. Returns `None` if the route was not open.
pub async fn close(
    id: i64,
    status: RouteStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRoute>, SqliteDatabaseError> {
    let row: Option<RouteRow> = sqlx::query_as(&format!(
        "UPDATE payment_routes SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = 'Open' \
         RETURNING {ROUTE_COLUMNS}"
    ))
    .bind(status.to_string())
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRoute::try_from).transpose()
}

/// Marks the route that settled its order as filled. A route that expired before a payment inside its window was
/// confirmed is filled too.
pub async fn fill(id: i64, conn: &mut SqliteConnection) -> Result<Option<PaymentRoute>, SqliteDatabaseError> {
    let row: Option<RouteRow> = sqlx::query_as(&format!(
        "UPDATE payment_routes SET status = 'Filled', updated_at = CURRENT_TIMESTAMP WHERE id = $1 AND status IN \
         ('Open', 'Expired') RETURNING {ROUTE_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentRoute::try_from).transpose()
}

/// Expires every open route of the order, except `keep`.
pub async fn expire_open_for_order(
    order_id: i64,
    keep: Option<i64>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRoute>, SqliteDatabaseError> {
    let rows: Vec<RouteRow> = sqlx::query_as(&format!(
        "UPDATE payment_routes SET status = 'Expired', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND status \
         = 'Open' AND id != $2 RETURNING {ROUTE_COLUMNS}"
    ))
    .bind(order_id)
    .bind(keep.unwrap_or(-1))
    .fetch_all(conn)
    .await?;
    rows_to_routes(rows)
}

pub async fn expire_stale(
    current_block: u64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentRoute>, SqliteDatabaseError> {
    let rows: Vec<RouteRow> = sqlx::query_as(&format!(
        r#"UPDATE payment_routes SET status = 'Expired', updated_at = CURRENT_TIMESTAMP
           WHERE status = 'Open' AND (
               (route_type = 'Blockchain' AND expiration_block < $1) OR
               (route_type = 'OffChain' AND expiration_time < $2)
           )
           RETURNING {ROUTE_COLUMNS}"#
    ))
    .bind(int_column(current_block))
    .bind(now.timestamp())
    .fetch_all(conn)
    .await?;
    rows_to_routes(rows)
}

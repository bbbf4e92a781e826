use epg_common::Secret;
use ethers::types::Address;
use sqlx::{FromRow, SqliteConnection};

use super::{address_column, to_address};
use crate::{sqlite::SqliteDatabaseError, wallets::CustodialAccount};

#[derive(Debug, FromRow)]
struct CustodialAccountRow {
    address: String,
    kind: String,
    private_key: Option<String>,
    derivation_index: Option<i64>,
}

impl TryFrom<CustodialAccountRow> for CustodialAccount {
    type Error = SqliteDatabaseError;

    fn try_from(row: CustodialAccountRow) -> Result<Self, Self::Error> {
        let address = to_address(&row.address)?;
        match (row.kind.as_str(), row.private_key, row.derivation_index) {
            ("FixedKey", Some(key), _) => Ok(CustodialAccount::FixedKey { address, private_key: Secret::new(key) }),
            ("Derived", _, Some(index)) => {
                let index = u32::try_from(index)
                    .map_err(|_| SqliteDatabaseError::ConversionError(format!("derivation index {index}")))?;
                Ok(CustodialAccount::Derived { address, index })
            },
            (kind, _, _) => Err(SqliteDatabaseError::ConversionError(format!(
                "custodial account {} of kind {kind} is incomplete",
                row.address
            ))),
        }
    }
}

pub async fn insert(account: &CustodialAccount, conn: &mut SqliteConnection) -> Result<(), SqliteDatabaseError> {
    let (private_key, index) = match account {
        CustodialAccount::FixedKey { private_key, .. } => (Some(private_key.reveal().clone()), None),
        CustodialAccount::Derived { index, .. } => (None, Some(i64::from(*index))),
    };
    sqlx::query("INSERT INTO custodial_accounts (address, kind, private_key, derivation_index) VALUES ($1, $2, $3, $4)")
        .bind(address_column(&account.address()))
        .bind(account.kind())
        .bind(private_key)
        .bind(index)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch(address: &Address, conn: &mut SqliteConnection) -> Result<Option<CustodialAccount>, SqliteDatabaseError> {
    let row: Option<CustodialAccountRow> = sqlx::query_as(
        "SELECT address, kind, private_key, derivation_index FROM custodial_accounts WHERE address = $1",
    )
    .bind(address_column(address))
    .fetch_optional(conn)
    .await?;
    row.map(CustodialAccount::try_from).transpose()
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<CustodialAccount>, SqliteDatabaseError> {
    let rows: Vec<CustodialAccountRow> =
        sqlx::query_as("SELECT address, kind, private_key, derivation_index FROM custodial_accounts ORDER BY id")
            .fetch_all(conn)
            .await?;
    rows.into_iter().map(CustodialAccount::try_from).collect()
}

pub async fn next_derivation_index(conn: &mut SqliteConnection) -> Result<u32, SqliteDatabaseError> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(derivation_index) FROM custodial_accounts")
        .fetch_one(conn)
        .await?;
    match max {
        None => Ok(0),
        Some(v) => u32::try_from(v + 1)
            .map_err(|_| SqliteDatabaseError::ConversionError(format!("derivation index {v} is out of range"))),
    }
}

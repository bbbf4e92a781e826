#![allow(dead_code)]
use std::{str::FromStr, time::Duration};

use epg_common::{Currency, Decimal, TokenAmount};
use eth_payment_engine::{test_utils::prepare_env::new_test_database, SqliteDatabase};
use ethers::types::U256;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const CHAIN_ID: u64 = 1;

pub async fn setup() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    new_test_database(5).await
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    let _ = Sqlite::drop_database(&url).await;
}

pub fn eth(value: &str) -> TokenAmount {
    TokenAmount::new(Decimal::from_str(value).unwrap(), Currency::ether(CHAIN_ID))
}

pub fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

/// Polls `check` until it holds, for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

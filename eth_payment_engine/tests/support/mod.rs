#![allow(dead_code)]
use std::str::FromStr;

use epg_common::{parse_address, Currency, Decimal, TokenAmount};
use eth_payment_engine::{
    chain::{encode_transfer_data, ConfirmedLog, ConfirmedTransaction},
    test_utils::prepare_env::new_test_database,
    SqliteDatabase,
};
use ethers::types::{Address, H256, U256};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const CHAIN_ID: u64 = 1;
pub const USDC_ADDRESS: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

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

pub fn ether() -> Currency {
    Currency::ether(CHAIN_ID)
}

pub fn usdc() -> Currency {
    Currency::token(CHAIN_ID, parse_address(USDC_ADDRESS).unwrap(), "USDC", "USD Coin", 6)
}

pub fn amount(value: &str, currency: &Currency) -> TokenAmount {
    TokenAmount::new(Decimal::from_str(value).unwrap(), currency.clone())
}

pub fn eth(value: &str) -> TokenAmount {
    amount(value, &ether())
}

pub fn tx_hash(n: u64) -> H256 {
    H256::from_low_u64_be(n)
}

pub fn native_transfer(hash: H256, to: Address, wei: U256, block_number: u64) -> ConfirmedTransaction {
    ConfirmedTransaction {
        hash,
        from: Address::repeat_byte(0xee),
        to: Some(to),
        value: wei,
        data: "0x".into(),
        block_number,
    }
}

pub fn token_transfer(
    hash: H256,
    token: &Currency,
    recipient: Address,
    base_units: U256,
    block_number: u64,
) -> ConfirmedTransaction {
    let data = encode_transfer_data(recipient, base_units);
    ConfirmedTransaction {
        hash,
        from: Address::repeat_byte(0xee),
        to: Some(token.address),
        value: U256::zero(),
        data: format!("0x{}", hex::encode(data)),
        block_number,
    }
}

pub fn transfer_log(hash: H256, log_index: u64, base_units: U256) -> ConfirmedLog {
    let mut word = [0u8; 32];
    base_units.to_big_endian(&mut word);
    ConfirmedLog { transaction_hash: hash, log_index, data: format!("0x{}", hex::encode(word)) }
}

use std::sync::Arc;

use eth_payment_engine::{db_types::InsertResult, CurrencyManagement, LedgerApi, LedgerError};
use ethers::types::Address;
use log::*;

use crate::support::{amount, eth, ether, setup, tear_down, usdc};

mod support;

#[tokio::test]
async fn credits_and_debits_are_idempotent() {
    let db = setup().await;
    db.fetch_or_create_currency(ether()).await.unwrap();
    db.fetch_or_create_currency(usdc()).await.unwrap();
    let ledger = LedgerApi::new(db.clone());
    let account = Address::repeat_byte(0x42);

    let first = ledger.credit(account, eth("1.5"), "0xabc").await.unwrap();
    assert!(first.is_inserted());
    let repeat = ledger.credit(account, eth("1.5"), "0xabc").await.unwrap();
    assert!(matches!(repeat, InsertResult::AlreadyExists(_)));
    assert_eq!(repeat.into_inner().id, first.into_inner().id);
    assert_eq!(ledger.balance(&account, &ether()).await.unwrap(), eth("1.5"));

    let debit = ledger.debit(account, eth("0.5"), "transfer:1").await.unwrap().into_inner();
    assert_eq!(debit.amount, eth("-0.5"));
    ledger.debit(account, eth("0.5"), "transfer:1").await.unwrap();
    assert_eq!(ledger.balance(&account, &ether()).await.unwrap(), eth("1"));

    // The same reference in another currency is a separate entry
    ledger.credit(account, amount("250", &usdc()), "0xabc").await.unwrap();
    let balances = ledger.balances(&account, &[ether(), usdc()]).await.unwrap();
    assert_eq!(balances, vec![eth("1"), amount("250", &usdc())]);
    assert_eq!(ledger.entries(&account, &ether()).await.unwrap().len(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn negative_amounts_are_rejected() {
    let db = setup().await;
    db.fetch_or_create_currency(ether()).await.unwrap();
    let ledger = LedgerApi::new(db.clone());
    let account = Address::repeat_byte(0x42);
    let err = ledger.credit(account, eth("-1"), "0xabc").await.unwrap_err();
    assert!(matches!(err, LedgerError::NegativeAmount(_)));
    let err = ledger.debit(account, eth("-1"), "0xabc").await.unwrap_err();
    assert!(matches!(err, LedgerError::NegativeAmount(_)));
    assert!(ledger.balance(&account, &ether()).await.unwrap().is_zero());
    tear_down(db).await;
}

#[tokio::test]
async fn ledger_allows_overdrafts() {
    let db = setup().await;
    db.fetch_or_create_currency(ether()).await.unwrap();
    let ledger = LedgerApi::new(db.clone());
    let account = Address::repeat_byte(0x42);
    ledger.debit(account, eth("0.25"), "transfer:7").await.unwrap();
    assert_eq!(ledger.balance(&account, &ether()).await.unwrap(), eth("-0.25"));
    tear_down(db).await;
}

#[tokio::test]
async fn burst_of_replayed_credits() {
    let db = setup().await;
    db.fetch_or_create_currency(ether()).await.unwrap();
    let ledger = Arc::new(LedgerApi::new(db.clone()));
    let account = Address::repeat_byte(0x42);
    let mut jobs = Vec::new();
    for i in 0..40 {
        let ledger = Arc::clone(&ledger);
        // 10 distinct deposits, each delivered 4 times
        let reference = format!("0xdeposit{}", i % 10);
        jobs.push(tokio::spawn(async move { ledger.credit(account, eth("0.1"), reference).await }));
    }
    let mut inserted = 0;
    for job in jobs {
        if job.await.unwrap().unwrap().is_inserted() {
            inserted += 1;
        }
    }
    info!("📒️ {inserted} credits inserted");
    assert_eq!(inserted, 10);
    assert_eq!(ledger.balance(&account, &ether()).await.unwrap(), eth("1"));
    tear_down(db).await;
}

use epg_common::Currency;
use eth_payment_engine::{
    chain::{encode_transfer_data, BroadcastError},
    db_types::{InsertResult, NewTransfer, TransferStatus},
    events::EventProducers,
    test_utils::mocks::MockChain,
    traits::TransferManagement,
    wallets::AccountFactory,
    LedgerApi,
    SettlementApi,
    SettlementError,
    SqliteDatabase,
    WalletApi,
};
use ethers::{
    types::{Address, U256},
    utils::keccak256,
};

use crate::support::{amount, eth, ether, setup, tear_down, usdc, CHAIN_ID};

mod support;

const GAS_LIMIT: u64 = 100_000;

struct Fixture {
    db: SqliteDatabase,
    chain: MockChain,
    wallet: WalletApi<SqliteDatabase>,
    ledger: LedgerApi<SqliteDatabase>,
    api: SettlementApi<SqliteDatabase, MockChain>,
}

fn gwei(n: u64) -> U256 {
    U256::from(n) * U256::exp10(9)
}

fn recipient() -> Address {
    Address::repeat_byte(0x77)
}

/// Gas price is 10 gwei, so every payout needs a reserve of 0.001 ETH.
async fn fixture() -> Fixture {
    let db = setup().await;
    let chain = MockChain::new(CHAIN_ID, gwei(10), 100);
    let factory = AccountFactory::default();
    let wallet = WalletApi::new(db.clone(), factory.clone());
    wallet.native_currency(CHAIN_ID).await.unwrap();
    wallet.register_token(usdc()).await.unwrap();
    let ledger = LedgerApi::new(db.clone());
    let api = SettlementApi::new(db.clone(), chain.clone(), factory, GAS_LIMIT, EventProducers::default());
    Fixture { db, chain, wallet, ledger, api }
}

async fn funded_account(f: &Fixture, native: &str, tokens: &str) -> Address {
    let account = f.wallet.generate_fixed_key_account().await.unwrap().address();
    f.ledger.credit(account, eth(native), format!("fund-{account:#x}")).await.unwrap();
    f.ledger.credit(account, amount(tokens, &usdc()), format!("fund-{account:#x}")).await.unwrap();
    account
}

#[tokio::test]
async fn native_payout_requires_amount_plus_gas() {
    let f = fixture().await;
    let rich = funded_account(&f, "1", "0").await;
    let _poor = funded_account(&f, "0.0005", "0").await;
    let selector = f.api.fund_selector();
    assert_eq!(selector.gas_reserve(&ether()).await.unwrap(), eth("0.001"));
    for _ in 0..5 {
        let choice = selector.select_for_transfer(&eth("0.5")).await.unwrap().unwrap();
        assert_eq!(choice.address(), rich);
    }
    assert!(selector.select_for_transfer(&eth("0.999")).await.unwrap().is_some());
    assert!(selector.select_for_transfer(&eth("0.9995")).await.unwrap().is_none());
    tear_down(f.db).await;
}

#[tokio::test]
async fn token_payout_requires_native_gas_reserve() {
    let f = fixture().await;
    let _whale = funded_account(&f, "0", "100").await;
    let fueled = funded_account(&f, "1", "10").await;
    let selector = f.api.fund_selector();
    assert!(selector.select_for_transfer(&amount("50", &usdc())).await.unwrap().is_none());
    let choice = selector.select_for_transfer(&amount("5", &usdc())).await.unwrap().unwrap();
    assert_eq!(choice.address(), fueled);
    tear_down(f.db).await;
}

#[tokio::test]
async fn transfer_requests_are_validated() {
    let f = fixture().await;
    let err = f.api.request_transfer(NewTransfer::new("zero", eth("0"), recipient())).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransfer(_)));
    let err = f.api.request_transfer(NewTransfer::new("null", eth("1"), Address::zero())).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidTransfer(_)));
    let unknown = Currency::token(CHAIN_ID, Address::repeat_byte(0xda), "DAI", "Dai", 18);
    let err = f.api.request_transfer(NewTransfer::new("dai", amount("1", &unknown), recipient())).await.unwrap_err();
    assert!(matches!(err, SettlementError::UnknownCurrency(_)));

    let first = f.api.request_transfer(NewTransfer::new("payout-1", eth("0.1"), recipient())).await.unwrap();
    assert!(first.is_inserted());
    let again = f.api.request_transfer(NewTransfer::new("payout-1", eth("0.2"), recipient())).await.unwrap();
    let InsertResult::AlreadyExists(stored) = again else { panic!("expected the stored transfer") };
    assert_eq!(stored.amount, eth("0.1"));
    assert_eq!(stored.status, TransferStatus::Pending);
    tear_down(f.db).await;
}

#[tokio::test]
async fn native_payout_end_to_end() {
    let f = fixture().await;
    let sender = funded_account(&f, "1", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("payout-0.498", eth("0.498"), recipient())).await.unwrap().into_inner();

    let submitted = f.api.execute_transfer(transfer.id).await.unwrap();
    assert_eq!(submitted.sender, Some(sender));
    assert!(submitted.is_submitted());
    let raw = f.chain.submitted();
    assert_eq!(raw.len(), 1);
    let hash = submitted.transaction_hash.unwrap();
    assert_eq!(hash.as_bytes(), &keccak256(&raw[0]));

    // Nothing settles before the transaction is mined
    assert!(f.api.poll_receipts(&f.chain).await.unwrap().is_empty());
    f.chain.mine(hash, true, gwei(10) * U256::from(21_000));
    let settled = f.api.poll_receipts(&f.chain).await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].status, TransferStatus::Confirmed);
    // 1 - 0.498 - 0.00021
    assert_eq!(f.ledger.balance(&sender, &ether()).await.unwrap(), eth("0.50179"));
    assert!(f.api.poll_receipts(&f.chain).await.unwrap().is_empty());
    tear_down(f.db).await;
}

#[tokio::test]
async fn payout_debits_amount_and_the_full_gas_reserve() {
    let f = fixture().await;
    f.chain.set_gas_price(gwei(20));
    let account = funded_account(&f, "1.0", "0").await;
    assert_eq!(f.api.fund_selector().gas_reserve(&ether()).await.unwrap(), eth("0.002"));
    let selected = f.api.fund_selector().select_for_transfer(&eth("0.5")).await.unwrap().unwrap();
    assert_eq!(selected.address(), account);

    let transfer = f.api.request_transfer(NewTransfer::new("pay-half", eth("0.5"), recipient())).await.unwrap();
    let submitted = f.api.execute_transfer(transfer.into_inner().id).await.unwrap();
    assert_eq!(submitted.sender, Some(account));
    f.chain.mine(submitted.transaction_hash.unwrap(), true, gwei(20) * U256::from(GAS_LIMIT));
    let settled = f.api.poll_receipts(&f.chain).await.unwrap();
    assert_eq!(settled[0].status, TransferStatus::Confirmed);
    assert_eq!(f.ledger.balance(&account, &ether()).await.unwrap(), eth("0.498"));
    tear_down(f.db).await;
}

#[tokio::test]
async fn concurrent_executions_broadcast_once() {
    let f = fixture().await;
    funded_account(&f, "10", "0").await;
    funded_account(&f, "10", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("contested", eth("1"), recipient())).await.unwrap().into_inner();

    let (first, second) = tokio::join!(f.api.execute_transfer(transfer.id), f.api.execute_transfer(transfer.id));
    assert_eq!(f.chain.submitted().len(), 1);
    let stored = f.api.fetch_transfer(transfer.id).await.unwrap().unwrap();
    assert!(stored.is_submitted());
    for result in [first, second] {
        match result {
            Ok(t) => assert_eq!(t.transaction_hash, stored.transaction_hash),
            Err(e) => assert!(matches!(e, SettlementError::TransferInProgress(id) if id == transfer.id)),
        }
    }
    tear_down(f.db).await;
}

#[tokio::test]
async fn claimed_transfers_are_not_broadcast_again() {
    let f = fixture().await;
    funded_account(&f, "1", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("claimed", eth("0.1"), recipient())).await.unwrap().into_inner();
    assert!(f.db.claim_transfer(transfer.id).await.unwrap());
    assert!(!f.db.claim_transfer(transfer.id).await.unwrap());

    // A claim that was never recorded as broadcast keeps the transfer away from executors
    assert!(f.api.unsubmitted_transfers().await.unwrap().is_empty());
    let err = f.api.execute_transfer(transfer.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::TransferInProgress(_)));
    assert!(!err.is_retryable());
    assert!(f.chain.submitted().is_empty());
    let stored = f.api.fetch_transfer(transfer.id).await.unwrap().unwrap();
    assert!(stored.is_claimed());
    assert_eq!(stored.status, TransferStatus::Pending);

    f.db.release_transfer_claim(transfer.id).await.unwrap();
    assert_eq!(f.api.unsubmitted_transfers().await.unwrap().len(), 1);
    let submitted = f.api.execute_transfer(transfer.id).await.unwrap();
    assert!(submitted.is_submitted());
    assert!(!f.db.claim_transfer(transfer.id).await.unwrap());
    tear_down(f.db).await;
}

#[tokio::test]
async fn token_payout_debits_token_and_gas() {
    let f = fixture().await;
    let sender = funded_account(&f, "0.01", "100").await;
    let transfer = f
        .api
        .request_transfer(NewTransfer::new("usdc-1", amount("40", &usdc()), recipient()))
        .await
        .unwrap()
        .into_inner();
    let submitted = f.api.execute_transfer(transfer.id).await.unwrap();
    let receipt = f.chain.mine(submitted.transaction_hash.unwrap(), true, gwei(10) * U256::from(50_000));
    let confirmed = f.api.process_receipt(transfer.id, receipt).await.unwrap();
    assert_eq!(confirmed.status, TransferStatus::Confirmed);
    assert_eq!(f.ledger.balance(&sender, &usdc()).await.unwrap(), amount("60", &usdc()));
    assert_eq!(f.ledger.balance(&sender, &ether()).await.unwrap(), eth("0.0095"));
    tear_down(f.db).await;
}

#[tokio::test]
async fn unfunded_transfer_stays_pending() {
    let f = fixture().await;
    funded_account(&f, "0.1", "0").await;
    let transfer = f.api.request_transfer(NewTransfer::new("big", eth("5"), recipient())).await.unwrap().into_inner();
    let err = f.api.execute_transfer(transfer.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::InsufficientFunds(_)));
    assert!(err.is_retryable());
    let stored = f.api.fetch_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Pending);
    assert!(!stored.is_submitted());
    assert!(!stored.is_claimed());
    assert_eq!(f.api.unsubmitted_transfers().await.unwrap().len(), 1);
    tear_down(f.db).await;
}

#[tokio::test]
async fn nonce_too_low_is_retried_once() {
    let f = fixture().await;
    funded_account(&f, "1", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("retry", eth("0.1"), recipient())).await.unwrap().into_inner();
    f.chain.fail_next_submission(BroadcastError::NonceTooLow("nonce too low".into()));
    let submitted = f.api.execute_transfer(transfer.id).await.unwrap();
    assert!(submitted.is_submitted());
    assert_eq!(f.chain.submitted().len(), 1);

    let transfer =
        f.api.request_transfer(NewTransfer::new("retry-2", eth("0.1"), recipient())).await.unwrap().into_inner();
    f.chain.fail_next_submission(BroadcastError::NonceTooLow("nonce too low".into()));
    f.chain.fail_next_submission(BroadcastError::NonceTooLow("nonce too low".into()));
    let err = f.api.execute_transfer(transfer.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::BroadcastRejected(_)));
    let stored = f.api.fetch_transfer(transfer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Failed);
    tear_down(f.db).await;
}

#[tokio::test]
async fn unavailable_node_leaves_transfer_pending() {
    let f = fixture().await;
    funded_account(&f, "1", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("offline", eth("0.1"), recipient())).await.unwrap().into_inner();
    f.chain.fail_next_submission(BroadcastError::Unavailable("connection refused".into()));
    let err = f.api.execute_transfer(transfer.id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(f.api.fetch_transfer(transfer.id).await.unwrap().unwrap().status, TransferStatus::Pending);
    assert!(f.api.execute_transfer(transfer.id).await.unwrap().is_submitted());
    tear_down(f.db).await;
}

#[tokio::test]
async fn reverted_transfer_fails_without_debit() {
    let f = fixture().await;
    let sender = funded_account(&f, "1", "0").await;
    let transfer =
        f.api.request_transfer(NewTransfer::new("revert", eth("0.3"), recipient())).await.unwrap().into_inner();
    let submitted = f.api.execute_transfer(transfer.id).await.unwrap();
    let receipt = f.chain.mine(submitted.transaction_hash.unwrap(), false, gwei(10) * U256::from(30_000));
    let failed = f.api.process_receipt(transfer.id, receipt.clone()).await.unwrap();
    assert_eq!(failed.status, TransferStatus::Failed);
    assert!(failed.failure_reason.unwrap().contains("reverted"));
    assert_eq!(f.ledger.balance(&sender, &ether()).await.unwrap(), eth("1"));
    let err = f.api.process_receipt(transfer.id, receipt).await.unwrap_err();
    assert!(matches!(err, SettlementError::TransferNotPending(_, TransferStatus::Failed)));
    tear_down(f.db).await;
}

#[tokio::test]
async fn transactions_are_built_for_the_connected_chain() {
    let f = fixture().await;
    let sender = Address::repeat_byte(0x11);
    f.chain.set_nonce(sender, U256::from(7));

    let native = f.api.build_transfer_transaction(&sender, &recipient(), &eth("0.498")).await.unwrap();
    assert_eq!(native.to_addr(), Some(&recipient()));
    assert_eq!(native.value(), Some(&U256::from(498_000_000_000_000_000u64)));
    assert_eq!(native.nonce(), Some(&U256::from(7)));
    assert_eq!(native.gas(), Some(&U256::from(GAS_LIMIT)));
    assert_eq!(native.gas_price(), Some(gwei(10)));

    let token = f.api.build_transfer_transaction(&sender, &recipient(), &amount("12.5", &usdc())).await.unwrap();
    assert_eq!(token.to_addr(), Some(&usdc().address));
    assert_eq!(token.value(), Some(&U256::zero()));
    assert_eq!(token.data(), Some(&encode_transfer_data(recipient(), U256::from(12_500_000u64))));

    let goerli = Currency::ether(5);
    let wrong_chain = amount("1", &goerli);
    let err = f.api.build_transfer_transaction(&sender, &recipient(), &wrong_chain).await.unwrap_err();
    assert!(matches!(err, SettlementError::ChainMismatch { expected: 5, actual: 1 }));
    tear_down(f.db).await;
}

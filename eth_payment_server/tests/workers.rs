use eth_payment_engine::{
    chain::BroadcastError,
    db_types::{NewOrder, NewTransfer, RouteStatus, TransferStatus},
    events::EventProducers,
    test_utils::mocks::MockChain,
    wallets::AccountFactory,
    LedgerApi,
    RouteApi,
    SettlementApi,
    WalletApi,
};
use eth_payment_server::{
    expiry_worker::run_expiry_job,
    payout_worker::{run_payout_job, PayoutSummary},
};
use ethers::types::Address;

use crate::support::{eth, gwei, setup, tear_down, CHAIN_ID};

mod support;

#[tokio::test]
async fn payout_job_submits_postpones_and_fails() {
    let db = setup().await;
    let chain = MockChain::new(CHAIN_ID, gwei(10), 100);
    let factory = AccountFactory::default();
    let wallet = WalletApi::new(db.clone(), factory.clone());
    wallet.native_currency(CHAIN_ID).await.unwrap();
    let account = wallet.generate_fixed_key_account().await.unwrap().address();
    LedgerApi::new(db.clone()).credit(account, eth("1"), "funding").await.unwrap();
    let settlement = SettlementApi::new(db.clone(), chain.clone(), factory, 100_000, EventProducers::default());
    let recipient = Address::repeat_byte(0x77);

    let small = settlement.request_transfer(NewTransfer::new("small", eth("0.2"), recipient)).await.unwrap();
    let large = settlement.request_transfer(NewTransfer::new("large", eth("5"), recipient)).await.unwrap();
    let summary = run_payout_job(&settlement).await.unwrap();
    assert_eq!(summary, PayoutSummary { submitted: 1, postponed: 1, failed: 0 });
    assert!(settlement.fetch_transfer(small.into_inner().id).await.unwrap().unwrap().is_submitted());
    let large = settlement.fetch_transfer(large.into_inner().id).await.unwrap().unwrap();
    assert_eq!(large.status, TransferStatus::Pending);
    assert!(!large.is_submitted());

    // The large transfer is still waiting for funds; the new one is refused by the node
    let refused = settlement.request_transfer(NewTransfer::new("refused", eth("0.1"), recipient)).await.unwrap();
    chain.fail_next_submission(BroadcastError::Rejected("insufficient funds for gas * price + value".into()));
    let summary = run_payout_job(&settlement).await.unwrap();
    assert_eq!(summary, PayoutSummary { submitted: 0, postponed: 1, failed: 1 });
    let refused = settlement.fetch_transfer(refused.into_inner().id).await.unwrap().unwrap();
    assert_eq!(refused.status, TransferStatus::Failed);
    assert_eq!(chain.submitted().len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn expiry_job_expires_closed_windows() {
    let db = setup().await;
    let wallet = WalletApi::new(db.clone(), AccountFactory::default());
    wallet.native_currency(CHAIN_ID).await.unwrap();
    wallet.generate_fixed_key_account().await.unwrap();
    let routes = RouteApi::new(db.clone(), EventProducers::default());
    let order = routes.create_order(NewOrder::new("expiring", eth("1"))).await.unwrap();
    routes.open_blockchain_route(order.id, 100, 10).await.unwrap();

    assert!(run_expiry_job(&routes, 110).await.unwrap().is_empty());
    let expired = run_expiry_job(&routes, 111).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, order.id);
    assert_eq!(routes.routes_for_order(order.id).await.unwrap()[0].status, RouteStatus::Expired);
    assert!(run_expiry_job(&routes, 200).await.unwrap().is_empty());
    tear_down(db).await;
}

use eth_payment_engine::{
    chain::{ConfirmedLog, ConfirmedTransaction},
    db_types::{NewOrder, OrderStatusType},
    wallets::AccountFactory,
    ChainFeedApi,
    DepositWatcher,
    LedgerApi,
    RouteApi,
    WalletApi,
};
use eth_payment_server::{
    feed::{run_feed, FeedMessage, FeedSummary},
    hooks::{create_deposit_handlers, create_notification_handlers},
};
use ethers::types::{Address, H256, U256};

use crate::support::{eth, eventually, setup, tear_down, CHAIN_ID};

mod support;

fn line(message: FeedMessage) -> String {
    serde_json::to_string(&message).unwrap()
}

#[tokio::test]
async fn feed_deposits_are_credited_and_reconciled() {
    let db = setup().await;
    let wallet = WalletApi::new(db.clone(), AccountFactory::default());
    wallet.native_currency(CHAIN_ID).await.unwrap();
    let account = wallet.generate_fixed_key_account().await.unwrap().address();

    let notifications = create_notification_handlers(5);
    let producers = notifications.producers();
    notifications.start_handlers().await;
    let routes = RouteApi::new(db.clone(), producers.clone());
    let order = routes.create_order(NewOrder::new("feed-1", eth("0.5"))).await.unwrap();
    routes.open_blockchain_route(order.id, 100, 50).await.unwrap();
    let deposits = create_deposit_handlers(5, LedgerApi::new(db.clone()), RouteApi::new(db.clone(), producers));
    let watcher = DepositWatcher::new(db.clone(), CHAIN_ID, deposits.producers());
    deposits.start_handlers().await;
    let feed = ChainFeedApi::new(db.clone(), watcher);

    let tx = ConfirmedTransaction {
        hash: H256::from_low_u64_be(1),
        from: Address::repeat_byte(0xee),
        to: Some(account),
        value: U256::from(500_000_000_000_000_000u64),
        data: "0x".into(),
        block_number: 120,
    };
    let log = ConfirmedLog { transaction_hash: H256::from_low_u64_be(2), log_index: 0, data: "0x".into() };
    let input = [
        line(FeedMessage::Transaction(tx.clone())),
        "{\"type\":\"Transaction\",\"hash\":\"0xnope\"}".to_string(),
        String::new(),
        line(FeedMessage::Transaction(tx)),
        line(FeedMessage::Log(log)),
    ]
    .join("\n");

    let summary = run_feed(input.as_bytes(), &feed).await;
    assert_eq!(summary, FeedSummary { transactions: 2, logs: 1, deposits: 1, skipped: 1 });

    let ledger = LedgerApi::new(db.clone());
    let currency = eth("0").currency;
    let (ledger_ref, currency_ref, routes_ref, order_id) = (&ledger, &currency, &routes, order.id);
    let credited = eventually(|| async move { ledger_ref.balance(&account, currency_ref).await.unwrap() == eth("0.5") });
    assert!(credited.await);
    let settled = eventually(|| async move {
        routes_ref.order(order_id).await.unwrap().map(|o| o.status) == Some(OrderStatusType::Settled)
    });
    assert!(settled.await);
    assert_eq!(ledger.entries(&account, &currency).await.unwrap().len(), 1);
    tear_down(db).await;
}

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
    time::Duration,
};

use eth_payment_engine::{
    db_types::NewOrder,
    events::{EventHandlers, EventHooks},
    wallets::AccountFactory,
    ChainFeedApi,
    DepositWatcher,
    LedgerApi,
    RouteApi,
    WalletApi,
};
use ethers::types::U256;
use log::*;

use crate::support::{eth, ether, native_transfer, setup, tear_down, tx_hash, CHAIN_ID};

mod support;

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::SeqCst)
    }
}

async fn wait_for(hook: &HookCalled, count: i32) {
    for _ in 0..100 {
        if hook.count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn deposit_subscribers_credit_and_reconcile() {
    let db = setup().await;
    let wallet = WalletApi::new(db.clone(), AccountFactory::default());
    wallet.native_currency(CHAIN_ID).await.unwrap();
    let account = wallet.generate_fixed_key_account().await.unwrap().address();

    // Downstream of the deposit subscribers
    let settled = HookCalled::default();
    let settled_copy = settled.clone();
    let mut downstream = EventHooks::default();
    downstream.on_order_settled(move |ev| {
        info!("🪝️ Order {} settled", ev.order.reference);
        settled_copy.called();
        Box::pin(async {}) as BoxedFuture
    });
    let downstream = EventHandlers::new(5, downstream);
    let routes = Arc::new(RouteApi::new(db.clone(), downstream.producers()));
    downstream.start_handlers().await;

    let credited = HookCalled::default();
    let credited_copy = credited.clone();
    let ledger = Arc::new(LedgerApi::new(db.clone()));
    let mut hooks = EventHooks::default();
    hooks.on_deposit_received(move |ev| {
        let ledger = Arc::clone(&ledger);
        let credited = credited_copy.clone();
        Box::pin(async move {
            ledger.credit(ev.account, ev.amount.clone(), ev.source_reference()).await.unwrap();
            credited.called();
        }) as BoxedFuture
    });
    let reconciler = Arc::clone(&routes);
    hooks.on_deposit_received(move |ev| {
        let routes = Arc::clone(&reconciler);
        Box::pin(async move {
            let outcome = routes.reconcile_deposit(&ev).await.unwrap();
            debug!("🪝️ {outcome:?}");
        }) as BoxedFuture
    });
    let handlers = EventHandlers::new(5, hooks);
    let watcher = DepositWatcher::new(db.clone(), CHAIN_ID, handlers.producers());
    handlers.start_handlers().await;
    let feed = ChainFeedApi::new(db.clone(), watcher);

    let order = routes.create_order(NewOrder::new("hooked-1", eth("1"))).await.unwrap();
    routes.open_blockchain_route(order.id, 100, 100).await.unwrap();
    let tx = native_transfer(tx_hash(1), account, U256::exp10(18), 150);
    feed.ingest_transaction(tx.clone()).await.unwrap().expect("deposit");
    feed.ingest_transaction(tx).await.unwrap();

    wait_for(&credited, 1).await;
    wait_for(&settled, 1).await;
    assert_eq!(credited.count(), 1);
    assert_eq!(settled.count(), 1);
    assert_eq!(LedgerApi::new(db.clone()).balance(&account, &ether()).await.unwrap(), eth("1"));
    tear_down(db).await;
}

//! Event subscribers of the daemon.
//!
//! Deposits have two independent subscribers: one credits the ledger, the other offers the deposit to the order
//! routes. The remaining events are terminal and only logged.
use std::sync::Arc;

use eth_payment_engine::{
    db_types::InsertResult,
    events::{EventHandlers, EventHooks, OrderSettled, TransferConfirmed, TransferFailed, UnreconciledDepositReceived},
    LedgerApi,
    ReconcileOutcome,
    RouteApi,
    SqliteDatabase,
};
use futures::future::BoxFuture;
use log::*;

pub fn create_deposit_handlers(
    buffer_size: usize,
    ledger: LedgerApi<SqliteDatabase>,
    routes: RouteApi<SqliteDatabase>,
) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let ledger = Arc::new(ledger);
    // --- Credit the custodial account ---
    hooks.on_deposit_received(move |ev| {
        let ledger = Arc::clone(&ledger);
        Box::pin(async move {
            let reference = ev.source_reference();
            match ledger.credit(ev.account, ev.amount.clone(), reference.as_str()).await {
                Ok(InsertResult::Inserted(_)) => {
                    info!("🪝️ Credited {} to {:#x} for {reference}", ev.amount, ev.account)
                },
                Ok(InsertResult::AlreadyExists(_)) => debug!("🪝️ Deposit {reference} was credited before"),
                Err(e) => error!("🪝️ Could not credit deposit {reference} to {:#x}. {e}", ev.account),
            }
        })
    });
    let routes = Arc::new(routes);
    // --- Reconcile against order routes ---
    hooks.on_deposit_received(move |ev| {
        let routes = Arc::clone(&routes);
        Box::pin(async move {
            match routes.reconcile_deposit(&ev).await {
                Ok(outcome) => log_outcome(&ev.source_reference(), &outcome),
                Err(e) => error!("🪝️ Could not reconcile deposit {}. {e}", ev.source_reference()),
            }
        })
    });
    EventHandlers::new(buffer_size, hooks)
}

fn log_outcome(reference: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::NoOpenRoute => debug!("🪝️ Deposit {reference} is not a payment for any order"),
        ReconcileOutcome::BeforeWindow => info!("🪝️ Deposit {reference} was mined before its route opened"),
        ReconcileOutcome::RouteExpired => info!("🪝️ Deposit {reference} arrived after its route expired"),
        ReconcileOutcome::Unreconciled(d) => {
            warn!("🪝️ Deposit {reference} is in the wrong currency for route {}. Stored as #{}", d.route_id, d.id)
        },
        ReconcileOutcome::Recorded { payment, settled: None } => {
            info!("🪝️ Deposit {reference} recorded as payment {} for order {}", payment.id, payment.order_id)
        },
        ReconcileOutcome::Recorded { payment, settled: Some(order) } => {
            info!("🪝️ Deposit {reference} recorded as payment {} and settled order {}", payment.id, order.reference)
        },
        ReconcileOutcome::AlreadyRecorded(p) => {
            debug!("🪝️ Deposit {reference} was recorded before as payment {}", p.id)
        },
    }
}

/// Subscribers for the events that end a flow. They are the integration point for notifications.
pub fn create_notification_handlers(buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_transfer_confirmed(|ev: TransferConfirmed| {
        info!(
            "🪝️ Transfer {} of {} to {:#x} confirmed in block {}. Fee: {} wei",
            ev.transfer.reference,
            ev.transfer.amount,
            ev.transfer.recipient,
            ev.receipt.block_number,
            ev.receipt.fee_paid
        );
        no_op()
    });
    hooks.on_transfer_failed(|ev: TransferFailed| {
        warn!("🪝️ Transfer {} of {} failed. {}", ev.transfer.reference, ev.transfer.amount, ev.reason);
        no_op()
    });
    hooks.on_order_settled(|ev: OrderSettled| {
        info!("🪝️ Order {} for {} settled through {}", ev.order.reference, ev.order.requested, ev.route);
        no_op()
    });
    hooks.on_unreconciled_deposit(|ev: UnreconciledDepositReceived| {
        warn!(
            "🪝️ Deposit of {} for order {} is not in the order currency ({}). It needs manual handling.",
            ev.deposit.amount, ev.order.reference, ev.order.requested.currency
        );
        no_op()
    });
    EventHandlers::new(buffer_size, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    DepositReceived,
    EventHandler,
    EventProducer,
    Handler,
    OrderSettled,
    TransferConfirmed,
    TransferFailed,
    UnreconciledDepositReceived,
};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// The publishing side of the engine's events. Every registered subscriber receives its own copy of each event.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub deposit_received_producer: Vec<EventProducer<DepositReceived>>,
    pub transfer_confirmed_producer: Vec<EventProducer<TransferConfirmed>>,
    pub transfer_failed_producer: Vec<EventProducer<TransferFailed>>,
    pub order_settled_producer: Vec<EventProducer<OrderSettled>>,
    pub unreconciled_deposit_producer: Vec<EventProducer<UnreconciledDepositReceived>>,
}

async fn publish<E: Clone + Send + Sync>(producers: &[EventProducer<E>], event: E) {
    for producer in producers {
        producer.publish_event(event.clone()).await;
    }
}

impl EventProducers {
    pub async fn publish_deposit_received(&self, event: DepositReceived) {
        publish(&self.deposit_received_producer, event).await;
    }

    pub async fn publish_transfer_confirmed(&self, event: TransferConfirmed) {
        publish(&self.transfer_confirmed_producer, event).await;
    }

    pub async fn publish_transfer_failed(&self, event: TransferFailed) {
        publish(&self.transfer_failed_producer, event).await;
    }

    pub async fn publish_order_settled(&self, event: OrderSettled) {
        publish(&self.order_settled_producer, event).await;
    }

    pub async fn publish_unreconciled_deposit(&self, event: UnreconciledDepositReceived) {
        publish(&self.unreconciled_deposit_producer, event).await;
    }
}

pub struct EventHandlers {
    pub on_deposit_received: Vec<EventHandler<DepositReceived>>,
    pub on_transfer_confirmed: Vec<EventHandler<TransferConfirmed>>,
    pub on_transfer_failed: Vec<EventHandler<TransferFailed>>,
    pub on_order_settled: Vec<EventHandler<OrderSettled>>,
    pub on_unreconciled_deposit: Vec<EventHandler<UnreconciledDepositReceived>>,
}

fn handlers<E: Send + Sync + 'static>(name: &'static str, size: usize, hooks: Vec<Handler<E>>) -> Vec<EventHandler<E>> {
    hooks.into_iter().map(|f| EventHandler::new(name, size, f)).collect()
}

fn spawn_all<E: Send + Sync + 'static>(handlers: Vec<EventHandler<E>>) {
    for handler in handlers {
        tokio::spawn(async move {
            handler.start_handler().await;
        });
    }
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_deposit_received: handlers("DepositReceived", buffer_size, hooks.on_deposit_received),
            on_transfer_confirmed: handlers("TransferConfirmed", buffer_size, hooks.on_transfer_confirmed),
            on_transfer_failed: handlers("TransferFailed", buffer_size, hooks.on_transfer_failed),
            on_order_settled: handlers("OrderSettled", buffer_size, hooks.on_order_settled),
            on_unreconciled_deposit: handlers("UnreconciledDeposit", buffer_size, hooks.on_unreconciled_deposit),
        }
    }

    pub fn producers(&self) -> EventProducers {
        EventProducers {
            deposit_received_producer: self.on_deposit_received.iter().map(|h| h.subscribe()).collect(),
            transfer_confirmed_producer: self.on_transfer_confirmed.iter().map(|h| h.subscribe()).collect(),
            transfer_failed_producer: self.on_transfer_failed.iter().map(|h| h.subscribe()).collect(),
            order_settled_producer: self.on_order_settled.iter().map(|h| h.subscribe()).collect(),
            unreconciled_deposit_producer: self.on_unreconciled_deposit.iter().map(|h| h.subscribe()).collect(),
        }
    }

    pub async fn start_handlers(self) {
        spawn_all(self.on_deposit_received);
        spawn_all(self.on_transfer_confirmed);
        spawn_all(self.on_transfer_failed);
        spawn_all(self.on_order_settled);
        spawn_all(self.on_unreconciled_deposit);
    }
}

/// Collects the subscriber callbacks for each event. Any number of subscribers may be registered per event; each
/// gets its own channel.
#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_deposit_received: Vec<Handler<DepositReceived>>,
    pub on_transfer_confirmed: Vec<Handler<TransferConfirmed>>,
    pub on_transfer_failed: Vec<Handler<TransferFailed>>,
    pub on_order_settled: Vec<Handler<OrderSettled>>,
    pub on_unreconciled_deposit: Vec<Handler<UnreconciledDepositReceived>>,
}

impl EventHooks {
    pub fn on_deposit_received<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(DepositReceived) -> BoxedFuture) + Send + Sync + 'static {
        self.on_deposit_received.push(Arc::new(f));
        self
    }

    pub fn on_transfer_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransferConfirmed) -> BoxedFuture) + Send + Sync + 'static {
        self.on_transfer_confirmed.push(Arc::new(f));
        self
    }

    pub fn on_transfer_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransferFailed) -> BoxedFuture) + Send + Sync + 'static {
        self.on_transfer_failed.push(Arc::new(f));
        self
    }

    pub fn on_order_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderSettled) -> BoxedFuture) + Send + Sync + 'static {
        self.on_order_settled.push(Arc::new(f));
        self
    }

    pub fn on_unreconciled_deposit<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(UnreconciledDepositReceived) -> BoxedFuture) + Send + Sync + 'static {
        self.on_unreconciled_deposit.push(Arc::new(f));
        self
    }
}

//! Orders and the routes through which they are paid.
//!
//! An order asks for a [`TokenAmount`]. It is paid through one or more [`PaymentRoute`]s, at most one open route of
//! each kind at a time:
//!
//! * `Internal` routes receive payments moved between users of the gateway.
//! * `Blockchain` routes bind a custodial account to the order for a window of blocks. Deposits into that account
//!   inside the window are payments for the order.
//! * `OffChain` routes accept payments through a payment channel until a deadline.
//!
//! Every payment is recorded against its route, idempotently per `(route, source_reference)`. Once the payments in
//! the order's currency add up to the requested amount, the order is settled, the paying route is filled, the
//! remaining routes are expired and [`OrderSettled`] is published.
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use epg_common::{checksum, AmountError, TokenAmount};
use log::*;

use crate::{
    db_types::{
        InsertResult,
        NewOrder,
        NewPayment,
        NewUnreconciledDeposit,
        Order,
        OrderStatusType,
        Payment,
        PaymentRoute,
        RouteKind,
        RouteStatus,
        RouteType,
        UnreconciledDeposit,
    },
    epe_api::errors::RouteError,
    events::{DepositReceived, EventProducers, OrderSettled, UnreconciledDepositReceived},
    traits::OrderManagement,
};

/// What became of a deposit, or a payment, that was offered to an order's route.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No blockchain route of the account covers the deposit's block.
    NoOpenRoute,
    /// The deposit was mined before the route was opened.
    BeforeWindow,
    /// The deposit was mined after the route's window closed, or its route expired with a closed order. The route is
    /// expired.
    RouteExpired,
    /// The deposit is not in the order's currency. It has been stored for manual handling.
    Unreconciled(UnreconciledDeposit),
    /// The payment was recorded. `settled` holds the order if this payment settled it.
    Recorded { payment: Payment, settled: Option<Order> },
    /// The payment had been recorded before. Nothing changed.
    AlreadyRecorded(Payment),
}

pub struct RouteApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B: Debug> Debug for RouteApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RouteApi ({:?})", self.db)
    }
}

impl<B> RouteApi<B>
where B: OrderManagement
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }

    pub async fn create_order(&self, order: NewOrder) -> Result<Order, RouteError> {
        if !order.requested.is_positive() {
            let reason = format!("orders must ask for a positive amount, not {}", order.requested);
            return Err(RouteError::InvalidAmount(reason));
        }
        let order = self.db.insert_order(order).await.map_err(RouteError::database)?;
        info!("🧭️ Order #{} [{}] for {} created", order.id, order.reference, order.requested);
        Ok(order)
    }

    pub async fn order(&self, order_id: i64) -> Result<Option<Order>, RouteError> {
        self.db.fetch_order(order_id).await.map_err(RouteError::database)
    }

    pub async fn order_by_reference(&self, reference: &str) -> Result<Option<Order>, RouteError> {
        self.db.fetch_order_by_reference(reference).await.map_err(RouteError::database)
    }

    pub async fn routes_for_order(&self, order_id: i64) -> Result<Vec<PaymentRoute>, RouteError> {
        self.db.fetch_routes_for_order(order_id).await.map_err(RouteError::database)
    }

    pub async fn payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, RouteError> {
        self.db.fetch_payments_for_order(order_id).await.map_err(RouteError::database)
    }

    pub async fn unreconciled_deposits(&self) -> Result<Vec<UnreconciledDeposit>, RouteError> {
        self.db.fetch_unreconciled_deposits().await.map_err(RouteError::database)
    }

    pub async fn open_internal_route(&self, order_id: i64, receiver: &str) -> Result<PaymentRoute, RouteError> {
        self.open_order(order_id).await?;
        self.open_route(order_id, RouteKind::Internal { receiver: receiver.to_string() }).await
    }

    /// Binds a free custodial account to the order for `lifetime_blocks` blocks, starting at `current_block`.
    pub async fn open_blockchain_route(
        &self,
        order_id: i64,
        current_block: u64,
        lifetime_blocks: u64,
    ) -> Result<PaymentRoute, RouteError> {
        self.open_order(order_id).await?;
        let account = self
            .db
            .fetch_available_deposit_account()
            .await
            .map_err(RouteError::database)?
            .ok_or(RouteError::NoAvailableAccount)?;
        let kind = RouteKind::Blockchain {
            account,
            start_block: current_block,
            expiration_block: current_block.saturating_add(lifetime_blocks),
        };
        self.open_route(order_id, kind).await
    }

    pub async fn open_offchain_route(
        &self,
        order_id: i64,
        channel_identity: &str,
        lifetime: Duration,
        now: DateTime<Utc>,
    ) -> Result<PaymentRoute, RouteError> {
        self.open_order(order_id).await?;
        let kind =
            RouteKind::OffChain { channel_identity: channel_identity.to_string(), expiration_time: now + lifetime };
        self.open_route(order_id, kind).await
    }

    /// Matches a deposit to the blockchain route of the receiving account whose window contains the deposit's block,
    /// and records it as a payment.
    ///
    /// A route that was expired before a deposit inside its window was confirmed still accepts that deposit, as long
    /// as its order is open. Settling the order that way fills the route.
    pub async fn reconcile_deposit(&self, deposit: &DepositReceived) -> Result<ReconcileOutcome, RouteError> {
        let account = checksum(&deposit.account);
        let block = deposit.transaction.block_number;
        let in_window =
            self.db.fetch_route_for_deposit(&deposit.account, block).await.map_err(RouteError::database)?;
        if let Some(route) = in_window {
            let order = self.fetch_order(route.order_id).await?;
            if route.status == RouteStatus::Expired {
                if order.status != OrderStatusType::Open {
                    debug!("🧭️ Deposit into {account} in block {block} is for {route}, but order #{} is closed", order.id);
                    return Ok(ReconcileOutcome::RouteExpired);
                }
                info!("🧭️ Deposit into {account} in block {block} was confirmed after {route} expired. Accepting it");
            }
            if deposit.amount.currency != order.requested.currency {
                return self.flag_unreconciled(&route, order, deposit).await;
            }
            return self.record(&route, deposit.amount.clone(), deposit.source_reference()).await;
        }
        let open_route = self.db.fetch_open_route_for_account(&deposit.account).await.map_err(RouteError::database)?;
        let Some(route) = open_route else {
            debug!("🧭️ {account} has no route covering block {block}. The deposit is not a payment for any order");
            return Ok(ReconcileOutcome::NoOpenRoute);
        };
        match route.kind {
            RouteKind::Blockchain { start_block, .. } if block < start_block => {
                debug!("🧭️ Deposit into {account} in block {block} predates {route}");
                Ok(ReconcileOutcome::BeforeWindow)
            },
            RouteKind::Blockchain { .. } => {
                info!("🧭️ Deposit into {account} in block {block} arrived after {route} closed. Expiring the route");
                self.db.expire_route(route.id).await.map_err(RouteError::database)?;
                Ok(ReconcileOutcome::RouteExpired)
            },
            _ => Ok(ReconcileOutcome::NoOpenRoute),
        }
    }

    /// Records a payment made by another user of the gateway against the order's open internal route.
    pub async fn record_internal_payment<S: Into<String>>(
        &self,
        order_id: i64,
        amount: TokenAmount,
        source_reference: S,
    ) -> Result<ReconcileOutcome, RouteError> {
        let route = self.open_route_of_type(order_id, RouteType::Internal).await?;
        self.check_currency(order_id, &amount).await?;
        self.record(&route, amount, source_reference.into()).await
    }

    /// Records a payment received through the order's open off-chain route. A payment that arrives after the route's
    /// deadline is rejected and the route is expired.
    pub async fn record_offchain_payment<S: Into<String>>(
        &self,
        order_id: i64,
        amount: TokenAmount,
        source_reference: S,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, RouteError> {
        let route = self.open_route_of_type(order_id, RouteType::OffChain).await?;
        if let RouteKind::OffChain { expiration_time, .. } = &route.kind {
            if now > *expiration_time {
                info!("🧭️ Payment for order #{order_id} arrived after {route} closed. Expiring the route");
                self.db.expire_route(route.id).await.map_err(RouteError::database)?;
                return Err(RouteError::RouteExpired(route.id));
            }
        }
        self.check_currency(order_id, &amount).await?;
        self.record(&route, amount, source_reference.into()).await
    }

    /// Expires every open route whose window has passed.
    pub async fn expire_routes(&self, current_block: u64, now: DateTime<Utc>) -> Result<Vec<PaymentRoute>, RouteError> {
        let expired = self.db.expire_routes(current_block, now).await.map_err(RouteError::database)?;
        for route in &expired {
            debug!("🧭️ {route} of order #{} expired", route.order_id);
        }
        Ok(expired)
    }

    /// Abandons an open order. Its open routes are expired with it.
    pub async fn expire_order(&self, order_id: i64) -> Result<Order, RouteError> {
        self.open_order(order_id).await?;
        let order = self.db.close_order(order_id, OrderStatusType::Expired).await.map_err(RouteError::database)?;
        info!("🧭️ Order #{order_id} [{}] expired", order.reference);
        Ok(order)
    }

    async fn open_route(&self, order_id: i64, kind: RouteKind) -> Result<PaymentRoute, RouteError> {
        let route = self.db.insert_route(order_id, kind).await.map_err(RouteError::database)?;
        info!("🧭️ Opened {route} for order #{order_id}");
        Ok(route)
    }

    async fn record(
        &self,
        route: &PaymentRoute,
        amount: TokenAmount,
        source_reference: String,
    ) -> Result<ReconcileOutcome, RouteError> {
        let payment = NewPayment { order_id: route.order_id, route_id: route.id, amount, source_reference };
        let result = self.db.record_payment(payment).await.map_err(RouteError::database)?;
        let payment = match result.payment {
            InsertResult::Inserted(p) => p,
            InsertResult::AlreadyExists(p) => {
                debug!("🧭️ Payment [{}] on {route} was already recorded", p.source_reference);
                return Ok(ReconcileOutcome::AlreadyRecorded(p));
            },
        };
        info!("🧭️ Payment of {} recorded against order #{} via {route}", payment.amount, route.order_id);
        if let Some(order) = &result.settled_order {
            let filled =
                self.db.fetch_route(route.id).await.map_err(RouteError::database)?.unwrap_or_else(|| route.clone());
            info!("🧭️ Order #{} [{}] is settled", order.id, order.reference);
            self.producers.publish_order_settled(OrderSettled { order: order.clone(), route: filled }).await;
        }
        Ok(ReconcileOutcome::Recorded { payment, settled: result.settled_order })
    }

    async fn flag_unreconciled(
        &self,
        route: &PaymentRoute,
        order: Order,
        deposit: &DepositReceived,
    ) -> Result<ReconcileOutcome, RouteError> {
        let new_deposit = NewUnreconciledDeposit {
            route_id: route.id,
            account: deposit.account,
            transaction_hash: deposit.transaction.hash,
            amount: deposit.amount.clone(),
        };
        let result = self.db.insert_unreconciled_deposit(new_deposit).await.map_err(RouteError::database)?;
        let inserted = result.is_inserted();
        let stored = result.into_inner();
        if inserted {
            warn!(
                "🧭️ Deposit of {} for order #{} does not match the requested {}. It needs manual attention",
                stored.amount, order.id, order.requested
            );
            let event = UnreconciledDepositReceived { deposit: stored.clone(), order };
            self.producers.publish_unreconciled_deposit(event).await;
        }
        Ok(ReconcileOutcome::Unreconciled(stored))
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Order, RouteError> {
        self.db.fetch_order(order_id).await.map_err(RouteError::database)?.ok_or(RouteError::OrderNotFound(order_id))
    }

    async fn open_order(&self, order_id: i64) -> Result<Order, RouteError> {
        let order = self.fetch_order(order_id).await?;
        if order.status != OrderStatusType::Open {
            return Err(RouteError::OrderNotOpen { order_id, status: order.status });
        }
        Ok(order)
    }

    async fn open_route_of_type(&self, order_id: i64, route_type: RouteType) -> Result<PaymentRoute, RouteError> {
        let routes = self.db.fetch_routes_for_order(order_id).await.map_err(RouteError::database)?;
        routes
            .into_iter()
            .find(|r| r.is_open() && r.kind.route_type() == route_type)
            .ok_or(RouteError::NoOpenRoute { order_id, route_type })
    }

    async fn check_currency(&self, order_id: i64, amount: &TokenAmount) -> Result<(), RouteError> {
        let order = self.fetch_order(order_id).await?;
        if amount.currency != order.requested.currency {
            return Err(AmountError::CurrencyMismatch {
                left: order.requested.currency.to_string(),
                right: amount.currency.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use ethers::types::Address;

use crate::db_types::{
    InsertResult,
    NewOrder,
    NewPayment,
    NewUnreconciledDeposit,
    Order,
    OrderStatusType,
    Payment,
    PaymentRecordResult,
    PaymentRoute,
    RouteKind,
    UnreconciledDeposit,
};

/// Orders, the routes through which they can be paid, and the payments received on those routes.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    type Error: std::error::Error;

    /// Stores a new order with status `Open`. Order references are unique.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, Self::Error>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, Self::Error>;

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, Self::Error>;

    /// Sets the order status and expires any routes of the order that are still open.
    async fn close_order(&self, order_id: i64, status: OrderStatusType) -> Result<Order, Self::Error>;

    /// Opens a new route for the order. An order can have at most one open route of each type, and an account can
    /// be bound to at most one open blockchain route.
    async fn insert_route(&self, order_id: i64, kind: RouteKind) -> Result<PaymentRoute, Self::Error>;

    async fn fetch_route(&self, route_id: i64) -> Result<Option<PaymentRoute>, Self::Error>;

    async fn fetch_routes_for_order(&self, order_id: i64) -> Result<Vec<PaymentRoute>, Self::Error>;

    /// The open blockchain route bound to the account, if any.
    async fn fetch_open_route_for_account(&self, account: &Address) -> Result<Option<PaymentRoute>, Self::Error>;

    /// The latest open or expired blockchain route of the account whose block window contains `block`.
    async fn fetch_route_for_deposit(&self, account: &Address, block: u64) -> Result<Option<PaymentRoute>, Self::Error>;

    /// A custodial account that is not bound to any open blockchain route.
    async fn fetch_available_deposit_account(&self) -> Result<Option<Address>, Self::Error>;

    /// Marks an open route as expired. Returns `None` if the route was not open.
    async fn expire_route(&self, route_id: i64) -> Result<Option<PaymentRoute>, Self::Error>;

    /// Expires every open blockchain route whose window ended before `current_block`, and every open off-chain
    /// route whose expiration time has passed. Returns the expired routes.
    async fn expire_routes(&self, current_block: u64, now: DateTime<Utc>) -> Result<Vec<PaymentRoute>, Self::Error>;

    /// In a single atomic transaction,
    /// * stores the payment. Payments are unique per `(route, source_reference)`; a repeat changes nothing.
    /// * sums the payments for the order in the order's currency.
    /// * if the sum reaches the requested amount, marks the order `Settled` and the route `Filled`, even if the route
    ///   had expired in the meantime.
    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentRecordResult, Self::Error>;

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, Self::Error>;

    /// Stores the deposit for manual handling. Unique per `(route, transaction_hash, currency)`.
    async fn insert_unreconciled_deposit(
        &self,
        deposit: NewUnreconciledDeposit,
    ) -> Result<InsertResult<UnreconciledDeposit>, Self::Error>;

    async fn fetch_unreconciled_deposits(&self) -> Result<Vec<UnreconciledDeposit>, Self::Error>;
}

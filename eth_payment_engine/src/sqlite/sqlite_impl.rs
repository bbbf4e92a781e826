//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module. Operations that touch more than one table run inside a single database transaction.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use epg_common::{Currency, TokenAmount};
use ethers::types::{Address, H256};
use log::*;
use sqlx::SqlitePool;

use super::{
    db::{accounts, chain_records, currencies, db_url, ledger, new_pool, orders, payments, routes, transfers},
    SqliteDatabaseError,
};
use crate::{
    chain::{ConfirmedLog, ConfirmedTransaction},
    db_types::{
        BalanceEntry,
        InsertResult,
        NewBalanceEntry,
        NewOrder,
        NewPayment,
        NewTransfer,
        NewUnreconciledDeposit,
        Order,
        OrderStatusType,
        Payment,
        PaymentRecordResult,
        PaymentRoute,
        RouteKind,
        RouteStatus,
        Transfer,
        TransferStatus,
        UnreconciledDeposit,
    },
    traits::{
        ChainRecordManagement,
        CurrencyManagement,
        CustodialAccountManagement,
        LedgerManagement,
        OrderManagement,
        TransferManagement,
    },
    wallets::CustodialAccount,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connects to the database named by `EPG_DATABASE_URL`, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SqliteDatabaseError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub async fn run_migrations(&self) -> Result<(), SqliteDatabaseError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl CurrencyManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn fetch_or_create_currency(&self, currency: Currency) -> Result<Currency, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        currencies::fetch_or_create(currency, &mut conn).await
    }

    async fn fetch_currency(&self, chain_id: u64, address: &Address) -> Result<Option<Currency>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        currencies::fetch(chain_id, address, &mut conn).await
    }

    async fn fetch_currencies(&self, chain_id: u64) -> Result<Vec<Currency>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        currencies::fetch_for_chain(chain_id, &mut conn).await
    }
}

impl CustodialAccountManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_custodial_account(&self, account: &CustodialAccount) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::insert(account, &mut conn).await
    }

    async fn fetch_custodial_account(&self, address: &Address) -> Result<Option<CustodialAccount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch(address, &mut conn).await
    }

    async fn fetch_custodial_accounts(&self) -> Result<Vec<CustodialAccount>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_all(&mut conn).await
    }

    async fn next_derivation_index(&self) -> Result<u32, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        accounts::next_derivation_index(&mut conn).await
    }
}

impl LedgerManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_balance_entry(&self, entry: NewBalanceEntry) -> Result<InsertResult<BalanceEntry>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::idempotent_insert(entry, &mut conn).await
    }

    async fn fetch_balance_entries(
        &self,
        account: &Address,
        currency: &Currency,
    ) -> Result<Vec<BalanceEntry>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        ledger::fetch_entries(account, currency, &mut conn).await
    }
}

impl ChainRecordManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_transaction(&self, tx: &ConfirmedTransaction) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        chain_records::insert_transaction(tx, &mut conn).await
    }

    async fn fetch_transaction(&self, hash: &H256) -> Result<Option<ConfirmedTransaction>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        chain_records::fetch_transaction(hash, &mut conn).await
    }

    async fn fetch_confirmed_height(&self) -> Result<Option<u64>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        chain_records::fetch_highest_block(&mut conn).await
    }

    async fn insert_log(&self, log: &ConfirmedLog) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        chain_records::insert_log(log, &mut conn).await
    }

    async fn fetch_logs(&self, transaction_hash: &H256) -> Result<Vec<ConfirmedLog>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        chain_records::fetch_logs(transaction_hash, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_order(&self, order: NewOrder) -> Result<Order, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::insert(order, &mut conn).await
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch(order_id, &mut conn).await
    }

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_by_reference(reference, &mut conn).await
    }

    async fn close_order(&self, order_id: i64, status: OrderStatusType) -> Result<Order, Self::Error> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_status(order_id, status, &mut tx).await?;
        let expired = routes::expire_open_for_order(order_id, None, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order #{order_id} closed as {status}. {} open route(s) expired", expired.len());
        Ok(order)
    }

    async fn insert_route(&self, order_id: i64, kind: RouteKind) -> Result<PaymentRoute, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::insert(order_id, kind, &mut conn).await
    }

    async fn fetch_route(&self, route_id: i64) -> Result<Option<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::fetch(route_id, &mut conn).await
    }

    async fn fetch_routes_for_order(&self, order_id: i64) -> Result<Vec<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::fetch_for_order(order_id, &mut conn).await
    }

    async fn fetch_open_route_for_account(&self, account: &Address) -> Result<Option<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::fetch_open_for_account(account, &mut conn).await
    }

    async fn fetch_route_for_deposit(&self, account: &Address, block: u64) -> Result<Option<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::fetch_for_deposit(account, block, &mut conn).await
    }

    async fn fetch_available_deposit_account(&self) -> Result<Option<Address>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::fetch_available_account(&mut conn).await
    }

    async fn expire_route(&self, route_id: i64) -> Result<Option<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::close(route_id, RouteStatus::Expired, &mut conn).await
    }

    async fn expire_routes(&self, current_block: u64, now: DateTime<Utc>) -> Result<Vec<PaymentRoute>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        routes::expire_stale(current_block, now, &mut conn).await
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<PaymentRecordResult, Self::Error> {
        // The insert comes first so that the transaction takes the write lock before it reads anything
        let mut tx = self.pool.begin().await?;
        let order_id = payment.order_id;
        let route_id = payment.route_id;
        let result = payments::idempotent_insert(payment, &mut tx).await?;
        let order = orders::fetch(order_id, &mut tx).await?.ok_or(SqliteDatabaseError::OrderNotFound(order_id))?;
        if !result.is_inserted() || order.status != OrderStatusType::Open {
            tx.commit().await?;
            return Ok(PaymentRecordResult { payment: result, settled_order: None });
        }
        let received = payments::fetch_for_order(order_id, &mut tx).await?;
        let requested = &order.requested;
        let total = TokenAmount::aggregate(
            received.iter().map(|p| &p.amount).filter(|a| a.currency == requested.currency),
            &requested.currency,
        );
        let settled_order = if total.try_ge(requested)? {
            let settled = orders::update_status(order_id, OrderStatusType::Settled, &mut tx).await?;
            routes::fill(route_id, &mut tx).await?;
            let expired = routes::expire_open_for_order(order_id, Some(route_id), &mut tx).await?;
            info!(
                "🗃️ Order #{order_id} [{}] settled with {total}. {} other route(s) expired",
                settled.reference,
                expired.len()
            );
            Some(settled)
        } else {
            debug!("🗃️ Order #{order_id} has received {total} of {requested}");
            None
        };
        tx.commit().await?;
        Ok(PaymentRecordResult { payment: result, settled_order })
    }

    async fn fetch_payments_for_order(&self, order_id: i64) -> Result<Vec<Payment>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_for_order(order_id, &mut conn).await
    }

    async fn insert_unreconciled_deposit(
        &self,
        deposit: NewUnreconciledDeposit,
    ) -> Result<InsertResult<UnreconciledDeposit>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_unreconciled(deposit, &mut conn).await
    }

    async fn fetch_unreconciled_deposits(&self) -> Result<Vec<UnreconciledDeposit>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_unreconciled(&mut conn).await
    }
}

impl TransferManagement for SqliteDatabase {
    type Error = SqliteDatabaseError;

    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<InsertResult<Transfer>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::idempotent_insert(transfer, &mut conn).await
    }

    async fn fetch_transfer(&self, id: i64) -> Result<Option<Transfer>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch(id, &mut conn).await
    }

    async fn fetch_transfer_by_reference(&self, reference: &str) -> Result<Option<Transfer>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch_by_reference(reference, &mut conn).await
    }

    async fn fetch_unsubmitted_transfers(&self) -> Result<Vec<Transfer>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch_pending(false, &mut conn).await
    }

    async fn fetch_submitted_transfers(&self) -> Result<Vec<Transfer>, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::fetch_pending(true, &mut conn).await
    }

    async fn claim_transfer(&self, id: i64) -> Result<bool, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::claim(id, &mut conn).await
    }

    async fn release_transfer_claim(&self, id: i64) -> Result<(), Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::release_claim(id, &mut conn).await
    }

    async fn mark_transfer_submitted(&self, id: i64, sender: &Address, hash: &H256) -> Result<Transfer, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::mark_submitted(id, sender, hash, &mut conn).await
    }

    async fn mark_transfer_failed(&self, id: i64, reason: &str) -> Result<Transfer, Self::Error> {
        let mut conn = self.pool.acquire().await?;
        transfers::finalize(id, TransferStatus::Failed, Some(reason), &mut conn).await
    }

    async fn confirm_transfer(&self, id: i64, debits: Vec<NewBalanceEntry>) -> Result<Transfer, Self::Error> {
        let mut tx = self.pool.begin().await?;
        for debit in debits {
            let reference = debit.source_reference.clone();
            if !ledger::idempotent_insert(debit, &mut tx).await?.is_inserted() {
                warn!("🗃️ Debit [{reference}] for transfer #{id} was already on the ledger");
            }
        }
        let transfer = transfers::finalize(id, TransferStatus::Confirmed, None, &mut tx).await?;
        tx.commit().await?;
        Ok(transfer)
    }
}

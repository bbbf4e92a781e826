//! # Ethereum payment engine public API
//!
//! The `epe_api` module exposes the programmatic API of the payment engine. Each API is a thin, stateless layer over a
//! storage backend (and, where needed, the chain traits in [`crate::chain`]), so clients can pick the pieces they need.
//!
//! * [`chain_feed_api`] is the publish point for confirmed transactions and logs delivered by the ingestion process.
//! * [`deposit_watcher`] classifies confirmed activity as deposits into custodial accounts.
//! * [`ledger_api`] credits, debits and reports balances of custodial accounts.
//! * [`fund_selector`] picks a custodial account that can fund an outbound transfer.
//! * [`settlement_api`] requests, builds, signs, broadcasts and settles outbound transfers.
//! * [`route_api`] manages orders, the routes through which they are paid, and payment reconciliation.
//! * [`wallet_api`] manages the currency registry and the custodial accounts.
//!
//! # API usage
//!
//! An API instance is created by supplying a backend that implements the storage traits the API requires.
//!
//! ```rust,ignore
//! use eth_payment_engine::{LedgerApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements LedgerManagement
//! let api = LedgerApi::new(db);
//! let balance = api.balance(&account, &currency).await?;
//! ```
use epg_common::Currency;

use crate::traits::CurrencyManagement;

pub mod chain_feed_api;
pub mod deposit_watcher;
pub mod errors;
pub mod fund_selector;
pub mod ledger_api;
pub mod route_api;
pub mod settlement_api;
pub mod wallet_api;

/// The registered native currency of the chain. It is registered with the default metadata if it is missing.
pub(crate) async fn native_currency<B: CurrencyManagement>(db: &B, chain_id: u64) -> Result<Currency, B::Error> {
    db.fetch_or_create_currency(Currency::ether(chain_id)).await
}

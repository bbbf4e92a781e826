//! Ethereum Payment Engine
//!
//! The Ethereum Payment Engine lets a merchant accept native-currency and ERC20 token payments into custodial
//! accounts, and pays funds back out of those accounts. This library contains the core logic of the gateway. It does
//! not talk to a node itself: confirmed chain activity is pushed in through [`ChainFeedApi`], and everything else it
//! needs from the chain is reached through the traits in [`chain`].
//!
//! The library is divided into these main sections:
//! 1. Storage ([`traits`] and, with the `sqlite` feature, [`sqlite`]). The storage traits define what a backend must
//!    provide. The data types that are stored are defined in [`db_types`] and are public.
//! 2. The public API ([`epe_api`]). Deposit detection, the account ledger, fund selection and settlement of outbound
//!    transfers, and reconciliation of payments against orders.
//! 3. Custody ([`wallets`]). Fixed-key and HD-derived custodial accounts, and signing on their behalf.
//!
//! The engine publishes events when deposits arrive, transfers settle and orders are paid. A simple pub-sub framework
//! ([`events`]) lets you hook into these events and react to them.
pub mod chain;
pub mod db_types;
pub mod epe_api;
pub mod events;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;
pub mod wallets;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use epe_api::{
    chain_feed_api::ChainFeedApi,
    deposit_watcher::DepositWatcher,
    errors::{ChainFeedError, DepositWatcherError, LedgerError, RouteError, SettlementError, WalletApiError},
    fund_selector::FundSelector,
    ledger_api::LedgerApi,
    route_api::{ReconcileOutcome, RouteApi},
    settlement_api::SettlementApi,
    wallet_api::WalletApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use traits::{
    ChainRecordManagement,
    CurrencyManagement,
    CustodialAccountManagement,
    LedgerManagement,
    OrderManagement,
    TransferManagement,
};

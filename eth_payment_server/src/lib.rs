//! # Ethereum payment gateway daemon
//!
//! The daemon wires the payment engine to the outside world. It is responsible for:
//! * Reading confirmed transactions and logs from the chain feed and handing them to the engine.
//! * Crediting deposits to the ledger and reconciling them against open payment routes.
//! * Paying out pending transfers through a JSON-RPC node, and settling them once their receipts are mined.
//! * Expiring payment routes whose window has closed.
//!
//! Operators create custodial accounts, orders, routes and payouts with the subcommands in [cli](cli/index.html).
//!
//! ## Configuration
//! The daemon is configured via environment variables. See [config](config/index.html) for more information.
pub mod admin;
pub mod cli;
pub mod config;
pub mod errors;
pub mod expiry_worker;
pub mod feed;
pub mod hooks;
pub mod payout_worker;
pub mod receipt_worker;
pub mod rpc;
pub mod server;

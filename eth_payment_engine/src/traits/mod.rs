//! # Storage backends
//!
//! The traits in this module define the contracts a storage backend must satisfy to support the payment engine.
//! Each trait covers one concern and carries its own associated error type, so that APIs only ask for what they use.
//!
//! * [`CurrencyManagement`] keeps the registry of native currencies and tracked ERC20 tokens.
//! * [`CustodialAccountManagement`] stores the custodial accounts whose keys the gateway controls.
//! * [`LedgerManagement`] is the append-only record of balance movements on custodial accounts.
//! * [`ChainRecordManagement`] stores the confirmed transactions and logs delivered by the chain feed.
//! * [`OrderManagement`] handles orders, their payment routes, and the payments recorded against them.
//! * [`TransferManagement`] tracks outbound transfers from request to settlement.
mod chain_records;
mod currency_management;
mod custodial_accounts;
mod ledger_management;
mod order_management;
mod transfer_management;

pub use chain_records::ChainRecordManagement;
pub use currency_management::CurrencyManagement;
pub use custodial_accounts::CustodialAccountManagement;
pub use ledger_management::LedgerManagement;
pub use order_management::OrderManagement;
pub use transfer_management::TransferManagement;

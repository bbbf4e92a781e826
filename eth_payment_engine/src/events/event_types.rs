use epg_common::TokenAmount;
use ethers::types::Address;
use serde::Serialize;

use crate::{
    chain::{ConfirmedTransaction, TransferReceipt},
    db_types::{Order, PaymentRoute, Transfer, UnreconciledDeposit},
};

/// A confirmed transfer of value into a custodial account.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositReceived {
    pub account: Address,
    pub transaction: ConfirmedTransaction,
    pub amount: TokenAmount,
}

impl DepositReceived {
    pub fn new(account: Address, transaction: ConfirmedTransaction, amount: TokenAmount) -> Self {
        Self { account, transaction, amount }
    }

    /// The ledger reference for the credit this deposit produces.
    pub fn source_reference(&self) -> String {
        format!("{:#x}", self.transaction.hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferConfirmed {
    pub transfer: Transfer,
    pub receipt: TransferReceipt,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferFailed {
    pub transfer: Transfer,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSettled {
    pub order: Order,
    pub route: PaymentRoute,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnreconciledDepositReceived {
    pub deposit: UnreconciledDeposit,
    pub order: Order,
}

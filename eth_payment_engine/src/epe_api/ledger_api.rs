//! The account ledger.
//!
//! Balances are never stored. Every movement of funds on a custodial account is an immutable [`BalanceEntry`], and a
//! balance is the sum of the entries for an `(account, currency)` pair. Credits and debits are idempotent per
//! `(account, currency, source_reference)`, so replaying a deposit or a receipt never counts it twice.
//!
//! The ledger does not check for overdrafts. Whether an account can afford a payout is decided by the
//! [`crate::FundSelector`] before the transfer is made.
use std::fmt::Debug;

use epg_common::{checksum, Currency, TokenAmount};
use ethers::types::Address;
use log::*;

use crate::{
    db_types::{BalanceEntry, InsertResult, NewBalanceEntry},
    epe_api::errors::LedgerError,
    traits::LedgerManagement,
};

pub struct LedgerApi<B> {
    db: B,
}

impl<B: Debug> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi ({:?})", self.db)
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Adds `amount` to the account's balance. A repeated credit with the same reference returns the entry that is
    /// already on the ledger as [`InsertResult::AlreadyExists`].
    pub async fn credit<S: Into<String>>(
        &self,
        account: Address,
        amount: TokenAmount,
        source_reference: S,
    ) -> Result<InsertResult<BalanceEntry>, LedgerError> {
        if amount.amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let entry = NewBalanceEntry::new(account, amount, source_reference);
        let result = self.db.insert_balance_entry(entry).await.map_err(LedgerError::database)?;
        log_entry(&result);
        Ok(result)
    }

    /// Subtracts `amount` from the account's balance. The amount is given as a positive value and stored negated.
    pub async fn debit<S: Into<String>>(
        &self,
        account: Address,
        amount: TokenAmount,
        source_reference: S,
    ) -> Result<InsertResult<BalanceEntry>, LedgerError> {
        if amount.amount.is_sign_negative() {
            return Err(LedgerError::NegativeAmount(amount));
        }
        let entry = NewBalanceEntry::new(account, amount.negated(), source_reference);
        let result = self.db.insert_balance_entry(entry).await.map_err(LedgerError::database)?;
        log_entry(&result);
        Ok(result)
    }

    pub async fn balance(&self, account: &Address, currency: &Currency) -> Result<TokenAmount, LedgerError> {
        self.db.fetch_balance(account, currency).await.map_err(LedgerError::database)
    }

    /// The balance of the account in each of the given currencies, in the same order.
    pub async fn balances(&self, account: &Address, currencies: &[Currency]) -> Result<Vec<TokenAmount>, LedgerError> {
        let mut result = Vec::with_capacity(currencies.len());
        for currency in currencies {
            result.push(self.balance(account, currency).await?);
        }
        Ok(result)
    }

    pub async fn entries(&self, account: &Address, currency: &Currency) -> Result<Vec<BalanceEntry>, LedgerError> {
        self.db.fetch_balance_entries(account, currency).await.map_err(LedgerError::database)
    }
}

fn log_entry(result: &InsertResult<BalanceEntry>) {
    match result {
        InsertResult::Inserted(e) => {
            info!("📒️ {} recorded for {} [{}]", e.amount, checksum(&e.account), e.source_reference)
        },
        InsertResult::AlreadyExists(e) => {
            debug!("📒️ [{}] has already been recorded for {}", e.source_reference, checksum(&e.account))
        },
    }
}

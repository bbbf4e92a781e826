//! Picks the custodial account that pays for an outbound transfer.
//!
//! An account qualifies if its ledger balances cover the transfer and the gas it will burn:
//!
//! * native payouts need `balance(native) >= amount + gas_reserve`,
//! * token payouts need `balance(token) >= amount` and `balance(native) >= gas_reserve`,
//!
//! where `gas_reserve = gas_price * transfer_gas_limit`. One of the qualifying accounts is chosen at random, which
//! spreads payouts (and their nonces) across accounts.
//!
//! The reserve is not held back between selection and settlement. Two payouts selected at the same moment can both
//! count on the same funds; the chain rejects the one that comes up short.
use std::fmt::Debug;

use epg_common::{checksum, Currency, TokenAmount};
use ethers::types::U256;
use log::*;
use rand::seq::SliceRandom;

use crate::{
    chain::ChainState,
    epe_api::{errors::SettlementError, native_currency},
    traits::{CurrencyManagement, CustodialAccountManagement, LedgerManagement},
    wallets::CustodialAccount,
};

#[derive(Clone)]
pub struct FundSelector<B, C> {
    db: B,
    chain: C,
    transfer_gas_limit: u64,
}

impl<B, C> Debug for FundSelector<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FundSelector (gas limit {})", self.transfer_gas_limit)
    }
}

impl<B, C> FundSelector<B, C>
where
    B: CustodialAccountManagement + LedgerManagement + CurrencyManagement,
    C: ChainState,
{
    pub fn new(db: B, chain: C, transfer_gas_limit: u64) -> Self {
        Self { db, chain, transfer_gas_limit }
    }

    pub fn transfer_gas_limit(&self) -> u64 {
        self.transfer_gas_limit
    }

    /// The native currency needed to pay for one transfer at the current gas price.
    pub async fn gas_reserve(&self, native: &Currency) -> Result<TokenAmount, SettlementError> {
        let gas_price = self.chain.gas_price().await?;
        let wei = gas_price.saturating_mul(U256::from(self.transfer_gas_limit));
        Ok(TokenAmount::from_base_units(native.clone(), wei)?)
    }

    /// All custodial accounts that can fund `amount` plus gas.
    pub async fn candidates(&self, amount: &TokenAmount) -> Result<Vec<CustodialAccount>, SettlementError> {
        let native = native_currency(&self.db, amount.currency.chain_id).await.map_err(SettlementError::database)?;
        let reserve = self.gas_reserve(&native).await?;
        let accounts = self.db.fetch_custodial_accounts().await.map_err(SettlementError::database)?;
        let mut result = Vec::new();
        for account in accounts {
            let address = account.address();
            let native_balance =
                self.db.fetch_balance(&address, &native).await.map_err(SettlementError::database)?;
            let qualifies = if amount.is_native() {
                native_balance.try_ge(&amount.checked_add(&reserve)?)?
            } else {
                let token_balance =
                    self.db.fetch_balance(&address, &amount.currency).await.map_err(SettlementError::database)?;
                token_balance.try_ge(amount)? && native_balance.try_ge(&reserve)?
            };
            trace!("💸️ {} {} fund {amount}", checksum(&address), if qualifies { "can" } else { "cannot" });
            if qualifies {
                result.push(account);
            }
        }
        Ok(result)
    }

    /// Chooses one of the qualifying accounts at random. `None` if no account can fund the transfer.
    pub async fn select_for_transfer(&self, amount: &TokenAmount) -> Result<Option<CustodialAccount>, SettlementError> {
        let candidates = self.candidates(amount).await?;
        let choice = candidates.choose(&mut rand::thread_rng()).cloned();
        match &choice {
            Some(account) => {
                debug!("💸️ {account} selected from {} candidate(s) to pay {amount}", candidates.len())
            },
            None => warn!("💸️ No custodial account can pay {amount} plus gas"),
        }
        Ok(choice)
    }
}

//! The currency registry and the custodial accounts.
//!
//! Deposits are only recognised in registered currencies and into stored custodial accounts, so this API defines what
//! the rest of the engine watches. New accounts are either random fixed-key accounts or HD accounts derived from the
//! configured seed at the next unused index.
use std::fmt::Debug;

use epg_common::{Currency, TokenAmount};
use ethers::types::Address;
use log::*;

use crate::{
    epe_api::{errors::WalletApiError, native_currency},
    traits::{CurrencyManagement, CustodialAccountManagement, LedgerManagement},
    wallets::{AccountFactory, CustodialAccount, CustodyError},
};

pub struct WalletApi<B> {
    db: B,
    factory: AccountFactory,
}

impl<B: Debug> Debug for WalletApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WalletApi ({:?})", self.db)
    }
}

impl<B> WalletApi<B>
where B: CurrencyManagement + CustodialAccountManagement + LedgerManagement
{
    pub fn new(db: B, factory: AccountFactory) -> Self {
        Self { db, factory }
    }

    /// The chain's native currency, registered on first use.
    pub async fn native_currency(&self, chain_id: u64) -> Result<Currency, WalletApiError> {
        native_currency(&self.db, chain_id).await.map_err(WalletApiError::database)
    }

    /// Starts tracking deposits of an ERC20 token. Registering a token twice returns the original registration.
    pub async fn register_token(&self, token: Currency) -> Result<Currency, WalletApiError> {
        if !token.is_erc20() {
            return Err(WalletApiError::NotAToken(token.to_string()));
        }
        let stored = self.db.fetch_or_create_currency(token).await.map_err(WalletApiError::database)?;
        info!("🔑️ Tracking token {stored}");
        Ok(stored)
    }

    pub async fn tracked_tokens(&self, chain_id: u64) -> Result<Vec<Currency>, WalletApiError> {
        let currencies = self.db.fetch_currencies(chain_id).await.map_err(WalletApiError::database)?;
        Ok(currencies.into_iter().filter(Currency::is_erc20).collect())
    }

    pub async fn generate_fixed_key_account(&self) -> Result<CustodialAccount, WalletApiError> {
        let account = self.factory.generate_fixed_key();
        self.db.insert_custodial_account(&account).await.map_err(WalletApiError::database)?;
        info!("🔑️ New fixed-key custodial account {account}");
        Ok(account)
    }

    /// Derives the account at the lowest unused index from the configured seed.
    pub async fn generate_derived_account(&self) -> Result<CustodialAccount, WalletApiError> {
        if !self.factory.has_seed() {
            return Err(CustodyError::MissingSeed.into());
        }
        let index = self.db.next_derivation_index().await.map_err(WalletApiError::database)?;
        let account = self.factory.derive(index)?;
        self.db.insert_custodial_account(&account).await.map_err(WalletApiError::database)?;
        info!("🔑️ New derived custodial account {account} at index {index}");
        Ok(account)
    }

    pub async fn custodial_accounts(&self) -> Result<Vec<CustodialAccount>, WalletApiError> {
        self.db.fetch_custodial_accounts().await.map_err(WalletApiError::database)
    }

    /// The account's balance in every currency registered on the chain.
    pub async fn balances_for_account(
        &self,
        account: &Address,
        chain_id: u64,
    ) -> Result<Vec<TokenAmount>, WalletApiError> {
        let currencies = self.db.fetch_currencies(chain_id).await.map_err(WalletApiError::database)?;
        let mut balances = Vec::with_capacity(currencies.len());
        for currency in &currencies {
            balances.push(self.db.fetch_balance(account, currency).await.map_err(WalletApiError::database)?);
        }
        Ok(balances)
    }
}

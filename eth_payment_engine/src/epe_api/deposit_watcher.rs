//! Detects deposits into custodial accounts.
//!
//! The watcher has two entry points, one for confirmed transactions and one for confirmed logs. Native-currency
//! deposits are visible from the transaction alone. Token deposits need both the transaction (for the `transfer`
//! call data) and its log, and the two can arrive in either order, so both entry points attempt the token path once
//! everything it needs is stored.
//!
//! Publishing [`DepositReceived`] is the watcher's only side effect. Anything that cannot be decoded is logged and
//! skipped.
use std::fmt::Debug;

use epg_common::{checksum, Currency};
use ethers::types::Address;
use log::*;

use crate::{
    chain::{ConfirmedLog, ConfirmedTransaction, DecodedTransfer, TransferDecoder},
    epe_api::{errors::DepositWatcherError, native_currency},
    events::{DepositReceived, EventProducers},
    traits::{ChainRecordManagement, CurrencyManagement, CustodialAccountManagement},
};

pub struct DepositWatcher<B> {
    db: B,
    chain_id: u64,
    producers: EventProducers,
}

impl<B> Debug for DepositWatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DepositWatcher (chain {})", self.chain_id)
    }
}

impl<B> DepositWatcher<B>
where B: ChainRecordManagement + CurrencyManagement + CustodialAccountManagement
{
    pub fn new(db: B, chain_id: u64, producers: EventProducers) -> Self {
        Self { db, chain_id, producers }
    }

    pub async fn on_transaction_confirmed(
        &self,
        tx: &ConfirmedTransaction,
    ) -> Result<Option<DepositReceived>, DepositWatcherError> {
        let Some(to) = tx.to else {
            trace!("🔎️ {:#x} is a contract deployment", tx.hash);
            return Ok(None);
        };
        if self.db.fetch_custodial_account(&to).await.map_err(DepositWatcherError::database)?.is_some() {
            let native = native_currency(&self.db, self.chain_id).await.map_err(DepositWatcherError::database)?;
            let deposit = match TransferDecoder::decode_native(tx, &native) {
                Some(decoded) => Some(self.emit(tx, decoded).await),
                None => None,
            };
            return Ok(deposit);
        }
        let Some(token) = self.token_at(&to).await? else {
            return Ok(None);
        };
        let logs = self.db.fetch_logs(&tx.hash).await.map_err(DepositWatcherError::database)?;
        if logs.is_empty() {
            trace!("🔎️ {:#x} calls {token}. Waiting for its logs", tx.hash);
            return Ok(None);
        }
        self.token_deposit(tx, &logs, &token).await
    }

    pub async fn on_log_confirmed(&self, log: &ConfirmedLog) -> Result<Option<DepositReceived>, DepositWatcherError> {
        let hash = log.transaction_hash;
        let Some(tx) = self.db.fetch_transaction(&hash).await.map_err(DepositWatcherError::database)? else {
            debug!("🔎️ Log {} arrived before transaction {hash:#x}. Ignoring it for now", log.log_index);
            return Ok(None);
        };
        let Some(to) = tx.to else {
            return Ok(None);
        };
        let Some(token) = self.token_at(&to).await? else {
            trace!("🔎️ Log {} of {hash:#x} is not from a tracked token", log.log_index);
            return Ok(None);
        };
        let logs = self.db.fetch_logs(&hash).await.map_err(DepositWatcherError::database)?;
        self.token_deposit(&tx, &logs, &token).await
    }

    async fn token_at(&self, address: &Address) -> Result<Option<Currency>, DepositWatcherError> {
        let currency = self.db.fetch_currency(self.chain_id, address).await.map_err(DepositWatcherError::database)?;
        Ok(currency.filter(Currency::is_erc20))
    }

    async fn token_deposit(
        &self,
        tx: &ConfirmedTransaction,
        logs: &[ConfirmedLog],
        token: &Currency,
    ) -> Result<Option<DepositReceived>, DepositWatcherError> {
        let Some(decoded) = TransferDecoder::decode_token(tx, logs, token) else {
            return Ok(None);
        };
        let custodial =
            self.db.fetch_custodial_account(&decoded.recipient).await.map_err(DepositWatcherError::database)?;
        if custodial.is_none() {
            trace!("🔎️ {:#x} pays {} to {}, which is not ours", tx.hash, decoded.amount, checksum(&decoded.recipient));
            return Ok(None);
        }
        Ok(Some(self.emit(tx, decoded).await))
    }

    async fn emit(&self, tx: &ConfirmedTransaction, decoded: DecodedTransfer) -> DepositReceived {
        let event = DepositReceived::new(decoded.recipient, tx.clone(), decoded.amount);
        info!(
            "🔎️ Deposit of {} into {} in transaction {:#x} (block {})",
            event.amount,
            checksum(&event.account),
            tx.hash,
            tx.block_number
        );
        self.producers.publish_deposit_received(event.clone()).await;
        event
    }
}

//! The publish point for confirmed chain activity.
//!
//! The process that follows the chain hands every confirmed transaction and log to [`ChainFeedApi`]. The feed stores
//! each record exactly once and only then passes it on to the [`DepositWatcher`]. Replaying the feed is harmless:
//! records that are already stored are acknowledged and ignored.
use std::fmt::Debug;

use log::*;

use crate::{
    chain::{ConfirmedLog, ConfirmedTransaction},
    epe_api::{deposit_watcher::DepositWatcher, errors::ChainFeedError},
    events::DepositReceived,
    traits::{ChainRecordManagement, CurrencyManagement, CustodialAccountManagement},
};

pub struct ChainFeedApi<B> {
    db: B,
    watcher: DepositWatcher<B>,
}

impl<B> Debug for ChainFeedApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainFeedApi")
    }
}

impl<B> ChainFeedApi<B>
where B: ChainRecordManagement + CurrencyManagement + CustodialAccountManagement
{
    pub fn new(db: B, watcher: DepositWatcher<B>) -> Self {
        Self { db, watcher }
    }

    pub async fn ingest_transaction(
        &self,
        tx: ConfirmedTransaction,
    ) -> Result<Option<DepositReceived>, ChainFeedError> {
        let inserted = self.db.insert_transaction(&tx).await.map_err(ChainFeedError::database)?;
        if !inserted {
            debug!("🔎️ Transaction {:#x} has already been ingested", tx.hash);
            return Ok(None);
        }
        trace!("🔎️ Transaction {:#x} in block {} ingested", tx.hash, tx.block_number);
        Ok(self.watcher.on_transaction_confirmed(&tx).await?)
    }

    /// The highest block the feed has delivered a transaction from. Route windows are judged against this height
    /// rather than the node's head, which may be ahead of the confirmed feed.
    pub async fn confirmed_height(&self) -> Result<Option<u64>, ChainFeedError> {
        self.db.fetch_confirmed_height().await.map_err(ChainFeedError::database)
    }

    pub async fn ingest_log(&self, log: ConfirmedLog) -> Result<Option<DepositReceived>, ChainFeedError> {
        let inserted = self.db.insert_log(&log).await.map_err(ChainFeedError::database)?;
        if !inserted {
            debug!("🔎️ Log {} of {:#x} has already been ingested", log.log_index, log.transaction_hash);
            return Ok(None);
        }
        trace!("🔎️ Log {} of {:#x} ingested", log.log_index, log.transaction_hash);
        Ok(self.watcher.on_log_confirmed(&log).await?)
    }
}

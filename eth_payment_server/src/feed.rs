//! The JSON-lines chain feed.
//!
//! The ingestion process writes one confirmed record per line. Each record is handed to the engine's
//! [`ChainFeedApi`], which persists it exactly once and runs deposit detection on it. Lines that cannot be parsed, and
//! records the engine refuses, are logged and skipped so that one bad record never stalls the feed.
use eth_payment_engine::{
    chain::{ConfirmedLog, ConfirmedTransaction},
    traits::{ChainRecordManagement, CurrencyManagement, CustodialAccountManagement},
    ChainFeedApi,
};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedMessage {
    Transaction(ConfirmedTransaction),
    Log(ConfirmedLog),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub transactions: usize,
    pub logs: usize,
    pub deposits: usize,
    pub skipped: usize,
}

/// Consumes the feed until the reader is exhausted.
pub async fn run_feed<R, B>(reader: R, feed: &ChainFeedApi<B>) -> FeedSummary
where
    R: AsyncBufRead + Unpin,
    B: ChainRecordManagement + CustodialAccountManagement + CurrencyManagement,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("📡️ Could not read from the chain feed. {e}");
                break;
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        let message = match serde_json::from_str::<FeedMessage>(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!("📡️ Skipping malformed feed record. {e}. Record: {line}");
                summary.skipped += 1;
                continue;
            },
        };
        let result = match message {
            FeedMessage::Transaction(tx) => {
                summary.transactions += 1;
                trace!("📡️ Transaction {:#x} in block {}", tx.hash, tx.block_number);
                feed.ingest_transaction(tx).await
            },
            FeedMessage::Log(log) => {
                summary.logs += 1;
                trace!("📡️ Log #{} of {:#x}", log.log_index, log.transaction_hash);
                feed.ingest_log(log).await
            },
        };
        match result {
            Ok(Some(deposit)) => {
                debug!("📡️ Deposit of {} into {:#x}", deposit.amount, deposit.account);
                summary.deposits += 1;
            },
            Ok(None) => {},
            Err(e) => {
                error!("📡️ Could not ingest feed record. {e}. Record: {line}");
                summary.skipped += 1;
            },
        }
    }
    info!(
        "📡️ Chain feed closed after {} transactions and {} logs. {} deposits detected, {} records skipped.",
        summary.transactions, summary.logs, summary.deposits, summary.skipped
    );
    summary
}

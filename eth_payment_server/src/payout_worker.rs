use std::time::Duration;

use eth_payment_engine::{
    chain::{Broadcaster, ChainState},
    SettlementApi,
    SettlementError,
    SqliteDatabase,
};
use log::*;
use tokio::task::JoinHandle;

use crate::rpc::EthRpcClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayoutSummary {
    pub submitted: usize,
    /// Transfers that could not be paid out now and will be retried
    pub postponed: usize,
    pub failed: usize,
}

/// Starts the payout worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_payout_worker(settlement: SettlementApi<SqliteDatabase, EthRpcClient>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Payout worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running payout job");
            match run_payout_job(&settlement).await {
                Ok(summary) if summary == PayoutSummary::default() => trace!("🕰️ No payouts pending"),
                Ok(summary) => info!(
                    "🕰️ Payout job complete. {} submitted, {} postponed, {} failed",
                    summary.submitted, summary.postponed, summary.failed
                ),
                Err(e) => error!("🕰️ Error running payout job: {e}"),
            }
        }
    })
}

/// Signs and broadcasts every pending transfer that has not been submitted yet.
///
/// Transfers are processed one at a time, so a single worker never races itself for an account's nonce.
pub async fn run_payout_job<C>(settlement: &SettlementApi<SqliteDatabase, C>) -> Result<PayoutSummary, SettlementError>
where C: ChainState + Broadcaster + Clone {
    let mut summary = PayoutSummary::default();
    for transfer in settlement.unsubmitted_transfers().await? {
        match settlement.execute_transfer(transfer.id).await {
            Ok(t) => {
                debug!("🕰️ Transfer {} [{}] submitted as {:?}", t.id, t.reference, t.transaction_hash);
                summary.submitted += 1;
            },
            Err(SettlementError::TransferInProgress(_)) => {
                debug!("🕰️ Transfer {} [{}] is being broadcast elsewhere", transfer.id, transfer.reference);
            },
            Err(e) if e.is_retryable() => {
                warn!("🕰️ Transfer {} [{}] postponed. {e}", transfer.id, transfer.reference);
                summary.postponed += 1;
            },
            Err(e) => {
                error!("🕰️ Transfer {} [{}] could not be paid out. {e}", transfer.id, transfer.reference);
                summary.failed += 1;
            },
        }
    }
    Ok(summary)
}

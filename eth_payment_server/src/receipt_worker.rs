use std::time::Duration;

use eth_payment_engine::{SettlementApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::rpc::EthRpcClient;

/// Starts the receipt worker, which settles submitted transfers once their transactions are mined. Do not await the
/// returned JoinHandle, as it will run indefinitely.
pub fn start_receipt_worker(
    settlement: SettlementApi<SqliteDatabase, EthRpcClient>,
    chain: EthRpcClient,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Receipt worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Polling receipts of submitted transfers");
            match settlement.poll_receipts(&chain).await {
                Ok(settled) => settled.iter().for_each(|t| {
                    info!("🕰️ Transfer {} [{}] is {}", t.id, t.reference, t.status);
                }),
                Err(e) => error!("🕰️ Error polling receipts: {e}"),
            }
        }
    })
}

use std::time::Duration;

use chrono::Utc;
use eth_payment_engine::{db_types::PaymentRoute, traits::ChainRecordManagement, RouteApi, RouteError, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the route expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Blockchain route windows are measured against the highest block the chain feed has delivered, not the node's head.
/// A deposit that is mined inside a window but confirmed late is therefore never judged against a window that the
/// feed has not reached yet.
pub fn start_expiry_worker(routes: RouteApi<SqliteDatabase>, db: SqliteDatabase, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Route expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running route expiry job");
            let confirmed_height = match db.fetch_confirmed_height().await {
                Ok(height) => height.unwrap_or_default(),
                Err(e) => {
                    warn!("🕰️ Could not fetch the confirmed feed height. Route expiry will be retried. {e}");
                    continue;
                },
            };
            match run_expiry_job(&routes, confirmed_height).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No routes expired"),
                Ok(expired) => info!("🕰️ {} routes expired: {}", expired.len(), route_list(&expired)),
                Err(e) => error!("🕰️ Error running route expiry job: {e}"),
            }
        }
    })
}

/// Expires blockchain routes whose window closed before `confirmed_height` and off-chain routes past their deadline.
pub async fn run_expiry_job(
    routes: &RouteApi<SqliteDatabase>,
    confirmed_height: u64,
) -> Result<Vec<PaymentRoute>, RouteError> {
    routes.expire_routes(confirmed_height, Utc::now()).await
}

fn route_list(routes: &[PaymentRoute]) -> String {
    routes.iter().map(|r| format!("[order {}] {r}", r.order_id)).collect::<Vec<String>>().join(", ")
}

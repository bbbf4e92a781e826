use eth_payment_engine::{
    wallets::AccountFactory,
    ChainFeedApi,
    DepositWatcher,
    LedgerApi,
    RouteApi,
    SettlementApi,
    SqliteDatabase,
    WalletApi,
    WalletApiError,
};
use log::*;
use tokio::io::BufReader;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    feed::run_feed,
    hooks::{create_deposit_handlers, create_notification_handlers},
    payout_worker::start_payout_worker,
    receipt_worker::start_receipt_worker,
    rpc::EthRpcClient,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await?;
    let chain = EthRpcClient::new(&config.rpc_url)?;
    chain.verify_chain_id(config.chain_id).await?;
    let factory = AccountFactory::new(config.wallet_seed.clone());
    register_currencies(&config, WalletApi::new(db.clone(), factory.clone())).await?;

    // Terminal events are wired first, so that the APIs that publish them can be handed their producers.
    let notifications = create_notification_handlers(config.event_buffer_size);
    let producers = notifications.producers();
    notifications.start_handlers().await;

    let ledger = LedgerApi::new(db.clone());
    let routes = RouteApi::new(db.clone(), producers.clone());
    let deposits = create_deposit_handlers(config.event_buffer_size, ledger, routes);
    let watcher = DepositWatcher::new(db.clone(), config.chain_id, deposits.producers());
    deposits.start_handlers().await;
    let feed = ChainFeedApi::new(db.clone(), watcher);

    let new_settlement_api = || {
        let factory = factory.clone();
        SettlementApi::new(db.clone(), chain.clone(), factory, config.transfer_gas_limit, producers.clone())
    };
    let workers = [
        start_expiry_worker(RouteApi::new(db.clone(), producers.clone()), db.clone(), config.route_expiry_interval),
        start_receipt_worker(new_settlement_api(), chain.clone(), config.receipt_poll_interval),
        start_payout_worker(new_settlement_api(), config.payout_interval),
    ];

    info!("🚀️ Payment gateway is running on chain {}. Reading the chain feed from stdin.", config.chain_id);
    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        _ = run_feed(stdin, &feed) => {
            info!("🚀️ The chain feed has closed. Workers keep running until the process is interrupted.");
            tokio::signal::ctrl_c().await?;
        },
        result = tokio::signal::ctrl_c() => result?,
    }
    info!("🚀️ Shutting down");
    workers.iter().for_each(|w| w.abort());
    db.close().await;
    Ok(())
}

/// Registers the native currency and the configured tokens.
pub async fn register_currencies(config: &ServerConfig, wallet: WalletApi<SqliteDatabase>) -> Result<(), ServerError> {
    let init_error = |e: WalletApiError| ServerError::InitializeError(e.to_string());
    let native = wallet.native_currency(config.chain_id).await.map_err(init_error)?;
    info!("🚀️ Native currency: {native}");
    for token in &config.tracked_tokens {
        let currency = wallet.register_token(token.currency(config.chain_id)).await.map_err(init_error)?;
        info!("🚀️ Tracking token {currency}");
    }
    if wallet.custodial_accounts().await.map_err(init_error)?.is_empty() {
        warn!("🚀️ There are no custodial accounts yet. No deposits can be detected until one is generated.");
    }
    Ok(())
}

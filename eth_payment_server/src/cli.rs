//! Command-line interface of the daemon. Without a subcommand the daemon runs. The other subcommands are operator
//! tools that act on the configured database and exit.
use std::{env, env::VarError};

use clap::{Args, Parser, Subcommand};
use epg_common::{checksum, parse_address};
use eth_payment_engine::{wallets::AccountFactory, SqliteDatabase, WalletApi};

use crate::{
    admin::Admin,
    config::ServerConfig,
    errors::{AdminError, ServerError},
    rpc::EthRpcClient,
    server::register_currencies,
};

const HELP: &str = include_str!("./cli-help.txt");

/// Secrets must never be listed here.
const PUBLIC_ENVS: [&str; 11] = [
    "RUST_LOG",
    "EPG_DATABASE_URL",
    "EPG_MAX_DB_CONNECTIONS",
    "EPG_RPC_URL",
    "EPG_CHAIN_ID",
    "EPG_TRANSFER_GAS_LIMIT",
    "EPG_TRACKED_TOKENS",
    "EPG_ROUTE_EXPIRY_INTERVAL",
    "EPG_RECEIPT_POLL_INTERVAL",
    "EPG_PAYOUT_INTERVAL",
    "EPG_EVENT_BUFFER_SIZE",
];

#[derive(Parser, Debug)]
#[command(version, about = "Ethereum payment gateway daemon", after_help = HELP)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the daemon. This is the default
    #[clap(name = "run")]
    Run,
    /// Prints the non-secret part of the configuration
    #[clap(name = "config")]
    PrintConfig,
    /// Generates a new custodial account
    #[clap(name = "account")]
    NewAccount {
        /// Derive the account from the configured seed instead of generating a fresh key
        #[arg(short, long)]
        derived: bool,
    },
    /// Creates an order that customers can pay into
    #[clap(name = "order")]
    NewOrder(NewOrderParams),
    /// Opens a blockchain payment route for an order
    #[clap(name = "route")]
    OpenRoute(OpenRouteParams),
    /// Requests a payout. The daemon's payout worker broadcasts it
    #[clap(name = "transfer")]
    RequestTransfer(TransferParams),
    /// Prints ledger balances
    #[clap(name = "balances")]
    Balances {
        /// Only this account. All custodial accounts are listed otherwise
        account: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct NewOrderParams {
    /// The order's unique reference
    #[arg(short, long)]
    pub reference: String,
    /// The requested amount, in whole units of the currency
    #[arg(short, long)]
    pub amount: String,
    /// The currency code of a registered currency
    #[arg(short, long, default_value = "ETH")]
    pub currency: String,
}

#[derive(Debug, Args)]
pub struct OpenRouteParams {
    /// The reference of the order
    #[arg(short, long = "order")]
    pub reference: String,
    /// First block of the window. Defaults to the highest block the chain feed has delivered
    #[arg(short, long)]
    pub start: Option<u64>,
    /// Length of the window in blocks
    #[arg(short, long, default_value = "100")]
    pub blocks: u64,
}

#[derive(Debug, Args)]
pub struct TransferParams {
    /// The transfer's unique reference
    #[arg(short, long)]
    pub reference: String,
    /// The amount to pay, in whole units of the currency
    #[arg(short, long)]
    pub amount: String,
    /// The currency code of a registered currency
    #[arg(short, long, default_value = "ETH")]
    pub currency: String,
    /// The recipient's address
    #[arg(short = 't', long = "to")]
    pub recipient: String,
}

/// Prints the non-secret environment values the daemon would be configured with.
pub fn print_config() {
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    for name in PUBLIC_ENVS {
        println!("  {name:<35} {}", env_value(name));
    }
}

/// Runs an operator command against the configured database.
pub async fn run_admin_command(command: Command, config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.run_migrations().await?;
    let factory = AccountFactory::new(config.wallet_seed.clone());
    let admin = Admin::new(
        db.clone(),
        EthRpcClient::new(&config.rpc_url)?,
        factory.clone(),
        config.chain_id,
        config.transfer_gas_limit,
    );
    register_currencies(&config, WalletApi::new(db.clone(), factory)).await?;
    let result = execute(&admin, command).await;
    db.close().await;
    result.map_err(|e| ServerError::BackendError(e.to_string()))
}

async fn execute(admin: &Admin<EthRpcClient>, command: Command) -> Result<(), AdminError> {
    match command {
        Command::Run | Command::PrintConfig => {},
        Command::NewAccount { derived } => {
            let account = admin.new_account(derived).await?;
            println!("New custodial account: {account}");
        },
        Command::NewOrder(params) => {
            let order = admin.new_order(&params.reference, &params.amount, &params.currency).await?;
            println!("Order #{} [{}] for {} created", order.id, order.reference, order.requested);
        },
        Command::OpenRoute(params) => {
            let route = admin.open_route(&params.reference, params.start, params.blocks).await?;
            println!("Order [{}] can be paid via {route}", params.reference);
        },
        Command::RequestTransfer(params) => {
            let transfer =
                admin.request_transfer(&params.reference, &params.amount, &params.currency, &params.recipient).await?;
            println!(
                "Transfer #{} [{}] of {} to {} is {}",
                transfer.id,
                transfer.reference,
                transfer.amount,
                checksum(&transfer.recipient),
                transfer.status
            );
        },
        Command::Balances { account } => {
            let account = match account {
                Some(a) => Some(parse_address(&a).map_err(|e| AdminError::InvalidAddress(e.to_string()))?),
                None => None,
            };
            for (address, balances) in admin.balances(account).await? {
                let list = balances.iter().map(|b| b.to_string()).collect::<Vec<String>>().join(", ");
                println!("{}: {list}", checksum(&address));
            }
        },
    }
    Ok(())
}

fn env_value(name: &str) -> String {
    match env::var(name) {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    }
}

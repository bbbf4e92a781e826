use clap::Parser;
use dotenvy::dotenv;
use eth_payment_server::{
    cli::{print_config, run_admin_command, Arguments, Command},
    config::ServerConfig,
    server::run_server,
};
use log::info;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = ServerConfig::from_env_or_default();
    let result = match args.command {
        None | Some(Command::Run) => {
            info!("🚀️ Starting payment gateway with database {} and node {}", config.database_url, config.rpc_url);
            run_server(config).await.map(|_| println!("Bye!"))
        },
        Some(Command::PrintConfig) => {
            print_config();
            Ok(())
        },
        Some(command) => run_admin_command(command, config).await,
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

use std::{env, fmt::Display, str::FromStr, time::Duration};

use epg_common::{parse_address, Address, Currency, Secret};
use eth_payment_engine::wallets::WalletSeed;
use log::*;

const DEFAULT_EPG_DATABASE_URL: &str = "sqlite://data/epg_store.db";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;
const DEFAULT_EPG_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_CHAIN_ID: u64 = 1;
const DEFAULT_TRANSFER_GAS_LIMIT: u64 = 200_000;
const DEFAULT_ROUTE_EXPIRY_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_PAYOUT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub max_db_connections: u32,
    /// The JSON-RPC endpoint used for chain state, broadcasting and receipts.
    pub rpc_url: String,
    /// The chain the gateway operates on. The node must report the same chain id at startup.
    pub chain_id: u64,
    /// The gas limit for every payout transaction. It also sizes the gas reserve the fund selector demands.
    pub transfer_gas_limit: u64,
    /// The seed derived custodial accounts are generated from. Without one, only fixed-key accounts are available.
    pub wallet_seed: Option<WalletSeed>,
    /// ERC20 tokens to register in the currency registry at startup.
    pub tracked_tokens: Vec<TrackedToken>,
    pub route_expiry_interval: Duration,
    pub receipt_poll_interval: Duration,
    pub payout_interval: Duration,
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_EPG_DATABASE_URL.to_string(),
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            rpc_url: DEFAULT_EPG_RPC_URL.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            transfer_gas_limit: DEFAULT_TRANSFER_GAS_LIMIT,
            wallet_seed: None,
            tracked_tokens: Vec::new(),
            route_expiry_interval: DEFAULT_ROUTE_EXPIRY_INTERVAL,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            payout_interval: DEFAULT_PAYOUT_INTERVAL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("EPG_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ EPG_DATABASE_URL is not set. Using {DEFAULT_EPG_DATABASE_URL}");
            DEFAULT_EPG_DATABASE_URL.into()
        });
        let rpc_url = env::var("EPG_RPC_URL").ok().unwrap_or_else(|| {
            info!("🪛️ EPG_RPC_URL is not set. Using {DEFAULT_EPG_RPC_URL}");
            DEFAULT_EPG_RPC_URL.into()
        });
        let max_db_connections = parse_or_default("EPG_MAX_DB_CONNECTIONS", DEFAULT_MAX_DB_CONNECTIONS);
        let chain_id = parse_or_default("EPG_CHAIN_ID", DEFAULT_CHAIN_ID);
        let transfer_gas_limit = parse_or_default("EPG_TRANSFER_GAS_LIMIT", DEFAULT_TRANSFER_GAS_LIMIT);
        let event_buffer_size = parse_or_default("EPG_EVENT_BUFFER_SIZE", DEFAULT_EVENT_BUFFER_SIZE);
        let route_expiry_interval = seconds_or_default("EPG_ROUTE_EXPIRY_INTERVAL", DEFAULT_ROUTE_EXPIRY_INTERVAL);
        let receipt_poll_interval = seconds_or_default("EPG_RECEIPT_POLL_INTERVAL", DEFAULT_RECEIPT_POLL_INTERVAL);
        let payout_interval = seconds_or_default("EPG_PAYOUT_INTERVAL", DEFAULT_PAYOUT_INTERVAL);
        let wallet_seed = wallet_seed(env::var("EPG_HD_WALLET_MNEMONIC").ok(), env::var("EPG_HD_WALLET_ROOT_KEY").ok());
        let tracked_tokens = env::var("EPG_TRACKED_TOKENS").map(|s| parse_tracked_tokens(&s)).unwrap_or_default();
        Self {
            database_url,
            max_db_connections,
            rpc_url,
            chain_id,
            transfer_gas_limit,
            wallet_seed,
            tracked_tokens,
            route_expiry_interval,
            receipt_poll_interval,
            payout_interval,
            event_buffer_size,
        }
    }
}

//-------------------------------------------------  TrackedToken  -----------------------------------------------------
/// An ERC20 token given in `EPG_TRACKED_TOKENS` as `CODE:0xaddress:decimals`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedToken {
    pub code: String,
    pub address: Address,
    pub decimals: u32,
}

impl TrackedToken {
    pub fn currency(&self, chain_id: u64) -> Currency {
        Currency::token(chain_id, self.address, self.code.as_str(), self.code.as_str(), self.decimals)
    }
}

impl FromStr for TrackedToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s.trim().split(':').map(str::trim).collect::<Vec<&str>>();
        let [code, address, decimals] = parts.as_slice() else {
            return Err(format!("expected CODE:0xaddress:decimals, got '{s}'"));
        };
        if code.is_empty() {
            return Err(format!("the token code is missing in '{s}'"));
        }
        let address = parse_address(address).map_err(|e| e.to_string())?;
        let decimals = decimals.parse::<u32>().map_err(|e| format!("invalid decimals in '{s}'. {e}"))?;
        Ok(Self { code: code.to_string(), address, decimals })
    }
}

/// Invalid entries are skipped with a warning rather than rejecting the whole list.
pub fn parse_tracked_tokens(value: &str) -> Vec<TrackedToken> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            s.parse::<TrackedToken>().map_err(|e| warn!("🪛️ Ignoring invalid entry in EPG_TRACKED_TOKENS: {e}")).ok()
        })
        .collect()
}

//---------------------------------------------------  Helpers  --------------------------------------------------------

/// The mnemonic takes precedence when both are configured.
pub fn wallet_seed(mnemonic: Option<String>, root_key: Option<String>) -> Option<WalletSeed> {
    let mnemonic = mnemonic.filter(|s| !s.trim().is_empty());
    let root_key = root_key.filter(|s| !s.trim().is_empty());
    match (mnemonic, root_key) {
        (Some(phrase), root_key) => {
            if root_key.is_some() {
                warn!("🪛️ Both EPG_HD_WALLET_MNEMONIC and EPG_HD_WALLET_ROOT_KEY are set. The mnemonic will be used.");
            }
            Some(WalletSeed::Mnemonic(Secret::new(phrase)))
        },
        (None, Some(seed)) => Some(WalletSeed::RootKey(Secret::new(seed))),
        (None, None) => {
            warn!("🪛️ No HD wallet seed is configured. Derived custodial accounts will not be available.");
            None
        },
    }
}

fn parse_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_value(name, env::var(name).ok(), default)
}

pub fn parse_value<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e}. Using the default, {default}, instead.");
            default
        }),
    }
}

fn seconds_or_default(name: &str, default: Duration) -> Duration {
    let secs = parse_value(name, env::var(name).ok(), default.as_secs());
    if secs == 0 {
        warn!("🪛️ {name} must be at least one second. Using the default, {}s, instead.", default.as_secs());
        return default;
    }
    Duration::from_secs(secs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracked_tokens() {
        let tokens = parse_tracked_tokens(
            "USDC:0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48:6, DAI:0x6B175474E89094C44Da98b954EedeAC495271d0F:18",
        );
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].code, "USDC");
        assert_eq!(tokens[0].decimals, 6);
        assert_eq!(tokens[1].code, "DAI");
        let usdc = tokens[0].currency(1);
        assert!(usdc.is_erc20());
        assert_eq!(usdc.chain_id, 1);
    }

    #[test]
    fn bad_tracked_tokens_are_skipped() {
        let tokens = parse_tracked_tokens(
            "USDC:0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48,DAI:nope:18,:0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48:6,\
             WETH:0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2:18,",
        );
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].code, "WETH");
    }

    #[test]
    fn values_fall_back_to_defaults() {
        assert_eq!(parse_value("X", Some("42".into()), 7u64), 42);
        assert_eq!(parse_value("X", Some(" 42 ".into()), 7u64), 42);
        assert_eq!(parse_value("X", Some("-1".into()), 7u64), 7);
        assert_eq!(parse_value("X", None, 7u64), 7);
    }

    #[test]
    fn mnemonic_takes_precedence() {
        let seed = wallet_seed(Some("test test".into()), Some("0x0102".into()));
        assert!(matches!(seed, Some(WalletSeed::Mnemonic(_))));
        let seed = wallet_seed(Some("  ".into()), Some("0x0102".into()));
        assert!(matches!(seed, Some(WalletSeed::RootKey(_))));
        assert!(wallet_seed(None, None).is_none());
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.database_url, "sqlite://data/epg_store.db");
        assert_eq!(config.transfer_gas_limit, 200_000);
        assert_eq!(config.payout_interval, Duration::from_secs(30));
        assert!(config.wallet_seed.is_none());
    }
}

use std::{collections::HashMap, str::FromStr};

use cucumber::World;
use epg_common::{parse_address, Currency, Decimal, TokenAmount};
use eth_payment_engine::{
    chain::ConfirmedTransaction,
    events::{DepositReceived, EventProducers},
    test_utils::{mocks::MockChain, prepare_env::new_test_database},
    wallets::AccountFactory,
    ChainFeedApi,
    DepositWatcher,
    LedgerApi,
    RouteApi,
    SettlementApi,
    SettlementError,
    SqliteDatabase,
    WalletApi,
};
use ethers::types::{Address, H256, U256};
use log::*;

pub const TRANSFER_GAS_LIMIT: u64 = 100_000;

#[derive(Debug, Default, World)]
pub struct GatewayWorld {
    pub system: Option<GatewaySystem>,
}

#[derive(Debug)]
pub struct GatewaySystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub chain_id: u64,
    pub chain: MockChain,
    pub wallet: WalletApi<SqliteDatabase>,
    pub ledger: LedgerApi<SqliteDatabase>,
    pub routes: RouteApi<SqliteDatabase>,
    pub settlement: SettlementApi<SqliteDatabase, MockChain>,
    pub feed: ChainFeedApi<SqliteDatabase>,
    pub accounts: HashMap<String, Address>,
    pub tokens: HashMap<String, Currency>,
    pub orders: HashMap<String, i64>,
    pub transfers: HashMap<String, i64>,
    pub last_settlement_error: Option<SettlementError>,
    /// A token transfer whose log has been seen but whose transaction has not
    pub pending_token_transfer: Option<(H256, String, String, U256)>,
    next_hash: u64,
}

impl GatewaySystem {
    pub async fn new(chain_id: u64) -> Self {
        let db = new_test_database(5).await;
        let db_path = db.url().to_string();
        info!("🚀️ Created test database at {db_path}");
        let chain = MockChain::new(chain_id, U256::from(10) * U256::exp10(9), 100);
        let factory = AccountFactory::default();
        let producers = EventProducers::default();
        let wallet = WalletApi::new(db.clone(), factory.clone());
        let ledger = LedgerApi::new(db.clone());
        let routes = RouteApi::new(db.clone(), producers.clone());
        let settlement =
            SettlementApi::new(db.clone(), chain.clone(), factory, TRANSFER_GAS_LIMIT, producers.clone());
        let watcher = DepositWatcher::new(db.clone(), chain_id, producers);
        let feed = ChainFeedApi::new(db.clone(), watcher);
        Self {
            db_path,
            db,
            chain_id,
            chain,
            wallet,
            ledger,
            routes,
            settlement,
            feed,
            accounts: HashMap::new(),
            tokens: HashMap::new(),
            orders: HashMap::new(),
            transfers: HashMap::new(),
            last_settlement_error: None,
            pending_token_transfer: None,
            next_hash: 0,
        }
    }

    pub fn currency(&self, code: &str) -> Currency {
        match code {
            "ETH" => Currency::ether(self.chain_id),
            _ => self.tokens.get(code).cloned().unwrap_or_else(|| panic!("Token {code} is not tracked")),
        }
    }

    pub fn amount(&self, value: &str, code: &str) -> TokenAmount {
        let value = Decimal::from_str(value).expect("Not a valid decimal amount");
        TokenAmount::new(value, self.currency(code))
    }

    pub fn account(&self, name: &str) -> Address {
        *self.accounts.get(name).unwrap_or_else(|| panic!("No custodial account named {name}"))
    }

    pub fn order_id(&self, reference: &str) -> i64 {
        *self.orders.get(reference).unwrap_or_else(|| panic!("No order {reference}"))
    }

    pub fn transfer_id(&self, reference: &str) -> i64 {
        *self.transfers.get(reference).unwrap_or_else(|| panic!("No transfer {reference}"))
    }

    pub fn fresh_hash(&mut self) -> H256 {
        self.next_hash += 1;
        H256::from_low_u64_be(0xfeed_0000 + self.next_hash)
    }

    /// Feeds a confirmed transaction to the gateway and applies any deposit it produces.
    pub async fn observe(&self, tx: ConfirmedTransaction) {
        let deposit = self.feed.ingest_transaction(tx).await.expect("Error ingesting transaction");
        if let Some(deposit) = deposit {
            self.apply_deposit(deposit).await;
        }
    }

    pub async fn apply_deposit(&self, deposit: DepositReceived) {
        self.ledger
            .credit(deposit.account, deposit.amount.clone(), deposit.source_reference())
            .await
            .expect("Error crediting deposit");
        let outcome = self.routes.reconcile_deposit(&deposit).await.expect("Error reconciling deposit");
        debug!("🚀️ Deposit reconciled: {outcome:?}");
    }
}

impl GatewayWorld {
    pub fn system(&self) -> &GatewaySystem {
        self.system.as_ref().expect("Gateway has not been started")
    }

    pub fn system_mut(&mut self) -> &mut GatewaySystem {
        self.system.as_mut().expect("Gateway has not been started")
    }
}

pub fn address(s: &str) -> Address {
    parse_address(s).expect("Not a valid address")
}

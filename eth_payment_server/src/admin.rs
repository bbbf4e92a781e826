//! Operator commands that act on the gateway's database directly. They do not need a running daemon, and the daemon
//! picks up whatever they create on its next worker run.
//!
//! * Custodial accounts are generated with [`Admin::new_account`].
//! * Orders are created with [`Admin::new_order`] and given a blockchain route with [`Admin::open_route`].
//! * Payouts are requested with [`Admin::request_transfer`]. The payout worker signs and broadcasts them.
use std::str::FromStr;

use epg_common::{checksum, parse_address, Address, Currency, Decimal, TokenAmount};
use eth_payment_engine::{
    chain::{Broadcaster, ChainState},
    db_types::{NewOrder, NewTransfer, Order, PaymentRoute, Transfer},
    events::EventProducers,
    wallets::{AccountFactory, CustodialAccount},
    ChainRecordManagement,
    LedgerApi,
    RouteApi,
    SettlementApi,
    SqliteDatabase,
    WalletApi,
};
use log::*;

use crate::errors::AdminError;

pub struct Admin<C> {
    chain_id: u64,
    db: SqliteDatabase,
    wallet: WalletApi<SqliteDatabase>,
    ledger: LedgerApi<SqliteDatabase>,
    routes: RouteApi<SqliteDatabase>,
    settlement: SettlementApi<SqliteDatabase, C>,
}

impl<C> Admin<C>
where C: ChainState + Broadcaster + Clone
{
    /// Events raised by admin commands have no subscribers. Payments recorded here are settled in the database only.
    pub fn new(db: SqliteDatabase, chain: C, factory: AccountFactory, chain_id: u64, transfer_gas_limit: u64) -> Self {
        let wallet = WalletApi::new(db.clone(), factory.clone());
        let ledger = LedgerApi::new(db.clone());
        let routes = RouteApi::new(db.clone(), EventProducers::default());
        let settlement = SettlementApi::new(db.clone(), chain, factory, transfer_gas_limit, EventProducers::default());
        Self { chain_id, db, wallet, ledger, routes, settlement }
    }

    pub async fn new_account(&self, derived: bool) -> Result<CustodialAccount, AdminError> {
        let account = match derived {
            true => self.wallet.generate_derived_account().await?,
            false => self.wallet.generate_fixed_key_account().await?,
        };
        Ok(account)
    }

    pub async fn new_order(&self, reference: &str, amount: &str, currency: &str) -> Result<Order, AdminError> {
        let requested = self.amount(amount, currency).await?;
        let order = self.routes.create_order(NewOrder::new(reference, requested)).await?;
        Ok(order)
    }

    /// Opens a blockchain route for the order with the given reference. The window starts at `start_block`, or at the
    /// highest block the chain feed has delivered when no start is given.
    pub async fn open_route(
        &self,
        reference: &str,
        start_block: Option<u64>,
        blocks: u64,
    ) -> Result<PaymentRoute, AdminError> {
        let order = self
            .routes
            .order_by_reference(reference)
            .await?
            .ok_or_else(|| AdminError::OrderNotFound(reference.to_string()))?;
        let start = match start_block {
            Some(block) => block,
            None => self.db.fetch_confirmed_height().await?.unwrap_or_default(),
        };
        debug!("🚀️ Opening a route for order #{} at block {start}", order.id);
        let route = self.routes.open_blockchain_route(order.id, start, blocks).await?;
        Ok(route)
    }

    pub async fn request_transfer(
        &self,
        reference: &str,
        amount: &str,
        currency: &str,
        recipient: &str,
    ) -> Result<Transfer, AdminError> {
        let amount = self.amount(amount, currency).await?;
        let recipient = parse_address(recipient).map_err(|e| AdminError::InvalidAddress(e.to_string()))?;
        let transfer = self.settlement.request_transfer(NewTransfer::new(reference, amount, recipient)).await?;
        if !transfer.is_inserted() {
            warn!("🚀️ A transfer with reference [{reference}] already exists. Nothing was changed");
        }
        Ok(transfer.into_inner())
    }

    /// The ledger balances of one account, or of every custodial account.
    pub async fn balances(&self, account: Option<Address>) -> Result<Vec<(Address, Vec<TokenAmount>)>, AdminError> {
        let accounts = match account {
            Some(address) => vec![address],
            None => self.wallet.custodial_accounts().await?.iter().map(CustodialAccount::address).collect(),
        };
        let mut result = Vec::with_capacity(accounts.len());
        for address in accounts {
            let balances = self.wallet.balances_for_account(&address, self.chain_id).await?;
            result.push((address, balances));
        }
        Ok(result)
    }

    pub async fn balance(&self, account: &Address, currency: &str) -> Result<TokenAmount, AdminError> {
        let currency = self.currency(currency).await?;
        Ok(self.ledger.balance(account, &currency).await?)
    }

    async fn amount(&self, value: &str, currency: &str) -> Result<TokenAmount, AdminError> {
        let value = Decimal::from_str(value).map_err(|e| AdminError::InvalidAmount(format!("{value}. {e}")))?;
        Ok(TokenAmount::new(value, self.currency(currency).await?))
    }

    /// Resolves a currency code against the registry. The native currency matches its code or `native`.
    async fn currency(&self, code: &str) -> Result<Currency, AdminError> {
        let native = self.wallet.native_currency(self.chain_id).await?;
        if code.eq_ignore_ascii_case(&native.code) || code.eq_ignore_ascii_case("native") {
            return Ok(native);
        }
        self.wallet
            .tracked_tokens(self.chain_id)
            .await?
            .into_iter()
            .find(|c| c.code.eq_ignore_ascii_case(code) || checksum(&c.address).eq_ignore_ascii_case(code))
            .ok_or_else(|| AdminError::UnknownCurrency(code.to_string()))
    }
}

use cucumber::{given, then, when};
use epg_common::Currency;
use eth_payment_engine::{
    chain::{encode_transfer_data, ConfirmedLog, ConfirmedTransaction},
    db_types::{InsertResult, NewOrder, NewTransfer, RouteKind, RouteType},
    SettlementError,
};
use ethers::types::U256;
use log::*;

use crate::cucumber::{
    world::{address, GatewaySystem},
    GatewayWorld,
};

const SENDER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

//--------------------------------------      Setup        -----------------------------------------------------------

#[given(expr = "a fresh payment gateway on chain {int}")]
async fn fresh_gateway(world: &mut GatewayWorld, chain_id: u64) {
    let system = GatewaySystem::new(chain_id).await;
    system.wallet.native_currency(chain_id).await.expect("Error registering native currency");
    world.system = Some(system);
}

#[given(expr = "the token {word} at {word} with {int} decimals is tracked")]
async fn track_token(world: &mut GatewayWorld, symbol: String, contract: String, decimals: u32) {
    let sys = world.system_mut();
    let token = Currency::token(sys.chain_id, address(&contract), &symbol, &symbol, decimals);
    let token = sys.wallet.register_token(token).await.expect("Error registering token");
    sys.tokens.insert(symbol, token);
}

#[given(expr = "the gas price is {int} gwei")]
async fn gas_price(world: &mut GatewayWorld, gwei: u64) {
    world.system().chain.set_gas_price(U256::from(gwei) * U256::exp10(9));
}

#[given(expr = "a custodial account named {string}")]
async fn custodial_account(world: &mut GatewayWorld, name: String) {
    let sys = world.system_mut();
    let account = sys.wallet.generate_fixed_key_account().await.expect("Error generating account");
    debug!("🚀️ Account {name} is {account}");
    sys.accounts.insert(name, account.address());
}

#[given(expr = "a custodial account named {string} holding {word} {word}")]
async fn funded_account(world: &mut GatewayWorld, name: String, value: String, code: String) {
    custodial_account(world, name.clone()).await;
    let sys = world.system();
    let amount = sys.amount(&value, &code);
    sys.ledger.credit(sys.account(&name), amount, format!("fund:{name}")).await.expect("Error funding account");
}

//--------------------------------------     Deposits      -----------------------------------------------------------

#[when(expr = "a transaction sends {word} {word} to {string} in block {int}")]
async fn native_deposit(world: &mut GatewayWorld, value: String, code: String, name: String, block: u64) {
    let sys = world.system_mut();
    let hash = sys.fresh_hash();
    let wei = sys.amount(&value, &code).to_base_units().expect("Amount does not fit in base units");
    let tx = ConfirmedTransaction {
        hash,
        from: address(SENDER),
        to: Some(sys.account(&name)),
        value: wei,
        data: "0x".into(),
        block_number: block,
    };
    sys.observe(tx).await;
}

#[when(expr = "the log of a transfer of {word} {word} to {string} arrives")]
async fn token_log(world: &mut GatewayWorld, value: String, code: String, name: String) {
    let sys = world.system_mut();
    let hash = sys.fresh_hash();
    let units = sys.amount(&value, &code).to_base_units().expect("Amount does not fit in base units");
    let mut word = [0u8; 32];
    units.to_big_endian(&mut word);
    let log = ConfirmedLog { transaction_hash: hash, log_index: 0, data: format!("0x{}", hex::encode(word)) };
    let deposit = sys.feed.ingest_log(log).await.expect("Error ingesting log");
    assert!(deposit.is_none(), "A log on its own must not produce a deposit");
    sys.pending_token_transfer = Some((hash, code, name, units));
}

#[when(expr = "the transaction of that transfer arrives in block {int}")]
async fn token_transaction(world: &mut GatewayWorld, block: u64) {
    let sys = world.system_mut();
    let (hash, code, name, units) = sys.pending_token_transfer.take().expect("No token transfer is in flight");
    let token = sys.currency(&code);
    let data = encode_transfer_data(sys.account(&name), units);
    let tx = ConfirmedTransaction {
        hash,
        from: address(SENDER),
        to: Some(token.address),
        value: U256::zero(),
        data: format!("0x{}", hex::encode(data)),
        block_number: block,
    };
    sys.observe(tx).await;
}

#[then(expr = "the balance of {string} is {word} {word}")]
async fn balance_is(world: &mut GatewayWorld, name: String, value: String, code: String) {
    let sys = world.system();
    let expected = sys.amount(&value, &code);
    let balance = sys.ledger.balance(&sys.account(&name), &expected.currency).await.expect("Error fetching balance");
    assert_eq!(balance, expected);
}

//--------------------------------------      Orders       -----------------------------------------------------------

#[given(expr = "an order {string} for {word} {word}")]
async fn new_order(world: &mut GatewayWorld, reference: String, value: String, code: String) {
    let sys = world.system_mut();
    let amount = sys.amount(&value, &code);
    let order = sys.routes.create_order(NewOrder::new(reference.clone(), amount)).await.expect("Error creating order");
    sys.orders.insert(reference, order.id);
}

#[given(expr = "a blockchain route for {string} opened at block {int} for {int} blocks")]
async fn blockchain_route(world: &mut GatewayWorld, reference: String, block: u64, lifetime: u64) {
    let sys = world.system();
    let route = sys
        .routes
        .open_blockchain_route(sys.order_id(&reference), block, lifetime)
        .await
        .expect("Error opening route");
    assert!(matches!(route.kind, RouteKind::Blockchain { .. }));
}

#[when(expr = "routes past block {int} expire")]
async fn expire_routes(world: &mut GatewayWorld, block: u64) {
    let sys = world.system();
    let expired = sys.routes.expire_routes(block, chrono::Utc::now()).await.expect("Error expiring routes");
    debug!("🚀️ {} routes expired at block {block}", expired.len());
}

#[then(expr = "order {string} is {word}")]
async fn order_status(world: &mut GatewayWorld, reference: String, status: String) {
    let sys = world.system();
    let order = sys.routes.order(sys.order_id(&reference)).await.expect("Error fetching order").expect("Order vanished");
    assert_eq!(order.status.to_string(), status);
}

#[then(expr = "the blockchain route of {string} is {word}")]
async fn route_status(world: &mut GatewayWorld, reference: String, status: String) {
    let sys = world.system();
    let routes = sys.routes.routes_for_order(sys.order_id(&reference)).await.expect("Error fetching routes");
    let route = routes.iter().find(|r| r.kind.route_type() == RouteType::Blockchain).expect("No blockchain route");
    assert_eq!(route.status.to_string(), status);
}

//--------------------------------------     Payouts       -----------------------------------------------------------

#[when(expr = "transfer {string} of {word} {word} to {word} is requested")]
async fn request_transfer(world: &mut GatewayWorld, reference: String, value: String, code: String, to: String) {
    let sys = world.system_mut();
    let request = NewTransfer::new(reference.clone(), sys.amount(&value, &code), address(&to));
    let result = sys.settlement.request_transfer(request).await.expect("Error requesting transfer");
    assert!(matches!(result, InsertResult::Inserted(_)));
    sys.transfers.insert(reference, result.into_inner().id);
}

#[when(expr = "transfer {string} is executed")]
async fn execute_transfer(world: &mut GatewayWorld, reference: String) {
    let sys = world.system_mut();
    let id = sys.transfer_id(&reference);
    match sys.settlement.execute_transfer(id).await {
        Ok(transfer) => {
            debug!("🚀️ Transfer {reference} submitted as {:?}", transfer.transaction_hash);
            sys.last_settlement_error = None;
        },
        Err(e) => {
            debug!("🚀️ Transfer {reference} was not submitted: {e}");
            sys.last_settlement_error = Some(e);
        },
    }
}

#[when(expr = "the transaction of transfer {string} is mined using {int} gas")]
async fn mine_transfer(world: &mut GatewayWorld, reference: String, gas: u64) {
    mine(world.system(), &reference, true, gas).await;
}

#[when(expr = "the transaction of transfer {string} reverts")]
async fn revert_transfer(world: &mut GatewayWorld, reference: String) {
    mine(world.system(), &reference, false, 30_000).await;
}

async fn mine(sys: &GatewaySystem, reference: &str, success: bool, gas: u64) {
    let transfer = sys.settlement.fetch_transfer(sys.transfer_id(reference)).await.expect("Error fetching transfer");
    let hash = transfer.and_then(|t| t.transaction_hash).expect("Transfer was never submitted");
    let gas_price = U256::from(10) * U256::exp10(9);
    sys.chain.mine(hash, success, gas_price * U256::from(gas));
    let settled = sys.settlement.poll_receipts(&sys.chain).await.expect("Error polling receipts");
    assert_eq!(settled.len(), 1);
}

#[then(expr = "transfer {string} is {word}")]
async fn transfer_status(world: &mut GatewayWorld, reference: String, status: String) {
    let sys = world.system();
    let transfer = sys.settlement.fetch_transfer(sys.transfer_id(&reference)).await.expect("Error fetching transfer");
    assert_eq!(transfer.expect("Transfer vanished").status.to_string(), status);
}

#[then(expr = "the payout is postponed for lack of funds")]
async fn postponed(world: &mut GatewayWorld) {
    let err = world.system().last_settlement_error.as_ref().expect("The payout did not fail");
    assert!(matches!(err, SettlementError::InsufficientFunds(_)), "Unexpected error: {err}");
    assert!(err.is_retryable());
}

use epg_common::{Currency, Secret};
use eth_payment_engine::{
    wallets::{AccountFactory, CustodialAccount, CustodyError, WalletSeed},
    LedgerApi,
    WalletApi,
    WalletApiError,
};
use ethers::types::Address;

use crate::support::{amount, eth, ether, setup, tear_down, usdc, CHAIN_ID};

mod support;

const HARDHAT_MNEMONIC: &str = "test test test test test test test test test test test junk";

#[tokio::test]
async fn derived_accounts_use_consecutive_indices() {
    let db = setup().await;
    let seed = WalletSeed::Mnemonic(Secret::new(HARDHAT_MNEMONIC.to_string()));
    let wallet = WalletApi::new(db.clone(), AccountFactory::new(Some(seed)));
    let first = wallet.generate_derived_account().await.unwrap();
    let second = wallet.generate_derived_account().await.unwrap();
    assert!(matches!(first, CustodialAccount::Derived { index: 0, .. }));
    assert!(matches!(second, CustodialAccount::Derived { index: 1, .. }));
    assert_eq!(first.address(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse::<Address>().unwrap());
    assert_eq!(second.address(), "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse::<Address>().unwrap());
    wallet.generate_fixed_key_account().await.unwrap();
    assert_eq!(wallet.custodial_accounts().await.unwrap().len(), 3);
    tear_down(db).await;
}

#[tokio::test]
async fn derivation_without_a_seed_fails_fast() {
    let db = setup().await;
    let wallet = WalletApi::new(db.clone(), AccountFactory::default());
    let err = wallet.generate_derived_account().await.unwrap_err();
    assert!(matches!(err, WalletApiError::CustodyError(CustodyError::MissingSeed)));
    assert!(wallet.custodial_accounts().await.unwrap().is_empty());
    let account = wallet.generate_fixed_key_account().await.unwrap();
    assert_eq!(account.kind(), "FixedKey");
    tear_down(db).await;
}

#[tokio::test]
async fn currency_registry() {
    let db = setup().await;
    let wallet = WalletApi::new(db.clone(), AccountFactory::default());
    let native = wallet.native_currency(CHAIN_ID).await.unwrap();
    assert!(native.is_native());
    assert_eq!(native.code, "ETH");
    let err = wallet.register_token(Currency::ether(CHAIN_ID)).await.unwrap_err();
    assert!(matches!(err, WalletApiError::NotAToken(_)));
    wallet.register_token(usdc()).await.unwrap();
    // The first registration wins
    let renamed = Currency::token(CHAIN_ID, usdc().address, "USDC.e", "Bridged USDC", 6);
    assert_eq!(wallet.register_token(renamed).await.unwrap().code, "USDC");
    assert_eq!(wallet.tracked_tokens(CHAIN_ID).await.unwrap(), vec![usdc()]);
    assert!(wallet.tracked_tokens(5).await.unwrap().is_empty());

    let account = wallet.generate_fixed_key_account().await.unwrap().address();
    let ledger = LedgerApi::new(db.clone());
    ledger.credit(account, eth("2"), "0x01").await.unwrap();
    ledger.credit(account, amount("10", &usdc()), "0x02").await.unwrap();
    let balances = wallet.balances_for_account(&account, CHAIN_ID).await.unwrap();
    assert_eq!(balances, vec![eth("2"), amount("10", &usdc())]);
    assert_eq!(balances[0].currency, ether());
    tear_down(db).await;
}

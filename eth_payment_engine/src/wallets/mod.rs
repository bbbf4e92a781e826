//! # Custodial accounts
//!
//! A custodial account is an address whose key the gateway controls. Two kinds exist:
//!
//! * [`CustodialAccount::FixedKey`] accounts keep their own private key, which is persisted with the account.
//! * [`CustodialAccount::Derived`] accounts only record their BIP-44 derivation index. Their key is derived on demand
//!   from the [`WalletSeed`] the [`AccountFactory`] was configured with, along `m/44'/60'/0'/0/{index}`. The seed
//!   itself is never stored.
//!
//! Key material never leaves this module. Callers hand an unsigned transaction to [`AccountFactory::sign_transaction`]
//! and get signed bytes back.
use std::fmt::Display;

use coins_bip32::{path::DerivationPath, prelude::XPriv};
use epg_common::{checksum, Secret};
use ethers::{
    core::k256::ecdsa::SigningKey,
    signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes},
};
use log::*;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CustodyError {
    #[error("No HD wallet seed has been configured. Derived accounts are unavailable.")]
    MissingSeed,
    #[error("The configured HD wallet seed is invalid: {0}")]
    InvalidSeed(String),
    #[error("Could not derive key at index {index}: {reason}")]
    DerivationFailed { index: u32, reason: String },
    #[error("The stored private key for {0} is invalid")]
    InvalidPrivateKey(String),
    #[error("The key for {address} derives address {derived}. The account record does not match the seed.")]
    KeyMismatch { address: String, derived: String },
    #[error("Could not sign transaction: {0}")]
    SigningFailed(String),
}

/// The secret an HD wallet is derived from.
#[derive(Clone, Debug)]
pub enum WalletSeed {
    /// A BIP-39 mnemonic phrase
    Mnemonic(Secret<String>),
    /// A hex-encoded BIP-32 seed
    RootKey(Secret<String>),
}

impl WalletSeed {
    fn derive(&self, index: u32) -> Result<LocalWallet, CustodyError> {
        let path = derivation_path(index);
        let failed = |e: String| CustodyError::DerivationFailed { index, reason: e };
        match self {
            WalletSeed::Mnemonic(phrase) => MnemonicBuilder::<English>::default()
                .phrase(phrase.reveal().as_str())
                .derivation_path(&path)
                .and_then(|builder| builder.build())
                .map_err(|e| failed(e.to_string())),
            WalletSeed::RootKey(seed) => {
                let seed_hex = seed.reveal().trim();
                let seed_bytes = hex::decode(seed_hex.strip_prefix("0x").unwrap_or(seed_hex))
                    .map_err(|e| CustodyError::InvalidSeed(e.to_string()))?;
                let path = path.parse::<DerivationPath>().map_err(|e| failed(e.to_string()))?;
                let root = XPriv::root_from_seed(&seed_bytes, None)
                    .map_err(|e| CustodyError::InvalidSeed(e.to_string()))?;
                let derived = root.derive_path(&path).map_err(|e| failed(e.to_string()))?;
                let key: &SigningKey = derived.as_ref();
                Ok(LocalWallet::from(key.clone()))
            },
        }
    }
}

pub fn derivation_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{index}")
}

//--------------------------------------  CustodialAccount   ---------------------------------------------------------
#[derive(Clone)]
pub enum CustodialAccount {
    FixedKey { address: Address, private_key: Secret<String> },
    Derived { address: Address, index: u32 },
}

impl CustodialAccount {
    pub fn address(&self) -> Address {
        match self {
            CustodialAccount::FixedKey { address, .. } => *address,
            CustodialAccount::Derived { address, .. } => *address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CustodialAccount::FixedKey { .. } => "FixedKey",
            CustodialAccount::Derived { .. } => "Derived",
        }
    }
}

impl std::fmt::Debug for CustodialAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustodialAccount::FixedKey { address, .. } => write!(f, "FixedKey({})", checksum(address)),
            CustodialAccount::Derived { address, index } => write!(f, "Derived({}, #{index})", checksum(address)),
        }
    }
}

impl Display for CustodialAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", checksum(&self.address()))
    }
}

impl PartialEq for CustodialAccount {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for CustodialAccount {}

//--------------------------------------   AccountFactory    ---------------------------------------------------------
/// Creates custodial accounts and signs on their behalf.
///
/// The seed is optional. A factory without one can still create and use fixed-key accounts; anything that needs a
/// derived key fails with [`CustodyError::MissingSeed`] at the time the key is needed.
#[derive(Clone, Default)]
pub struct AccountFactory {
    seed: Option<WalletSeed>,
}

impl AccountFactory {
    pub fn new(seed: Option<WalletSeed>) -> Self {
        Self { seed }
    }

    pub fn has_seed(&self) -> bool {
        self.seed.is_some()
    }

    /// Generates a new account with a random private key.
    pub fn generate_fixed_key(&self) -> CustodialAccount {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let private_key = Secret::new(hex::encode(wallet.signer().to_bytes()));
        let address = wallet.address();
        debug!("🔑️ Generated fixed-key account {}", checksum(&address));
        CustodialAccount::FixedKey { address, private_key }
    }

    /// Derives the account at `index` from the configured seed.
    pub fn derive(&self, index: u32) -> Result<CustodialAccount, CustodyError> {
        let seed = self.seed.as_ref().ok_or(CustodyError::MissingSeed)?;
        let wallet = seed.derive(index)?;
        let address = wallet.address();
        debug!("🔑️ Derived account {} at {}", checksum(&address), derivation_path(index));
        Ok(CustodialAccount::Derived { address, index })
    }

    /// Signs `tx` with the key of `account` for the given chain and returns the RLP-encoded signed transaction.
    pub fn sign_transaction(
        &self,
        account: &CustodialAccount,
        tx: &TypedTransaction,
        chain_id: u64,
    ) -> Result<Bytes, CustodyError> {
        let wallet = self.wallet_for(account)?.with_chain_id(chain_id);
        let mut tx = tx.clone();
        tx.set_chain_id(chain_id);
        tx.set_from(account.address());
        let signature = wallet.sign_transaction_sync(&tx).map_err(|e| CustodyError::SigningFailed(e.to_string()))?;
        Ok(tx.rlp_signed(&signature))
    }

    fn wallet_for(&self, account: &CustodialAccount) -> Result<LocalWallet, CustodyError> {
        let wallet = match account {
            CustodialAccount::FixedKey { private_key, address } => private_key
                .reveal()
                .parse::<LocalWallet>()
                .map_err(|_| CustodyError::InvalidPrivateKey(checksum(address)))?,
            CustodialAccount::Derived { index, .. } => {
                let seed = self.seed.as_ref().ok_or(CustodyError::MissingSeed)?;
                seed.derive(*index)?
            },
        };
        if wallet.address() != account.address() {
            return Err(CustodyError::KeyMismatch {
                address: checksum(&account.address()),
                derived: checksum(&wallet.address()),
            });
        }
        Ok(wallet)
    }
}

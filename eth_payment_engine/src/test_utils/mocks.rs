//! An in-memory chain for tests.
//!
//! [`MockChain`] implements [`ChainState`], [`Broadcaster`] and [`ReceiptSource`]. Tests set the chain state
//! directly, script broadcast failures, and decide when (and how) submitted transactions are mined.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use ethers::{
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};

use crate::chain::{BroadcastError, Broadcaster, ChainError, ChainState, ReceiptSource, TransferReceipt};

#[derive(Debug, Default)]
struct MockChainState {
    chain_id: u64,
    gas_price: U256,
    block: u64,
    nonces: HashMap<Address, U256>,
    submitted: Vec<Bytes>,
    receipts: HashMap<H256, TransferReceipt>,
    scripted_failures: VecDeque<BroadcastError>,
}

#[derive(Debug, Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChain {
    pub fn new(chain_id: u64, gas_price: U256, block: u64) -> Self {
        let state = MockChainState { chain_id, gas_price, block, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, MockChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_block(&self, block: u64) {
        self.state().block = block;
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.state().gas_price = gas_price;
    }

    pub fn set_nonce(&self, address: Address, nonce: U256) {
        self.state().nonces.insert(address, nonce);
    }

    /// The next submission fails with `error`. Calls queue up.
    pub fn fail_next_submission(&self, error: BroadcastError) {
        self.state().scripted_failures.push_back(error);
    }

    /// The raw transactions that were accepted, in order.
    pub fn submitted(&self) -> Vec<Bytes> {
        self.state().submitted.clone()
    }

    /// Mines the transaction with the given outcome, making its receipt available.
    pub fn mine(&self, transaction_hash: H256, success: bool, fee_paid: U256) -> TransferReceipt {
        let mut state = self.state();
        state.block += 1;
        let receipt = TransferReceipt { transaction_hash, block_number: state.block, success, fee_paid };
        state.receipts.insert(transaction_hash, receipt.clone());
        receipt
    }
}

impl ChainState for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.state().chain_id)
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        Ok(self.state().gas_price)
    }

    async fn next_nonce(&self, address: &Address) -> Result<U256, ChainError> {
        Ok(self.state().nonces.get(address).copied().unwrap_or_default())
    }

    async fn current_block(&self) -> Result<u64, ChainError> {
        Ok(self.state().block)
    }
}

impl Broadcaster for MockChain {
    async fn submit(&self, raw_transaction: Bytes) -> Result<H256, BroadcastError> {
        let mut state = self.state();
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        let hash = H256::from(keccak256(&raw_transaction));
        state.submitted.push(raw_transaction);
        Ok(hash)
    }
}

impl ReceiptSource for MockChain {
    async fn receipt(&self, transaction_hash: &H256) -> Result<Option<TransferReceipt>, ChainError> {
        Ok(self.state().receipts.get(transaction_hash).cloned())
    }
}

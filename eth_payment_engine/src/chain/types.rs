use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// A transaction that has been mined and confirmed by the ingestion collaborator.
///
/// `value` is in base units of the chain's native currency. `data` is the `0x`-prefixed hex encoding of the call data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub hash: H256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default = "empty_data")]
    pub data: String,
    pub block_number: u64,
}

fn empty_data() -> String {
    "0x".into()
}

/// A log emitted by a confirmed transaction. `data` is the `0x`-prefixed hex encoding of the log's data field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedLog {
    pub transaction_hash: H256,
    pub log_index: u64,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_hash: H256,
    pub block_number: u64,
    pub success: bool,
    /// `gas_used × effective_gas_price`, in base units of the native currency
    pub fee_paid: U256,
}

//! A JSON-RPC implementation of the engine's chain traits, backed by an `ethers` HTTP provider.
use std::sync::Arc;

use eth_payment_engine::chain::{BroadcastError, Broadcaster, ChainError, ChainState, ReceiptSource, TransferReceipt};
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256},
};
use log::*;

use crate::errors::ServerError;

#[derive(Clone, Debug)]
pub struct EthRpcClient {
    provider: Arc<Provider<Http>>,
}

impl EthRpcClient {
    pub fn new(rpc_url: &str) -> Result<Self, ServerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid RPC url {rpc_url}. {e}")))?;
        Ok(Self { provider: Arc::new(provider) })
    }

    /// Confirms that the node serves the chain the gateway is configured for.
    pub async fn verify_chain_id(&self, expected: u64) -> Result<(), ServerError> {
        let actual = self.chain_id().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        if actual == expected {
            info!("🔗️ Connected to a node on chain {actual}");
            Ok(())
        } else {
            Err(ServerError::ChainMismatch { expected, actual })
        }
    }
}

fn request_failed(e: ProviderError) -> ChainError {
    ChainError::RequestFailed(e.to_string())
}

impl ChainState for EthRpcClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let id = self.provider.get_chainid().await.map_err(request_failed)?;
        u64::try_from(id).map_err(|_| ChainError::InvalidResponse(format!("chain id {id} does not fit in 64 bits")))
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        self.provider.get_gas_price().await.map_err(request_failed)
    }

    async fn next_nonce(&self, address: &Address) -> Result<U256, ChainError> {
        self.provider.get_transaction_count(*address, Some(BlockNumber::Pending.into())).await.map_err(request_failed)
    }

    async fn current_block(&self) -> Result<u64, ChainError> {
        let block = self.provider.get_block_number().await.map_err(request_failed)?;
        Ok(block.as_u64())
    }
}

impl Broadcaster for EthRpcClient {
    async fn submit(&self, raw_transaction: Bytes) -> Result<H256, BroadcastError> {
        match self.provider.send_raw_transaction(raw_transaction).await {
            Ok(pending) => Ok(pending.tx_hash()),
            Err(e) => {
                let message = e.as_error_response().map(|r| r.message.as_str());
                let err = classify_broadcast_error(message, e.to_string());
                warn!("🔗️ Node did not accept the transaction. {err}");
                Err(err)
            },
        }
    }
}

impl ReceiptSource for EthRpcClient {
    async fn receipt(&self, transaction_hash: &H256) -> Result<Option<TransferReceipt>, ChainError> {
        let Some(receipt) = self.provider.get_transaction_receipt(*transaction_hash).await.map_err(request_failed)?
        else {
            return Ok(None);
        };
        // Pre-London nodes do not report an effective gas price
        let fallback_gas_price = match receipt.effective_gas_price {
            Some(_) => None,
            None => self
                .provider
                .get_transaction(*transaction_hash)
                .await
                .map_err(request_failed)?
                .and_then(|tx| tx.gas_price),
        };
        transfer_receipt(receipt, fallback_gas_price).map(Some)
    }
}

/// A JSON-RPC error response means the node saw the transaction and refused it. Anything else means the node could
/// not be reached, and the transaction may be resubmitted later.
pub fn classify_broadcast_error(rpc_message: Option<&str>, description: String) -> BroadcastError {
    match rpc_message {
        Some(msg) if msg.to_lowercase().contains("nonce too low") => BroadcastError::NonceTooLow(msg.to_string()),
        Some(msg) => BroadcastError::Rejected(msg.to_string()),
        None => BroadcastError::Unavailable(description),
    }
}

pub fn transfer_receipt(
    receipt: TransactionReceipt,
    fallback_gas_price: Option<U256>,
) -> Result<TransferReceipt, ChainError> {
    let hash = receipt.transaction_hash;
    let invalid = |what: &str| ChainError::InvalidResponse(format!("The receipt for {hash:#x} has no {what}"));
    let block_number = receipt.block_number.ok_or_else(|| invalid("block number"))?.as_u64();
    let gas_used = receipt.gas_used.ok_or_else(|| invalid("gas used"))?;
    let gas_price = receipt.effective_gas_price.or(fallback_gas_price).ok_or_else(|| invalid("gas price"))?;
    let success = receipt.status.map(|s| s.as_u64() == 1).ok_or_else(|| invalid("status"))?;
    Ok(TransferReceipt {
        transaction_hash: hash,
        block_number,
        success,
        fee_paid: gas_used.saturating_mul(gas_price),
    })
}

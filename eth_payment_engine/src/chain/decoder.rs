//! Recognises value transfers into addresses we care about.
//!
//! Native transfers are trivial: the recipient is the transaction's `to` and the amount is its `value`. ERC20
//! transfers are inferred heuristically from the call data and the single log the token contract emits. A token
//! transfer is only accepted when
//!
//! * the transaction was sent to the registered token contract,
//! * the call data is exactly `transfer(address,uint256)` with its two arguments (138 hex characters with the `0x`),
//! * the transaction emitted exactly one log, and
//! * the integer in that log's data equals the amount in the call data.
//!
//! Anything else is treated as "no transfer". The decoder never fails loudly. Ambiguous transactions are logged and
//! skipped.
use epg_common::{checksum, AmountError, Currency, TokenAmount};
use ethers::types::{Address, U256};
use log::*;
use thiserror::Error;

use super::{abi::TRANSFER_SELECTOR, ConfirmedLog, ConfirmedTransaction};

const TRANSFER_CALL_HEX_LENGTH: usize = 138;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransfer {
    pub recipient: Address,
    pub amount: TokenAmount,
}

#[derive(Debug, Error)]
enum DecodeError {
    #[error("transaction {0} has no recipient")]
    ContractCreation(String),
    #[error("transaction was sent to {actual}, not to the token contract {expected}")]
    NotTokenContract { expected: String, actual: String },
    #[error("call data is not a transfer call: {0}")]
    NotATransferCall(String),
    #[error("expected exactly one log, found {0}")]
    LogCount(usize),
    #[error("log data {0} is not a uint256")]
    InvalidLogData(String),
    #[error("call data amount {call} does not match log amount {log}")]
    LogMismatch { call: U256, log: U256 },
    #[error("{0}")]
    Amount(#[from] AmountError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferDecoder;

impl TransferDecoder {
    /// Decodes a transfer of the chain's native currency. Zero-value transactions carry nothing to credit and decode
    /// to `None`.
    pub fn decode_native(tx: &ConfirmedTransaction, native: &Currency) -> Option<DecodedTransfer> {
        let result = Self::try_decode_native(tx, native);
        Self::absent_on_error(tx, result)
    }

    /// Decodes an ERC20 `transfer` of `token`, corroborated by the transaction's logs.
    pub fn decode_token(tx: &ConfirmedTransaction, logs: &[ConfirmedLog], token: &Currency) -> Option<DecodedTransfer> {
        let result = Self::try_decode_token(tx, logs, token);
        Self::absent_on_error(tx, result)
    }

    fn absent_on_error(
        tx: &ConfirmedTransaction,
        result: Result<Option<DecodedTransfer>, DecodeError>,
    ) -> Option<DecodedTransfer> {
        match result {
            Ok(transfer) => transfer,
            Err(e) => {
                warn!("🔎️ Could not decode a transfer from transaction {:#x} ({e}). It will be ignored.", tx.hash);
                None
            },
        }
    }

    fn try_decode_native(
        tx: &ConfirmedTransaction,
        native: &Currency,
    ) -> Result<Option<DecodedTransfer>, DecodeError> {
        let recipient = tx.to.ok_or_else(|| DecodeError::ContractCreation(format!("{:#x}", tx.hash)))?;
        if tx.value.is_zero() {
            trace!("🔎️ Transaction {:#x} carries no value", tx.hash);
            return Ok(None);
        }
        let amount = TokenAmount::from_base_units(native.clone(), tx.value)?;
        Ok(Some(DecodedTransfer { recipient, amount }))
    }

    fn try_decode_token(
        tx: &ConfirmedTransaction,
        logs: &[ConfirmedLog],
        token: &Currency,
    ) -> Result<Option<DecodedTransfer>, DecodeError> {
        let to = tx.to.ok_or_else(|| DecodeError::ContractCreation(format!("{:#x}", tx.hash)))?;
        if to != token.address {
            return Err(DecodeError::NotTokenContract { expected: checksum(&token.address), actual: checksum(&to) });
        }
        let (recipient, call_amount) = parse_transfer_call(&tx.data)?;
        if logs.len() != 1 {
            return Err(DecodeError::LogCount(logs.len()));
        }
        let log_amount = parse_uint(&logs[0].data)?;
        if log_amount != call_amount {
            return Err(DecodeError::LogMismatch { call: call_amount, log: log_amount });
        }
        let amount = TokenAmount::from_base_units(token.clone(), call_amount)?;
        Ok(Some(DecodedTransfer { recipient, amount }))
    }
}

fn parse_transfer_call(data: &str) -> Result<(Address, U256), DecodeError> {
    if data.len() != TRANSFER_CALL_HEX_LENGTH {
        return Err(DecodeError::NotATransferCall(format!("{} hex characters", data.len())));
    }
    let hex_data = data.strip_prefix("0x").ok_or_else(|| DecodeError::NotATransferCall("missing 0x".into()))?;
    let bytes = hex::decode(hex_data).map_err(|e| DecodeError::NotATransferCall(e.to_string()))?;
    if bytes[..4] != TRANSFER_SELECTOR {
        return Err(DecodeError::NotATransferCall(format!("selector 0x{}", hex::encode(&bytes[..4]))));
    }
    let recipient = Address::from_slice(&bytes[16..36]);
    let amount = U256::from_big_endian(&bytes[36..68]);
    Ok((recipient, amount))
}

fn parse_uint(data: &str) -> Result<U256, DecodeError> {
    let hex_data = data.strip_prefix("0x").unwrap_or(data);
    let bytes = hex::decode(hex_data).map_err(|_| DecodeError::InvalidLogData(data.to_string()))?;
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(DecodeError::InvalidLogData(data.to_string()));
    }
    Ok(U256::from_big_endian(&bytes))
}

use std::str::FromStr;

use ethers::{types::Address, utils::to_checksum};
use thiserror::Error;

/// The reserved address that identifies the native currency of a chain.
pub const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid Ethereum address: {0}")]
pub struct AddressError(String);

pub fn null_address() -> Address {
    Address::zero()
}

pub fn is_null_address(address: &Address) -> bool {
    address.is_zero()
}

/// Renders the address in EIP-55 checksum casing.
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Parses a `0x`-prefixed, 20-byte hex address. Casing is not validated, so lower-case and checksum-cased inputs are
/// both accepted.
pub fn parse_address(s: &str) -> Result<Address, AddressError> {
    let trimmed = s.trim();
    let hex = trimmed.strip_prefix("0x").ok_or_else(|| AddressError(format!("{trimmed} is missing the 0x prefix")))?;
    if hex.len() != 40 {
        return Err(AddressError(format!("{trimmed} is not 20 bytes long")));
    }
    Address::from_str(hex).map_err(|e| AddressError(format!("{trimmed}: {e}")))
}

//! Shared value types for the Ethereum payment gateway.
//!
//! The centrepiece is [`TokenAmount`], a currency-tagged decimal that refuses to mix currencies, and the
//! [`Currency`] it is tagged with. Everything that crosses the chain boundary goes through
//! [`TokenAmount::to_base_units`] and [`TokenAmount::from_base_units`].
mod address;
mod currency;
mod secret;
mod token_amount;

pub use address::{checksum, is_null_address, null_address, parse_address, AddressError, NULL_ADDRESS};
pub use currency::{Currency, ETHER_CODE, ETHER_DECIMALS, ETHER_NAME};
pub use secret::Secret;
pub use token_amount::{AmountError, TokenAmount, MAX_DECIMALS};

pub use ethers::types::{Address, U256};
pub use rust_decimal::Decimal;

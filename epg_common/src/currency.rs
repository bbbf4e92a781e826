use std::{
    fmt::Display,
    hash::{Hash, Hasher},
};

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::address::{checksum, is_null_address, null_address};

pub const ETHER_CODE: &str = "ETH";
pub const ETHER_NAME: &str = "Ethereum";
pub const ETHER_DECIMALS: u32 = 18;

//--------------------------------------      Currency       ---------------------------------------------------------
/// A currency that lives on a specific chain.
///
/// The native currency of a chain sits at the null address; every other currency is an ERC20 contract. Two currencies
/// are the same currency iff they share `(chain_id, address)`. Code, name and precision are descriptive metadata and
/// do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Currency {
    pub chain_id: u64,
    pub address: Address,
    pub code: String,
    pub name: String,
    pub decimals: u32,
}

impl Currency {
    pub fn native<S: Into<String>>(chain_id: u64, code: S, name: S, decimals: u32) -> Self {
        Self { chain_id, address: null_address(), code: code.into(), name: name.into(), decimals }
    }

    /// Ether on the given chain.
    pub fn ether(chain_id: u64) -> Self {
        Self::native(chain_id, ETHER_CODE, ETHER_NAME, ETHER_DECIMALS)
    }

    pub fn token<S: Into<String>>(chain_id: u64, address: Address, code: S, name: S, decimals: u32) -> Self {
        Self { chain_id, address, code: code.into(), name: name.into(), decimals }
    }

    pub fn is_native(&self) -> bool {
        is_null_address(&self.address)
    }

    pub fn is_erc20(&self) -> bool {
        !self.is_native()
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.chain_id == other.chain_id && self.address == other.address
    }
}

impl Eq for Currency {}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain_id.hash(state);
        self.address.hash(state);
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_native() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} - {} - {}", self.code, checksum(&self.address), self.chain_id)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse_address;

    #[test]
    fn equality_ignores_metadata() {
        let dai = parse_address("0x6B175474E89094C44Da98b954EedeAC495271d0F").unwrap();
        let a = Currency::token(1, dai, "DAI", "Dai Stablecoin", 18);
        let b = Currency::token(1, dai, "SAI", "Renamed", 6);
        let c = Currency::token(5, dai, "DAI", "Dai Stablecoin", 18);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.is_erc20());
    }

    #[test]
    fn ether_is_native() {
        let eth = Currency::ether(1);
        assert!(eth.is_native());
        assert_eq!(eth.to_string(), "ETH");
        assert_ne!(eth, Currency::ether(3));
    }
}

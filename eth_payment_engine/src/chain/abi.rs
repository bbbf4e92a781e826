use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, U256},
};

/// The 4-byte selector of `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// ABI-encodes a call to `transfer(recipient, amount)`.
pub fn encode_transfer_data(recipient: Address, amount: U256) -> Bytes {
    let mut data = TRANSFER_SELECTOR.to_vec();
    data.extend(encode(&[Token::Address(recipient), Token::Uint(amount)]));
    Bytes::from(data)
}

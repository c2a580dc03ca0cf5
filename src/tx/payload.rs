//! Transfer target resolution and ERC-20 calldata encoding

use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, U256};

/// First four bytes of keccak256("transfer(address,uint256)")
pub const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// On-chain recipient, native value and calldata of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TransferTarget {
    /// Plain native-currency transfer
    pub fn native(destination: Address, amount: U256) -> Self {
        Self {
            to: destination,
            value: amount,
            data: Bytes::default(),
        }
    }

    /// Token transfer: the call goes to the contract and carries no value
    pub fn token(contract: Address, destination: Address, amount: U256) -> Self {
        Self {
            to: contract,
            value: U256::zero(),
            data: encode_token_transfer(destination, amount),
        }
    }

    pub fn resolve(token: Option<Address>, destination: Address, amount: U256) -> Self {
        match token {
            Some(contract) => Self::token(contract, destination, amount),
            None => Self::native(destination, amount),
        }
    }
}

/// Calldata for `transfer(address,uint256)`
pub fn encode_token_transfer(to: Address, amount: U256) -> Bytes {
    let args = abi::encode(&[Token::Address(to), Token::Uint(amount)]);

    let mut data = Vec::with_capacity(TRANSFER_SELECTOR.len() + args.len());
    data.extend_from_slice(&TRANSFER_SELECTOR);
    data.extend_from_slice(&args);
    data.into()
}

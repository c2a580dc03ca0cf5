//! Chain module - the relayer's view of the remote ledger endpoint
//!
//! This module provides:
//! - The `LedgerClient` capability the transaction core is written against
//! - An ethers-backed HTTP provider with read failover

pub mod provider;

#[cfg(test)]
pub(crate) mod testing;

pub use provider::ChainProvider;

use crate::error::FaucetResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

#[cfg(test)]
use mockall::automock;

/// Operations the transaction core needs from the remote endpoint
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Chain identifier reported by the endpoint
    async fn chain_id(&self) -> FaucetResult<u64>;

    /// Next nonce for `address`, counting pending transactions
    async fn pending_nonce(&self, address: Address) -> FaucetResult<u64>;

    /// Base fee of the latest block, `None` on pre-London chains
    async fn latest_base_fee(&self) -> FaucetResult<Option<U256>>;

    /// Suggested priority fee (tip)
    async fn suggest_priority_fee(&self) -> FaucetResult<U256>;

    /// Suggested legacy gas price
    async fn suggest_gas_price(&self) -> FaucetResult<U256>;

    /// Submit a signed, RLP-encoded transaction
    async fn send_raw_transaction(&self, raw: Bytes) -> FaucetResult<H256>;
}

//! Faucet Relayer - single-account transfer core for EVM faucets
//!
//! Issues signed native or ERC-20 transfers from one custodial account,
//! allocating nonces atomically so concurrent requests never collide and
//! resynchronizing with the endpoint when a nonce is rejected.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod tx;
pub mod wallet;

pub use error::{FaucetError, FaucetResult};
pub use tx::TransactionSender;

//! Error types for the Faucet Relayer

use thiserror::Error;

/// Main error type for the relayer
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error: {message}")]
    ChainConnection { message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Fee {fee_wei} wei exceeds configured cap of {cap_wei} wei")]
    FeeCapExceeded { fee_wei: String, cap_wei: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Nonce conflict for nonce {nonce}: {message}")]
    NonceConflict { nonce: u64, message: String },

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Check if error is retryable
    ///
    /// A nonce conflict is retryable by the caller: the allocator has already
    /// been scheduled for resync, so the next attempt gets a fresh nonce.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FaucetError::ChainConnection { .. }
                | FaucetError::Timeout { .. }
                | FaucetError::NonceConflict { .. }
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            FaucetError::Wallet(_) | FaucetError::FeeCapExceeded { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            FaucetError::Config(_) => "config",
            FaucetError::ChainConnection { .. } => "chain_connection",
            FaucetError::GasEstimation(_) => "gas_estimation",
            FaucetError::FeeCapExceeded { .. } => "fee_cap",
            FaucetError::Wallet(_) => "wallet",
            FaucetError::Signing(_) => "signing",
            FaucetError::NonceConflict { .. } => "nonce_conflict",
            FaucetError::Rejected(_) => "rejected",
            FaucetError::Timeout { .. } => "timeout",
            FaucetError::InvalidRequest(_) => "invalid_request",
            FaucetError::Internal(_) => "internal",
        }
    }
}

/// Result type for relayer operations
pub type FaucetResult<T> = Result<T, FaucetError>;

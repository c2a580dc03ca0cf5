//! Chain provider with multi-RPC support and automatic failover

use super::LedgerClient;
use crate::error::{FaucetError, FaucetResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
    /// Deadline for a single endpoint call
    request_timeout: Duration,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(rpc_urls: &[String], request_timeout: Duration) -> FaucetResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(FaucetError::ChainConnection {
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
            request_timeout,
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Failover to provider {}", next);
    }

    /// Run a read-only query, rotating through providers on failure
    async fn query<'a, T, F, Fut>(&'a self, operation: &str, call: F) -> FaucetResult<T>
    where
        F: Fn(&'a Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match timeout(self.request_timeout, call(self.http())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!("{} failed: {}", operation, e);
                    last_error = Some(FaucetError::ChainConnection {
                        message: format!("{}: {}", operation, e),
                    });
                }
                Err(_) => {
                    warn!("{} timed out", operation);
                    last_error = Some(FaucetError::Timeout {
                        operation: operation.to_string(),
                    });
                }
            }
            self.failover();
        }

        Err(last_error.unwrap_or(FaucetError::ChainConnection {
            message: format!("{}: all providers failed", operation),
        }))
    }
}

#[async_trait]
impl LedgerClient for ChainProvider {
    async fn chain_id(&self) -> FaucetResult<u64> {
        let id = self.query("eth_chainId", |p| p.get_chainid()).await?;
        to_u64("eth_chainId", id)
    }

    async fn pending_nonce(&self, address: Address) -> FaucetResult<u64> {
        let nonce = self
            .query("eth_getTransactionCount", |p| {
                p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
            })
            .await?;
        to_u64("eth_getTransactionCount", nonce)
    }

    async fn latest_base_fee(&self) -> FaucetResult<Option<U256>> {
        let block = self
            .query("eth_getBlockByNumber", |p| p.get_block(BlockNumber::Latest))
            .await?
            .ok_or_else(|| FaucetError::GasEstimation("No latest block".to_string()))?;

        Ok(block.base_fee_per_gas)
    }

    async fn suggest_priority_fee(&self) -> FaucetResult<U256> {
        self.query("eth_maxPriorityFeePerGas", |p| {
            p.request::<_, U256>("eth_maxPriorityFeePerGas", ())
        })
        .await
    }

    async fn suggest_gas_price(&self) -> FaucetResult<U256> {
        self.query("eth_gasPrice", |p| p.get_gas_price()).await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> FaucetResult<H256> {
        // Submission is never replayed against another provider
        let result = timeout(self.request_timeout, self.http().send_raw_transaction(raw)).await;

        match result {
            Ok(Ok(pending)) => Ok(pending.tx_hash()),
            Ok(Err(e)) => Err(classify_provider_error(e)),
            Err(_) => Err(FaucetError::Timeout {
                operation: "send transaction".to_string(),
            }),
        }
    }
}

/// Quantities the endpoint reports must fit in a u64
fn to_u64(operation: &str, value: U256) -> FaucetResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(FaucetError::ChainConnection {
            message: format!("{}: value {} out of range", operation, value),
        });
    }
    Ok(value.low_u64())
}

/// JSON-RPC error responses are endpoint rejections, anything else is transport
fn classify_provider_error(error: ProviderError) -> FaucetError {
    match RpcError::as_error_response(&error) {
        Some(response) => FaucetError::Rejected(response.message.clone()),
        None => FaucetError::ChainConnection {
            message: error.to_string(),
        },
    }
}

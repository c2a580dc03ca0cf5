//! Fee scheme detection and gas pricing

use crate::chain::LedgerClient;
use crate::config::FeeSchemeStrategy;
use crate::error::{FaucetError, FaucetResult};

use async_trait::async_trait;
use ethers::types::U256;
use tracing::{debug, info};

/// Gas limit with headroom for both a native transfer and an ERC-20 call
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Wei added on top of the suggested legacy gas price
pub const LEGACY_PRICE_BUMP: u64 = 20;

/// Multiplier applied to the base fee when computing the fee cap
const BASE_FEE_MULTIPLIER: u64 = 2;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Pricing model of the target network, fixed for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeScheme {
    /// Single gas price
    Legacy,
    /// Base fee plus priority fee (EIP-1559)
    DynamicFee,
}

impl FeeScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeScheme::Legacy => "legacy",
            FeeScheme::DynamicFee => "eip1559",
        }
    }
}

/// Decides which fee scheme the network uses
#[async_trait]
pub trait FeeSchemeDetector: Send + Sync {
    async fn detect(&self, client: &dyn LedgerClient) -> FaucetResult<FeeScheme>;
}

/// Always reports the configured scheme
pub struct FixedScheme(pub FeeScheme);

#[async_trait]
impl FeeSchemeDetector for FixedScheme {
    async fn detect(&self, _client: &dyn LedgerClient) -> FaucetResult<FeeScheme> {
        Ok(self.0)
    }
}

/// Reports `DynamicFee` when the latest block carries a base fee
pub struct BaseFeeProbe;

#[async_trait]
impl FeeSchemeDetector for BaseFeeProbe {
    async fn detect(&self, client: &dyn LedgerClient) -> FaucetResult<FeeScheme> {
        let scheme = match client.latest_base_fee().await? {
            Some(_) => FeeScheme::DynamicFee,
            None => FeeScheme::Legacy,
        };
        info!("Probed fee scheme: {}", scheme.as_str());
        Ok(scheme)
    }
}

/// Detector for a configured strategy
pub fn detector_for(strategy: FeeSchemeStrategy) -> Box<dyn FeeSchemeDetector> {
    match strategy {
        FeeSchemeStrategy::Legacy => Box::new(FixedScheme(FeeScheme::Legacy)),
        FeeSchemeStrategy::Eip1559 => Box::new(FixedScheme(FeeScheme::DynamicFee)),
        FeeSchemeStrategy::Auto => Box::new(BaseFeeProbe),
    }
}

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl GasPrice {
    /// Highest per-gas price the transaction may pay
    pub fn max_per_gas(&self) -> U256 {
        match self {
            GasPrice::Legacy(price) => *price,
            GasPrice::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Gas estimator for transfers
pub struct GasEstimator {
    gas_limit: u64,
    /// Optional ceiling on the per-gas price
    max_fee: Option<U256>,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit: u64, max_fee_gwei: Option<u64>) -> Self {
        Self {
            gas_limit,
            max_fee: max_fee_gwei.map(|gwei| U256::from(gwei) * U256::from(WEI_PER_GWEI)),
        }
    }

    pub fn gas_limit(&self) -> U256 {
        U256::from(self.gas_limit)
    }

    /// Query the endpoint and price a transaction for `scheme`
    pub async fn get_gas_price(
        &self,
        scheme: FeeScheme,
        client: &dyn LedgerClient,
    ) -> FaucetResult<GasPrice> {
        let price = match scheme {
            FeeScheme::DynamicFee => {
                let base_fee = client.latest_base_fee().await?.ok_or_else(|| {
                    FaucetError::GasEstimation("No base fee in latest block".to_string())
                })?;
                let priority_fee = client.suggest_priority_fee().await?;
                dynamic_fee(base_fee, priority_fee)?
            }
            FeeScheme::Legacy => legacy_fee(client.suggest_gas_price().await?)?,
        };

        self.check_cap(&price)?;
        debug!("Gas price: {:?}", price);
        Ok(price)
    }

    fn check_cap(&self, price: &GasPrice) -> FaucetResult<()> {
        match self.max_fee {
            Some(cap) if price.max_per_gas() > cap => Err(FaucetError::FeeCapExceeded {
                fee_wei: price.max_per_gas().to_string(),
                cap_wei: cap.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Calculate total cost in wei, `None` when it does not fit in 256 bits
    pub fn calculate_cost(gas_limit: U256, gas_price: &GasPrice) -> Option<U256> {
        gas_limit.checked_mul(gas_price.max_per_gas())
    }
}

impl Default for GasEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_LIMIT, None)
    }
}

/// Fee cap of `2 * base_fee + tip` guards against base fee growth before inclusion
pub fn dynamic_fee(base_fee: U256, priority_fee: U256) -> FaucetResult<GasPrice> {
    let max_fee_per_gas = base_fee
        .checked_mul(U256::from(BASE_FEE_MULTIPLIER))
        .and_then(|doubled| doubled.checked_add(priority_fee))
        .ok_or_else(|| {
            FaucetError::GasEstimation(format!(
                "Fee cap overflows: base fee {} tip {}",
                base_fee, priority_fee
            ))
        })?;

    Ok(GasPrice::Eip1559 {
        max_fee_per_gas,
        max_priority_fee_per_gas: priority_fee,
    })
}

pub fn legacy_fee(suggested: U256) -> FaucetResult<GasPrice> {
    suggested
        .checked_add(U256::from(LEGACY_PRICE_BUMP))
        .map(GasPrice::Legacy)
        .ok_or_else(|| {
            FaucetError::GasEstimation(format!("Gas price overflows: suggested {}", suggested))
        })
}

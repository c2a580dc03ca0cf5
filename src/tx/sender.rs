//! Transaction composer: builds, signs and submits transfers for one account

use super::gas::{FeeScheme, FeeSchemeDetector, GasEstimator, GasPrice};
use super::nonce::{NonceManager, NonceReservation};
use super::payload::TransferTarget;
use crate::chain::LedgerClient;
use crate::error::{FaucetError, FaucetResult};
use crate::metrics;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Startup configuration of the composer
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Discovered from the endpoint when absent
    pub chain_id: Option<u64>,
    /// ERC-20 contract to disperse; absent means native currency
    pub token_address: Option<Address>,
    pub gas_limit: u64,
    pub max_fee_gwei: Option<u64>,
}

/// A signed transaction ready for submission
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub nonce: u64,
    pub tx: TypedTransaction,
    pub raw: Bytes,
    pub hash: H256,
}

/// How a failed submission affects the nonce allocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionFailure {
    /// The endpoint disagrees with our nonce; resync before the next transfer
    NonceConflict,
    Other,
}

/// Classify a submission error by its text
pub fn classify_submission_error(error: &FaucetError) -> SubmissionFailure {
    if error.to_string().to_lowercase().contains("nonce") {
        SubmissionFailure::NonceConflict
    } else {
        SubmissionFailure::Other
    }
}

/// Builds and submits transfers from the faucet account
pub struct TransactionSender {
    /// Endpoint client
    client: Arc<dyn LedgerClient>,
    /// Nonce allocator
    nonce_manager: Arc<NonceManager>,
    /// Gas estimator
    gas_estimator: GasEstimator,
    /// Fee scheme detected at startup
    fee_scheme: FeeScheme,
    /// Wallet for signing, bound to `chain_id`
    wallet: LocalWallet,
    chain_id: u64,
    token_address: Option<Address>,
}

impl TransactionSender {
    /// Create a new transaction sender
    ///
    /// Resolves the chain ID, detects the fee scheme and seeds the nonce.
    /// Any failure here should abort startup.
    pub async fn new(
        client: Arc<dyn LedgerClient>,
        wallet: LocalWallet,
        config: TransferConfig,
        detector: &dyn FeeSchemeDetector,
    ) -> FaucetResult<Self> {
        let chain_id = match config.chain_id {
            Some(id) => id,
            None => client.chain_id().await?,
        };
        let wallet = wallet.with_chain_id(chain_id);
        let wallet_address = wallet.address();

        let fee_scheme = detector.detect(client.as_ref()).await?;
        let nonce_manager = Arc::new(NonceManager::new(wallet_address, client.clone()).await?);

        info!(
            "Transaction sender initialized with wallet {:?} on chain {} ({} fees, token {:?})",
            wallet_address,
            chain_id,
            fee_scheme.as_str(),
            config.token_address
        );

        Ok(Self {
            client,
            nonce_manager,
            gas_estimator: GasEstimator::new(config.gas_limit, config.max_fee_gwei),
            fee_scheme,
            wallet,
            chain_id,
            token_address: config.token_address,
        })
    }

    /// Send `amount` to `destination`, returning the transaction hash
    pub async fn transfer(&self, destination: Address, amount: U256) -> FaucetResult<H256> {
        let started = Instant::now();

        let result = self.submit(destination, amount).await;
        match &result {
            Ok(_) => {
                metrics::record_tx_submitted();
                metrics::record_tx_latency(started.elapsed().as_secs_f64());
            }
            Err(e) => metrics::record_tx_failed(e.kind()),
        }

        result
    }

    async fn submit(&self, destination: Address, amount: U256) -> FaucetResult<H256> {
        let (signed, reservation) = self.compose(destination, amount).await?;
        let nonce = signed.nonce;

        match self.client.send_raw_transaction(signed.raw).await {
            Ok(remote_hash) => {
                reservation.settle();
                if remote_hash != signed.hash {
                    warn!(
                        "Endpoint reported hash {:?} for transaction {:?}",
                        remote_hash, signed.hash
                    );
                }
                info!("Transaction sent: {:?} (nonce {})", signed.hash, nonce);
                Ok(signed.hash)
            }
            Err(e) => match classify_submission_error(&e) {
                SubmissionFailure::NonceConflict => {
                    // The resync reconciles this nonce
                    reservation.settle();
                    warn!("Nonce {} rejected ({}), resyncing", nonce, e);
                    self.nonce_manager.spawn_resync();
                    Err(FaucetError::NonceConflict {
                        nonce,
                        message: e.to_string(),
                    })
                }
                SubmissionFailure::Other => {
                    warn!("Transaction with nonce {} rejected: {}", nonce, e);
                    Err(e)
                }
            },
        }
    }

    /// Resolve, allocate a nonce, price, build and sign a transfer
    ///
    /// The returned reservation reports a nonce gap if dropped unsettled.
    pub async fn compose(
        &self,
        destination: Address,
        amount: U256,
    ) -> FaucetResult<(SignedTransfer, NonceReservation)> {
        let target = TransferTarget::resolve(self.token_address, destination, amount);
        let reservation = self.nonce_manager.reserve();
        let nonce = reservation.nonce();

        let gas_limit = self.gas_estimator.gas_limit();
        let gas_price = self
            .gas_estimator
            .get_gas_price(self.fee_scheme, self.client.as_ref())
            .await?;

        let tx = build_transaction(self.chain_id, nonce, target, gas_limit, &gas_price);
        debug!(
            "Built transaction nonce={} gas_limit={} max_cost={:?}",
            nonce,
            gas_limit,
            GasEstimator::calculate_cost(gas_limit, &gas_price)
        );

        let signed = self.sign(nonce, tx).await?;
        Ok((signed, reservation))
    }

    async fn sign(&self, nonce: u64, tx: TypedTransaction) -> FaucetResult<SignedTransfer> {
        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| FaucetError::Signing(e.to_string()))?;

        Ok(SignedTransfer {
            nonce,
            raw: tx.rlp_signed(&signature),
            hash: tx.hash(&signature),
            tx,
        })
    }

    /// Get wallet address
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn fee_scheme(&self) -> FeeScheme {
        self.fee_scheme
    }

    pub fn token_address(&self) -> Option<Address> {
        self.token_address
    }

    /// Nonce the next transfer will use
    pub fn next_nonce(&self) -> u64 {
        self.nonce_manager.current()
    }

    /// Whether the endpoint answers
    pub async fn health_check(&self) -> bool {
        match self.client.chain_id().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Health check failed: {}", e);
                false
            }
        }
    }
}

/// Build the unsigned transaction for `gas_price`'s scheme
fn build_transaction(
    chain_id: u64,
    nonce: u64,
    target: TransferTarget,
    gas_limit: U256,
    gas_price: &GasPrice,
) -> TypedTransaction {
    match gas_price {
        GasPrice::Legacy(price) => TypedTransaction::Legacy(
            TransactionRequest::new()
                .to(target.to)
                .value(target.value)
                .data(target.data)
                .nonce(nonce)
                .gas(gas_limit)
                .gas_price(*price)
                .chain_id(chain_id),
        ),
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => TypedTransaction::Eip1559(
            Eip1559TransactionRequest::new()
                .to(target.to)
                .value(target.value)
                .data(target.data)
                .nonce(nonce)
                .gas(gas_limit)
                .max_fee_per_gas(*max_fee_per_gas)
                .max_priority_fee_per_gas(*max_priority_fee_per_gas)
                .chain_id(chain_id),
        ),
    }
}

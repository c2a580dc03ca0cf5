//! In-memory ledger used by unit tests across the crate

use super::LedgerClient;
use crate::error::{FaucetError, FaucetResult};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) struct FakeLedger {
    pub chain_id: u64,
    pub pending_nonce: AtomicU64,
    pub base_fee: Option<U256>,
    pub priority_fee: U256,
    pub gas_price: U256,
    pub fail_nonce_query: Mutex<bool>,
    pub reject_with: Mutex<Option<String>>,
    pub nonce_queries: AtomicUsize,
    pub send_attempts: AtomicUsize,
    pub sent: Mutex<Vec<Bytes>>,
    nonce_queried: Notify,
}

impl FakeLedger {
    pub fn new(pending_nonce: u64) -> Self {
        Self {
            chain_id: 31337,
            pending_nonce: AtomicU64::new(pending_nonce),
            base_fee: None,
            priority_fee: U256::from(1_500_000_000u64),
            gas_price: U256::from(1_000_000_000u64),
            fail_nonce_query: Mutex::new(false),
            reject_with: Mutex::new(None),
            nonce_queries: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            nonce_queried: Notify::new(),
        }
    }

    pub fn with_base_fee(mut self, base_fee: u64) -> Self {
        self.base_fee = Some(U256::from(base_fee));
        self
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn reject_next_sends(&self, message: &str) {
        *self.reject_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_nonce_query_failure(&self, fail: bool) {
        *self.fail_nonce_query.lock().unwrap() = fail;
    }

    /// Wait until the nonce has been queried `count` times in total
    pub async fn wait_for_nonce_queries(&self, count: usize) {
        let wait = async {
            while self.nonce_queries.load(Ordering::SeqCst) < count {
                let notified = self.nonce_queried.notified();
                if self.nonce_queries.load(Ordering::SeqCst) >= count {
                    break;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("nonce was not queried in time");
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn chain_id(&self) -> FaucetResult<u64> {
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> FaucetResult<u64> {
        let fail = *self.fail_nonce_query.lock().unwrap();
        let result = if fail {
            Err(FaucetError::ChainConnection {
                message: "connection refused".to_string(),
            })
        } else {
            Ok(self.pending_nonce.load(Ordering::SeqCst))
        };

        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        self.nonce_queried.notify_waiters();
        result
    }

    async fn latest_base_fee(&self) -> FaucetResult<Option<U256>> {
        Ok(self.base_fee)
    }

    async fn suggest_priority_fee(&self) -> FaucetResult<U256> {
        Ok(self.priority_fee)
    }

    async fn suggest_gas_price(&self) -> FaucetResult<U256> {
        Ok(self.gas_price)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> FaucetResult<H256> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(FaucetError::Rejected(message));
        }

        let hash = H256::from(keccak256(&raw));
        self.sent.lock().unwrap().push(raw);
        Ok(hash)
    }
}

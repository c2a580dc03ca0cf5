//! Nonce allocation for a single sending account
//!
//! Handles:
//! - Lock-free allocation of unique, consecutive nonces
//! - Resynchronization against the endpoint's pending nonce
//! - Reporting nonces that were allocated but never submitted

use crate::chain::LedgerClient;
use crate::error::FaucetResult;
use crate::metrics;

use ethers::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Owns the next nonce to hand out for one account
pub struct NonceManager {
    /// Wallet address
    wallet_address: Address,
    /// Next nonce to use
    next: AtomicU64,
    /// Endpoint queried on resync
    client: Arc<dyn LedgerClient>,
}

impl NonceManager {
    /// Create a nonce manager seeded from the endpoint's pending nonce
    ///
    /// Failing to reach the endpoint here is fatal to the caller.
    pub async fn new(wallet_address: Address, client: Arc<dyn LedgerClient>) -> FaucetResult<Self> {
        let manager = Self {
            wallet_address,
            next: AtomicU64::new(0),
            client,
        };
        let initial = manager.try_resync().await?;
        info!("Initialized nonce for {:?}: {}", wallet_address, initial);

        Ok(manager)
    }

    /// Hand out the next nonce
    pub fn allocate(&self) -> u64 {
        let nonce = self.next.fetch_add(1, Ordering::SeqCst);
        debug!("Allocated nonce {}", nonce);
        nonce
    }

    /// Allocate a nonce wrapped in a gap-reporting guard
    pub fn reserve(&self) -> NonceReservation {
        NonceReservation {
            nonce: self.allocate(),
            settled: false,
        }
    }

    /// Next nonce that `allocate` would return
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Overwrite the local counter with the endpoint's pending nonce
    pub async fn try_resync(&self) -> FaucetResult<u64> {
        let on_chain_nonce = self.client.pending_nonce(self.wallet_address).await?;
        let previous = self.next.swap(on_chain_nonce, Ordering::SeqCst);

        if previous != on_chain_nonce {
            info!("Nonce resynced from {} to {}", previous, on_chain_nonce);
        }
        metrics::record_nonce(on_chain_nonce);

        Ok(on_chain_nonce)
    }

    /// Best-effort resync; failures are logged and the counter is kept
    pub async fn resync(&self) {
        match self.try_resync().await {
            Ok(_) => metrics::record_nonce_resync("ok"),
            Err(e) => {
                error!(
                    "Failed to refresh nonce for {:?}, keeping {}: {}",
                    self.wallet_address,
                    self.current(),
                    e
                );
                metrics::record_nonce_resync("failed");
            }
        }
    }

    /// Resync on a detached task
    pub fn spawn_resync(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.resync().await })
    }
}

/// A nonce that has been handed out and must reach the endpoint
///
/// Dropping an unsettled reservation means the nonce is spent without a
/// transaction, which stalls every later nonce until the next resync.
#[must_use]
pub struct NonceReservation {
    nonce: u64,
    settled: bool,
}

impl NonceReservation {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The nonce reached the endpoint, or will be reconciled by a resync
    pub fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for NonceReservation {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                "Nonce gap: nonce {} was allocated but never submitted",
                self.nonce
            );
            metrics::record_nonce_gap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::FakeLedger;
    use crate::chain::MockLedgerClient;
    use crate::error::FaucetError;
    use std::collections::HashSet;

    async fn manager_at(start: u64) -> (Arc<NonceManager>, Arc<FakeLedger>) {
        let ledger = Arc::new(FakeLedger::new(start));
        let manager = NonceManager::new(Address::repeat_byte(0x11), ledger.clone())
            .await
            .unwrap();
        (Arc::new(manager), ledger)
    }

    #[tokio::test]
    async fn test_initial_value_from_endpoint() {
        let (manager, _) = manager_at(7).await;
        assert_eq!(manager.current(), 7);
        assert_eq!(manager.allocate(), 7);
        assert_eq!(manager.allocate(), 8);
    }

    #[tokio::test]
    async fn test_construction_fails_when_endpoint_unreachable() {
        let mut client = MockLedgerClient::new();
        client.expect_pending_nonce().times(1).returning(|_| {
            Err(FaucetError::ChainConnection {
                message: "connection refused".to_string(),
            })
        });

        let result = NonceManager::new(Address::zero(), Arc::new(client)).await;
        assert!(matches!(result, Err(FaucetError::ChainConnection { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_is_gap_free() {
        let (manager, _) = manager_at(100).await;
        let n = 1_000u64;

        let handles: Vec<_> = (0..n)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.allocate() })
            })
            .collect();

        let nonces: HashSet<u64> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let expected: HashSet<u64> = (100..100 + n).collect();
        assert_eq!(nonces, expected);
        assert_eq!(manager.current(), 100 + n);
    }

    #[test]
    fn test_allocation_across_threads() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (manager, _) = rt.block_on(manager_at(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || (0..250).map(|_| manager.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = threads
            .into_iter()
            .flat_map(|t| t.join().unwrap())
            .collect();
        all.sort_unstable();

        assert_eq!(all, (0..2_000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_resync_overwrites_counter() {
        let (manager, ledger) = manager_at(5).await;
        for _ in 0..10 {
            manager.allocate();
        }

        // Rewind below what was handed out
        ledger.pending_nonce.store(9, Ordering::SeqCst);
        manager.resync().await;
        assert_eq!(manager.allocate(), 9);

        // And advance beyond it
        ledger.pending_nonce.store(42, Ordering::SeqCst);
        manager.resync().await;
        assert_eq!(manager.allocate(), 42);
    }

    #[tokio::test]
    async fn test_failed_resync_keeps_counter() {
        let (manager, ledger) = manager_at(3).await;
        manager.allocate();

        ledger.set_nonce_query_failure(true);
        ledger.pending_nonce.store(50, Ordering::SeqCst);
        manager.resync().await;

        assert_eq!(manager.current(), 4);
        assert_eq!(manager.allocate(), 4);
    }

    #[tokio::test]
    async fn test_spawned_resync_runs() {
        let (manager, ledger) = manager_at(0).await;
        ledger.pending_nonce.store(12, Ordering::SeqCst);

        manager.spawn_resync().await.unwrap();
        assert_eq!(manager.current(), 12);
        assert_eq!(ledger.nonce_queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reservation_spends_nonce() {
        let (manager, _) = manager_at(0).await;

        let reservation = manager.reserve();
        assert_eq!(reservation.nonce(), 0);
        drop(reservation);

        // A dropped reservation is never handed out again
        let next = manager.reserve();
        assert_eq!(next.nonce(), 1);
        next.settle();
    }
}

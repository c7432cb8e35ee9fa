//! Per-wallet serialization of plan construction and nonce allocation.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::{Address, U256};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::chain::ChainClient;
use crate::error::ChainError;
use crate::network::mask_address;

/// Contiguous nonces `[base, base + count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRange {
    base: U256,
    count: usize,
}

impl NonceRange {
    pub fn new(base: U256, count: usize) -> Self {
        Self { base, count }
    }

    pub fn base(&self) -> U256 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = U256> + '_ {
        (0..self.count).map(move |offset| self.base + U256::from(offset))
    }
}

/// Exclusive hold on one wallet's plan construction.
///
/// Dropping the lease lets the next command for the same wallet proceed.
pub struct WalletLease {
    wallet: Address,
    _guard: OwnedMutexGuard<()>,
}

impl WalletLease {
    pub fn wallet(&self) -> Address {
        self.wallet
    }
}

impl std::fmt::Debug for WalletLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLease")
            .field("wallet", &mask_address(&self.wallet))
            .finish()
    }
}

/// Hands out wallet leases and nonce ranges.
pub struct NonceSequencer {
    chain: Arc<dyn ChainClient>,
    locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl NonceSequencer {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            chain,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `wallet`. Other wallets are unaffected.
    pub async fn lease(&self, wallet: Address) -> WalletLease {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            locks.retain(|addr, lock| *addr == wallet || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(wallet).or_default())
        };
        let guard = lock.lock_owned().await;
        WalletLease {
            wallet,
            _guard: guard,
        }
    }

    /// `count` nonces starting at the wallet's current transaction count.
    pub async fn allocate(
        &self,
        lease: &WalletLease,
        count: usize,
    ) -> Result<NonceRange, ChainError> {
        let base = self.chain.transaction_count(lease.wallet).await?;
        tracing::debug!(
            wallet = %mask_address(&lease.wallet),
            nonce_base = %base,
            count,
            "Allocated nonces"
        );
        Ok(NonceRange::new(base, count))
    }
}

//! Pending plans awaiting an explicit `CONFIRM`, one per wallet.
//!
//! Bounded by an LRU and a TTL. Nothing survives a restart.

use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use ethers::types::Address;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::defi::plan::TransactionPlan;
use crate::error::CommandError;
use crate::network::mask_address;

#[derive(Debug, Clone)]
pub struct ConfirmationEntry {
    pub originating_message: String,
    pub plan: TransactionPlan,
    pub created_at: DateTime<Utc>,
}

pub struct ConfirmationQueue {
    entries: Mutex<LruCache<Address, ConfirmationEntry>>,
    ttl: Duration,
}

impl ConfirmationQueue {
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Store `plan` for its wallet, replacing any earlier pending plan.
    pub async fn enqueue(&self, message: &str, plan: TransactionPlan) {
        self.enqueue_at(message, plan, Utc::now()).await;
    }

    pub(crate) async fn enqueue_at(
        &self,
        message: &str,
        plan: TransactionPlan,
        created_at: DateTime<Utc>,
    ) {
        let wallet = plan.wallet;
        let plan_id = plan.id;
        let mut entries = self.entries.lock().await;
        let purged = self.purge_expired(&mut entries, created_at);
        if purged > 0 {
            tracing::debug!(purged, "Dropped expired pending plans");
        }
        let evicted = entries.push(
            wallet,
            ConfirmationEntry {
                originating_message: message.to_string(),
                plan,
                created_at,
            },
        );
        if let Some((evicted_wallet, _)) = evicted
            && evicted_wallet != wallet
        {
            tracing::debug!(
                wallet = %mask_address(&evicted_wallet),
                "Evicted least recently used pending plan"
            );
        }
        tracing::debug!(wallet = %mask_address(&wallet), %plan_id, "Queued plan for confirmation");
    }

    /// Remove and return the wallet's pending plan if it has not expired.
    pub async fn take_for_confirmation(
        &self,
        wallet: Address,
    ) -> Result<ConfirmationEntry, CommandError> {
        self.take_at(wallet, Utc::now()).await
    }

    pub(crate) async fn take_at(
        &self,
        wallet: Address,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationEntry, CommandError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .pop(&wallet)
            .ok_or(CommandError::ConfirmationNotFound)?;
        if now - entry.created_at > self.ttl {
            tracing::info!(
                wallet = %mask_address(&wallet),
                plan_id = %entry.plan.id,
                "Pending plan expired before confirmation"
            );
            return Err(CommandError::ConfirmationNotFound);
        }
        Ok(entry)
    }

    /// Drop the wallet's pending plan, if any.
    pub async fn discard(&self, wallet: Address) -> bool {
        self.entries.lock().await.pop(&wallet).is_some()
    }

    /// Remove every entry older than the TTL at `now`.
    fn purge_expired(
        &self,
        entries: &mut LruCache<Address, ConfirmationEntry>,
        now: DateTime<Utc>,
    ) -> usize {
        let expired: Vec<Address> = entries
            .iter()
            .filter(|(_, entry)| now - entry.created_at > self.ttl)
            .map(|(wallet, _)| *wallet)
            .collect();
        for wallet in &expired {
            entries.pop(wallet);
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defi::nonce::NonceRange;
    use crate::defi::plan::{FeeParams, TxDraft};
    use ethers::types::{Bytes, U256};

    fn plan_for(wallet: Address) -> TransactionPlan {
        TransactionPlan::assemble(
            wallet,
            14,
            FeeParams::from_node(U256::one(), U256::zero()),
            vec![TxDraft {
                to: Address::repeat_byte(0xaa),
                data: Bytes::new(),
                value: U256::one(),
                gas_limit: U256::from(21_000u64),
                description: "Send".to_string(),
            }],
            NonceRange::new(U256::zero(), 1),
        )
        .unwrap()
    }

    fn queue(capacity: usize, ttl_secs: i64) -> ConfirmationQueue {
        ConfirmationQueue::new(
            NonZeroUsize::new(capacity).unwrap(),
            Duration::seconds(ttl_secs),
        )
    }

    #[tokio::test]
    async fn take_consumes_entry() {
        let queue = queue(4, 60);
        let wallet = Address::repeat_byte(1);
        queue.enqueue("send 1 FLR", plan_for(wallet)).await;

        let entry = queue.take_for_confirmation(wallet).await.unwrap();
        assert_eq!(entry.originating_message, "send 1 FLR");
        assert!(matches!(
            queue.take_for_confirmation(wallet).await,
            Err(CommandError::ConfirmationNotFound)
        ));
    }

    #[tokio::test]
    async fn new_command_replaces_pending_plan() {
        let queue = queue(4, 60);
        let wallet = Address::repeat_byte(1);
        queue.enqueue("first", plan_for(wallet)).await;
        queue.enqueue("second", plan_for(wallet)).await;
        assert_eq!(queue.len().await, 1);
        let entry = queue.take_for_confirmation(wallet).await.unwrap();
        assert_eq!(entry.originating_message, "second");
    }

    #[tokio::test]
    async fn expired_entries_are_not_returned() {
        let queue = queue(4, 60);
        let wallet = Address::repeat_byte(2);
        let created = Utc::now() - Duration::seconds(120);
        queue.enqueue_at("stake 1 FLR", plan_for(wallet), created).await;
        assert!(matches!(
            queue.take_at(wallet, Utc::now()).await,
            Err(CommandError::ConfirmationNotFound)
        ));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent_wallet() {
        let queue = queue(2, 60);
        let (a, b, c) = (
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        queue.enqueue("a", plan_for(a)).await;
        queue.enqueue("b", plan_for(b)).await;
        queue.enqueue("c", plan_for(c)).await;
        assert_eq!(queue.len().await, 2);
        assert!(queue.take_for_confirmation(a).await.is_err());
        assert!(queue.take_for_confirmation(c).await.is_ok());
    }

    #[tokio::test]
    async fn enqueue_drops_only_expired() {
        let queue = queue(4, 60);
        queue
            .enqueue_at("old", plan_for(Address::repeat_byte(1)), Utc::now() - Duration::seconds(61))
            .await;
        queue.enqueue("fresh", plan_for(Address::repeat_byte(2))).await;
        assert_eq!(queue.len().await, 1);
        assert!(queue.discard(Address::repeat_byte(2)).await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn expired_plans_do_not_take_capacity() {
        let queue = queue(2, 60);
        let (stale, a, b) = (
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        queue
            .enqueue_at("stale", plan_for(stale), Utc::now() - Duration::seconds(300))
            .await;
        queue.enqueue("a", plan_for(a)).await;
        queue.enqueue("b", plan_for(b)).await;
        assert_eq!(queue.len().await, 2);
        assert!(queue.take_for_confirmation(a).await.is_ok());
        assert!(queue.take_for_confirmation(b).await.is_ok());
    }
}

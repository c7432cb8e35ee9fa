//! Signing and broadcasting confirmed plans.
//!
//! The router only needs `submit`. Without a configured signer, confirmed
//! plans are returned in wire form for an external wallet to sign.

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::{Address, H256};
use secrecy::{ExposeSecret, SecretString};

use crate::chain::RetryPolicy;
use crate::chain::rpc::{classify_provider_error, with_retry};
use crate::defi::plan::PreparedTransaction;
use crate::error::{CommandError, ConfigError};
use crate::network::mask_address;

/// Accepts a prepared transaction and returns its hash once broadcast.
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    async fn submit(&self, tx: &PreparedTransaction) -> Result<H256, CommandError>;
}

/// Signs with an in-process key and broadcasts through the node.
pub struct LocalKeySigner {
    wallet: LocalWallet,
    provider: Provider<Http>,
    policy: RetryPolicy,
}

impl LocalKeySigner {
    pub fn new(
        private_key: &SecretString,
        rpc_url: &str,
        chain_id: u64,
        policy: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let wallet = private_key
            .expose_secret()
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "SIGNER_PRIVATE_KEY".to_string(),
                message: "not a valid secp256k1 private key".to_string(),
            })?
            .with_chain_id(chain_id);
        let provider =
            Provider::<Http>::try_from(rpc_url).map_err(|e| ConfigError::InvalidValue {
                key: "WEB3_PROVIDER_URL".to_string(),
                message: e.to_string(),
            })?;
        tracing::info!(wallet = %mask_address(&wallet.address()), "Local signer ready");
        Ok(Self {
            wallet,
            provider,
            policy,
        })
    }
}

#[async_trait]
impl Signer for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn submit(&self, tx: &PreparedTransaction) -> Result<H256, CommandError> {
        if tx.from != self.wallet.address() {
            return Err(CommandError::Signer(format!(
                "transaction is from {} but the signer key is for {}",
                mask_address(&tx.from),
                mask_address(&self.wallet.address())
            )));
        }

        let typed = tx.to_typed();
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| CommandError::Signer(e.to_string()))?;
        let raw = typed.rlp_signed(&signature);

        // Rebroadcasting the same signed bytes is idempotent.
        let provider = &self.provider;
        let raw = &raw;
        let hash = with_retry("eth_sendRawTransaction", self.policy, || async move {
            provider
                .send_raw_transaction(raw.clone())
                .await
                .map(|pending| pending.tx_hash())
                .map_err(|e| classify_provider_error("eth_sendRawTransaction", e))
        })
        .await
        .map_err(|e| CommandError::Signer(e.to_string()))?;
        tracing::info!(
            wallet = %mask_address(&tx.from),
            nonce = %tx.nonce,
            tx_hash = ?hash,
            "Broadcast transaction"
        );
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, U64, U256};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    // Well-known test key (hardhat account #0).
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_address_from_key() {
        let signer = LocalKeySigner::new(
            &SecretString::from(TEST_KEY.to_string()),
            "http://127.0.0.1:8545",
            114,
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            crate::network::checksum(&signer.address()),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn rejects_malformed_key() {
        let err = LocalKeySigner::new(
            &SecretString::from("not-a-key".to_string()),
            "http://127.0.0.1:8545",
            14,
            RetryPolicy::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "SIGNER_PRIVATE_KEY"));
    }

    fn transfer_from(from: Address) -> PreparedTransaction {
        PreparedTransaction {
            from,
            to: Address::repeat_byte(0x42),
            value: U256::exp10(18),
            data: Bytes::new(),
            gas: U256::from(21_000u64),
            max_fee_per_gas: U256::from(50_000_000_000u64),
            max_priority_fee_per_gas: U256::exp10(9),
            nonce: U256::from(3u64),
            chain_id: U64::from(114u64),
            tx_type: U64::from(2u64),
        }
    }

    #[tokio::test]
    async fn stalled_broadcast_times_out_after_retry_budget() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let policy = RetryPolicy {
            timeout: Duration::from_millis(100),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        };
        let signer =
            LocalKeySigner::new(&SecretString::from(TEST_KEY.to_string()), &url, 114, policy)
                .unwrap();
        let err = signer
            .submit(&transfer_from(signer.address()))
            .await
            .unwrap_err();

        match err {
            CommandError::Signer(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("Expected Signer error, got {other:?}"),
        }
        assert!(accepted.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn rejects_plan_for_another_wallet() {
        let signer = LocalKeySigner::new(
            &SecretString::from(TEST_KEY.to_string()),
            "http://127.0.0.1:9",
            114,
            RetryPolicy::default(),
        )
        .unwrap();
        let err = signer
            .submit(&transfer_from(Address::repeat_byte(0x11)))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Signer(reason) if reason.contains("signer key")));
    }
}

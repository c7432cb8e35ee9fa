//! `ChainClient` over an ethers HTTP provider with per-call timeouts and
//! bounded retry for transport failures.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, U256};

use crate::chain::{CallRequest, ChainClient};
use crate::error::ChainError;

/// Timeout and retry budget applied to every RPC call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Run `attempt` under the policy. Only `Network` and `Timeout` failures
/// are retried.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut attempt: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut tries = 0u32;
    loop {
        let result = match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Timeout {
                operation: operation.to_string(),
                timeout: policy.timeout,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && tries < policy.max_retries => {
                tries += 1;
                tracing::warn!(
                    operation,
                    attempt = tries,
                    error = %err,
                    "Retrying RPC call after transient failure"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

pub(crate) fn classify_provider_error(operation: &str, err: ProviderError) -> ChainError {
    if let Some(response) = err.as_error_response() {
        let lowered = response.message.to_ascii_lowercase();
        if response.code == 3 || lowered.contains("revert") {
            return ChainError::Reverted {
                reason: response.message.clone(),
            };
        }
    }
    ChainError::Network {
        operation: operation.to_string(),
        reason: err.to_string(),
    }
}

fn typed(request: &CallRequest) -> TypedTransaction {
    let mut tx = Eip1559TransactionRequest::new()
        .to(request.to)
        .data(request.data.clone())
        .value(request.value);
    if let Some(from) = request.from {
        tx = tx.from(from);
    }
    tx.into()
}

/// JSON-RPC client for one network.
pub struct EthersChainClient {
    provider: Provider<Http>,
    policy: RetryPolicy,
}

impl EthersChainClient {
    pub fn connect(rpc_url: &str, policy: RetryPolicy) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| ChainError::Network {
            operation: "connect".to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(rpc_url, timeout_ms = policy.timeout.as_millis() as u64, "RPC client ready");
        Ok(Self { provider, policy })
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        let provider = &self.provider;
        let id = with_retry("eth_chainId", self.policy, || async move {
            provider
                .get_chainid()
                .await
                .map_err(|e| classify_provider_error("eth_chainId", e))
        })
        .await?;
        Ok(id.low_u64())
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, ChainError> {
        let provider = &self.provider;
        with_retry("eth_getTransactionCount", self.policy, || async move {
            provider
                .get_transaction_count(address, None)
                .await
                .map_err(|e| classify_provider_error("eth_getTransactionCount", e))
        })
        .await
    }

    async fn gas_price(&self) -> Result<U256, ChainError> {
        let provider = &self.provider;
        with_retry("eth_gasPrice", self.policy, || async move {
            provider
                .get_gas_price()
                .await
                .map_err(|e| classify_provider_error("eth_gasPrice", e))
        })
        .await
    }

    async fn max_priority_fee(&self) -> Result<U256, ChainError> {
        let provider = &self.provider;
        with_retry("eth_maxPriorityFeePerGas", self.policy, || async move {
            let params: [(); 0] = [];
            provider
                .request::<_, U256>("eth_maxPriorityFeePerGas", params)
                .await
                .map_err(|e| classify_provider_error("eth_maxPriorityFeePerGas", e))
        })
        .await
    }

    async fn balance(&self, address: Address) -> Result<U256, ChainError> {
        let provider = &self.provider;
        with_retry("eth_getBalance", self.policy, || async move {
            provider
                .get_balance(address, None)
                .await
                .map_err(|e| classify_provider_error("eth_getBalance", e))
        })
        .await
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        let provider = &self.provider;
        let tx = &typed(request);
        with_retry("eth_call", self.policy, || async move {
            provider
                .call(tx, None)
                .await
                .map_err(|e| classify_provider_error("eth_call", e))
        })
        .await
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, ChainError> {
        let provider = &self.provider;
        let tx = &typed(request);
        with_retry("eth_estimateGas", self.policy, || async move {
            provider
                .estimate_gas(tx, None)
                .await
                .map_err(|e| classify_provider_error("eth_estimateGas", e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_network_failure_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = with_retry("eth_call", fast_policy(1), || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ChainError::Network {
                        operation: "eth_call".to_string(),
                        reason: "connection reset".to_string(),
                    })
                } else {
                    Ok(7u64)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_reverts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), ChainError> = with_retry("eth_call", fast_policy(3), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Reverted {
                    reason: "INSUFFICIENT_LIQUIDITY".to_string(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(ChainError::Reverted { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_call_times_out_after_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), ChainError> = with_retry("eth_gasPrice", fast_policy(1), || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<(), ChainError>>().await
            }
        })
        .await;
        match result {
            Err(ChainError::Timeout { operation, .. }) => assert_eq!(operation, "eth_gasPrice"),
            other => panic!("Expected Timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connect_rejects_malformed_url() {
        assert!(EthersChainClient::connect("not a url", RetryPolicy::default()).is_err());
    }
}

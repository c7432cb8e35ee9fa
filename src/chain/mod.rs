//! Blockchain access behind a single injectable capability.
//!
//! Handlers never construct providers themselves; they share one
//! `ChainClient` built at startup. Tests substitute a deterministic fake.

pub mod abi;
pub mod rpc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};

use crate::error::ChainError;

pub use self::rpc::{EthersChainClient, RetryPolicy};

/// Read-only call or gas-estimation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl CallRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            from: None,
            to,
            data,
            value: U256::zero(),
        }
    }

    pub fn sender(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// JSON-RPC surface the router consumes.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Confirmed transaction count, used as the nonce base.
    async fn transaction_count(&self, address: Address) -> Result<U256, ChainError>;

    async fn gas_price(&self) -> Result<U256, ChainError>;

    async fn max_priority_fee(&self) -> Result<U256, ChainError>;

    async fn balance(&self, address: Address) -> Result<U256, ChainError>;

    /// `eth_call`. Reverts surface as `ChainError::Reverted`.
    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError>;

    async fn estimate_gas(&self, request: &CallRequest) -> Result<U256, ChainError>;
}

/// ERC20 `allowance(owner, spender)`.
pub async fn erc20_allowance(
    chain: &dyn ChainClient,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, ChainError> {
    let data = abi::allowance(owner, spender)?;
    let raw = chain.call(&CallRequest::new(token, data)).await?;
    abi::decode_uint(abi::Contract::Erc20, "allowance", &raw)
}

/// ERC20 `balanceOf(account)`.
pub async fn erc20_balance(
    chain: &dyn ChainClient,
    token: Address,
    account: Address,
) -> Result<U256, ChainError> {
    let data = abi::balance_of(account)?;
    let raw = chain.call(&CallRequest::new(token, data)).await?;
    abi::decode_uint(abi::Contract::Erc20, "balanceOf", &raw)
}

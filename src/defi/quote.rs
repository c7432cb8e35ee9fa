//! Swap and liquidity quotes read from the router and token contracts.

use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::chain::{self, CallRequest, ChainClient, abi};
use crate::defi::oracle::PriceOracle;
use crate::error::{ChainError, CommandError};
use crate::network::{NetworkProfile, TokenDescriptor};

/// Shape of a swap, which decides the contract call and gas ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapRoute {
    /// Native to wrapped native via `deposit()`.
    Wrap,
    /// Wrapped native back to native via `withdraw(amount)`.
    Unwrap,
    /// `swapExactNATForTokens` over `[wrapped, out]`.
    NativeIn { path: Vec<Address> },
    /// `swapExactTokensForNAT` over `[in, wrapped]`.
    NativeOut { path: Vec<Address> },
    /// `swapExactTokensForTokens` over `[in, out]`.
    TokenToToken { path: Vec<Address> },
}

impl SwapRoute {
    pub fn path(&self) -> Option<&[Address]> {
        match self {
            Self::Wrap | Self::Unwrap => None,
            Self::NativeIn { path } | Self::NativeOut { path } | Self::TokenToToken { path } => {
                Some(path)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapQuote {
    pub route: SwapRoute,
    pub amount_in: U256,
    pub amount_out: U256,
    pub needs_approval: bool,
}

pub struct QuoteService {
    chain: Arc<dyn ChainClient>,
    network: Arc<NetworkProfile>,
    wrapped: TokenDescriptor,
    oracle: Arc<dyn PriceOracle>,
}

impl QuoteService {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        network: Arc<NetworkProfile>,
        wrapped: TokenDescriptor,
        oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            chain,
            network,
            wrapped,
            oracle,
        }
    }

    fn wrapped_address(&self) -> Result<Address, CommandError> {
        self.wrapped.address().ok_or_else(|| {
            CommandError::validation(format!("{} has no contract address.", self.wrapped.symbol))
        })
    }

    /// Pick the route for a token pair without touching the chain.
    pub fn route(
        &self,
        token_in: &TokenDescriptor,
        token_out: &TokenDescriptor,
    ) -> Result<SwapRoute, CommandError> {
        if token_in.symbol == token_out.symbol {
            return Err(CommandError::validation(format!(
                "Cannot swap {} for itself.",
                token_in.symbol
            )));
        }
        let wrapped = self.wrapped_address()?;
        let route = match (token_in.address(), token_out.address()) {
            (None, Some(out)) if out == wrapped => SwapRoute::Wrap,
            (Some(input), None) if input == wrapped => SwapRoute::Unwrap,
            (None, Some(out)) => SwapRoute::NativeIn {
                path: vec![wrapped, out],
            },
            (Some(input), None) => SwapRoute::NativeOut {
                path: vec![input, wrapped],
            },
            (Some(input), Some(out)) => SwapRoute::TokenToToken {
                path: vec![input, out],
            },
            (None, None) => {
                return Err(CommandError::validation("Cannot swap native for native."));
            }
        };
        Ok(route)
    }

    /// Expected output and whether the router needs an allowance first.
    pub async fn quote_swap(
        &self,
        wallet: Address,
        token_in: &TokenDescriptor,
        token_out: &TokenDescriptor,
        amount_in: U256,
    ) -> Result<SwapQuote, CommandError> {
        let route = self.route(token_in, token_out)?;

        let amount_out = match route.path() {
            None => amount_in,
            Some(path) => self.amounts_out(amount_in, path).await?,
        };

        let needs_approval = match (&route, token_in.address()) {
            (SwapRoute::Unwrap, _) | (_, None) => false,
            (_, Some(token)) => self.needs_approval(wallet, token, amount_in).await?,
        };

        tracing::debug!(
            token_in = %token_in.symbol,
            token_out = %token_out.symbol,
            %amount_in,
            %amount_out,
            needs_approval,
            "Quoted swap"
        );

        Ok(SwapQuote {
            route,
            amount_in,
            amount_out,
            needs_approval,
        })
    }

    async fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<U256, CommandError> {
        let request = CallRequest::new(self.network.router, abi::get_amounts_out(amount_in, path)?);
        match self.chain.call(&request).await {
            Ok(raw) => Ok(abi::decode_amount_out(&raw)?),
            Err(ChainError::Reverted { reason }) => {
                Err(CommandError::InsufficientLiquidity { reason })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// `allowance(wallet, router) < amount`.
    pub async fn needs_approval(
        &self,
        wallet: Address,
        token: Address,
        amount: U256,
    ) -> Result<bool, CommandError> {
        let allowance =
            chain::erc20_allowance(self.chain.as_ref(), token, wallet, self.network.router)
                .await?;
        Ok(allowance < amount)
    }

    /// Amount of `token_b` that pairs with `amount_a` of `token_a`.
    pub async fn quote_liquidity(
        &self,
        token_a: &TokenDescriptor,
        token_b: &TokenDescriptor,
        amount_a: U256,
    ) -> Result<U256, CommandError> {
        let amount_b = self.oracle.quote_pair(token_a, token_b, amount_a).await?;
        if amount_b.is_zero() {
            return Err(CommandError::InsufficientLiquidity {
                reason: format!(
                    "{} {} rounds to zero {}",
                    amount_a, token_a.symbol, token_b.symbol
                ),
            });
        }
        Ok(amount_b)
    }
}

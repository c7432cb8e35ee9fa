//! Second-leg pricing for liquidity provision.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::chain::abi;
use crate::chain::{CallRequest, ChainClient};
use crate::defi::units::{from_minor_units, to_minor_units};
use crate::error::{ChainError, CommandError};
use crate::network::TokenDescriptor;

/// How the amount of the second token is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityQuoteMode {
    /// Live pool reserves.
    Reserves,
    /// Static ratio table kept for compatibility checks.
    Legacy,
}

/// Given `amount_a` minor units of `token_a`, how much `token_b` matches it.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn quote_pair(
        &self,
        token_a: &TokenDescriptor,
        token_b: &TokenDescriptor,
        amount_a: U256,
    ) -> Result<U256, CommandError>;
}

/// Reads `factory.getPair` and `pair.getReserves`.
pub struct ReserveOracle {
    chain: Arc<dyn ChainClient>,
    factory: Address,
    wrapped_native: Address,
}

impl ReserveOracle {
    pub fn new(chain: Arc<dyn ChainClient>, factory: Address, wrapped_native: Address) -> Self {
        Self {
            chain,
            factory,
            wrapped_native,
        }
    }

    fn pool_address(&self, token: &TokenDescriptor) -> Address {
        token.address().unwrap_or(self.wrapped_native)
    }

    async fn reserves(&self, a: Address, b: Address) -> Result<(U256, U256), CommandError> {
        let pair_raw = self
            .chain
            .call(&CallRequest::new(self.factory, abi::get_pair(a, b)?))
            .await?;
        let pair = abi::decode_pair(&pair_raw)?;
        if pair.is_zero() {
            return Err(CommandError::InsufficientLiquidity {
                reason: "no pool exists for this pair".to_string(),
            });
        }

        let reserves_raw = match self
            .chain
            .call(&CallRequest::new(pair, abi::get_reserves()?))
            .await
        {
            Ok(raw) => raw,
            Err(ChainError::Reverted { reason }) => {
                return Err(CommandError::InsufficientLiquidity { reason });
            }
            Err(other) => return Err(other.into()),
        };
        let (reserve0, reserve1) = abi::decode_reserves(&reserves_raw)?;
        // token0 is the lower address
        if a < b {
            Ok((reserve0, reserve1))
        } else {
            Ok((reserve1, reserve0))
        }
    }
}

#[async_trait]
impl PriceOracle for ReserveOracle {
    async fn quote_pair(
        &self,
        token_a: &TokenDescriptor,
        token_b: &TokenDescriptor,
        amount_a: U256,
    ) -> Result<U256, CommandError> {
        let a = self.pool_address(token_a);
        let b = self.pool_address(token_b);
        let (reserve_a, reserve_b) = self.reserves(a, b).await?;
        if reserve_a.is_zero() || reserve_b.is_zero() {
            return Err(CommandError::InsufficientLiquidity {
                reason: format!("{}/{} pool is empty", token_a.symbol, token_b.symbol),
            });
        }
        Ok(amount_a.saturating_mul(reserve_b) / reserve_a)
    }
}

/// Fixed per-pair ratios. Wrapped and native symbols price identically;
/// unknown pairs are 1:1.
#[derive(Debug, Clone, Default)]
pub struct LegacyRatioTable;

impl LegacyRatioTable {
    fn canonical(symbol: &str) -> &str {
        match symbol {
            "FLR" | "WFLR" => "FLR",
            other => other,
        }
    }

    pub fn ratio(token_a: &str, token_b: &str) -> Decimal {
        match (Self::canonical(token_a), Self::canonical(token_b)) {
            ("FLR", "USDC.E") => dec!(0.06),
            ("USDC.E", "FLR") => dec!(16.67),
            ("FLR", "FLX") => dec!(0.135),
            ("FLX", "FLR") => dec!(7.4),
            _ => Decimal::ONE,
        }
    }
}

#[async_trait]
impl PriceOracle for LegacyRatioTable {
    async fn quote_pair(
        &self,
        token_a: &TokenDescriptor,
        token_b: &TokenDescriptor,
        amount_a: U256,
    ) -> Result<U256, CommandError> {
        let human_a = from_minor_units(amount_a, token_a.decimals)?;
        let places = u32::from(token_b.decimals.min(8));
        let human_b = (human_a * Self::ratio(&token_a.symbol, &token_b.symbol)).round_dp(places);
        to_minor_units(human_b, token_b.decimals)
    }
}

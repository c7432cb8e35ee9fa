//! Builds ready-to-sign transaction plans for swaps, staking, transfers and
//! liquidity provision.
//!
//! Every builder call runs under a `WalletLease`, so the quote, the nonce
//! read and the plan assembly cannot interleave with another command for
//! the same wallet.

use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};
use rust_decimal::Decimal;

use crate::chain::abi::{self, AddLiquidityArgs, AddLiquidityNatArgs};
use crate::chain::{CallRequest, ChainClient};
use crate::defi::nonce::{NonceSequencer, WalletLease};
use crate::defi::plan::{FeeParams, TransactionPlan, TxDraft};
use crate::defi::quote::{QuoteService, SwapRoute};
use crate::defi::units::{apply_slippage, format_minor_units, to_minor_units, with_buffer};
use crate::error::CommandError;
use crate::network::{NetworkProfile, TokenDescriptor, TokenRegistry, checksum, mask_address};

pub const SWAP_SLIPPAGE_BPS: u32 = 500;
pub const LIQUIDITY_SLIPPAGE_BPS: u32 = 50;
/// Minimum kept on token A by the two-token `addLiquidity` call.
pub const PAIR_LIQUIDITY_ONCHAIN_SLIPPAGE_BPS: u32 = 20;
pub const PAIR_LIQUIDITY_FEE_BIPS_A: u64 = 300;
pub const PAIR_LIQUIDITY_FEE_BIPS_B: u64 = 0;
pub const NATIVE_LIQUIDITY_FEE_BIPS: u64 = 0;

pub const DEADLINE_SECS: u64 = 1_200;
pub const PAIR_LIQUIDITY_DEADLINE_SECS: u64 = 86_400;

pub const NATIVE_IN_SWAP_GAS: u64 = 3_000_000;
pub const DEFAULT_CALL_GAS: u64 = 300_000;
pub const PAIR_LIQUIDITY_GAS: u64 = 2_891_350;
pub const APPROVAL_GAS: u64 = 100_000;
pub const TRANSFER_GAS: u64 = 21_000;
pub const WRAP_GAS_BUFFER_PERCENT: u32 = 20;

/// A plan plus the human-readable lines describing it.
#[derive(Debug, Clone)]
pub struct BuiltPlan {
    pub plan: TransactionPlan,
    pub headline: String,
    pub details: Vec<String>,
}

impl BuiltPlan {
    /// Preview shown to the user before confirmation.
    pub fn preview(&self) -> String {
        let mut out = format!("{}\n", self.headline);
        if self.plan.len() > 1 {
            out.push_str(&format!(
                "\nThis operation requires {} transactions:\n",
                self.plan.len()
            ));
            for (i, step) in self.plan.steps.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, step.description));
            }
        }
        if !self.details.is_empty() {
            out.push_str("\nTransaction details:\n");
            for line in &self.details {
                out.push_str(&format!("- {line}\n"));
            }
        }
        out
    }
}

pub struct TransactionBuilder {
    chain: Arc<dyn ChainClient>,
    network: Arc<NetworkProfile>,
    tokens: Arc<TokenRegistry>,
    quotes: Arc<QuoteService>,
    nonces: Arc<NonceSequencer>,
}

impl TransactionBuilder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        network: Arc<NetworkProfile>,
        tokens: Arc<TokenRegistry>,
        quotes: Arc<QuoteService>,
        nonces: Arc<NonceSequencer>,
    ) -> Self {
        Self {
            chain,
            network,
            tokens,
            quotes,
            nonces,
        }
    }

    pub fn network(&self) -> &NetworkProfile {
        &self.network
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    fn erc20_address(token: &TokenDescriptor) -> Result<Address, CommandError> {
        token.address().ok_or_else(|| {
            CommandError::validation(format!("{} is not an ERC20 token.", token.symbol))
        })
    }

    fn wrapped(&self) -> Result<&TokenDescriptor, CommandError> {
        self.tokens.resolve(self.network.wrapped_symbol)
    }

    fn approval_draft(
        &self,
        token: &TokenDescriptor,
        amount: U256,
    ) -> Result<TxDraft, CommandError> {
        Ok(TxDraft {
            to: Self::erc20_address(token)?,
            data: abi::approve(self.network.router, amount)?,
            value: U256::zero(),
            gas_limit: U256::from(APPROVAL_GAS),
            description: format!("Approve {} for BlazeSwap router", token.symbol),
        })
    }

    async fn estimated_gas(
        &self,
        wallet: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<U256, CommandError> {
        let request = CallRequest::new(to, data.clone())
            .sender(wallet)
            .with_value(value);
        let estimate = self.chain.estimate_gas(&request).await?;
        Ok(with_buffer(estimate, WRAP_GAS_BUFFER_PERCENT))
    }

    async fn finish(
        &self,
        lease: &WalletLease,
        drafts: Vec<TxDraft>,
        headline: String,
        details: Vec<String>,
    ) -> Result<BuiltPlan, CommandError> {
        let fees = FeeParams::fetch(self.chain.as_ref()).await?;
        let nonces = self.nonces.allocate(lease, drafts.len()).await?;
        let plan = TransactionPlan::assemble(
            lease.wallet(),
            self.network.chain_id,
            fees,
            drafts,
            nonces,
        )?;
        tracing::info!(
            plan_id = %plan.id,
            wallet = %mask_address(&lease.wallet()),
            steps = plan.len(),
            nonce_base = %nonces.base(),
            "Built transaction plan"
        );
        Ok(BuiltPlan {
            plan,
            headline,
            details,
        })
    }

    /// Swap `amount` of `token_in` for `token_out` with 5% slippage.
    pub async fn build_swap(
        &self,
        lease: &WalletLease,
        token_in: &str,
        token_out: &str,
        amount: Decimal,
        now: u64,
    ) -> Result<BuiltPlan, CommandError> {
        let token_in = self.tokens.resolve(token_in)?;
        let token_out = self.tokens.resolve(token_out)?;
        let amount_in = to_minor_units(amount, token_in.decimals)?;
        let wallet = lease.wallet();

        let quote = self
            .quotes
            .quote_swap(wallet, token_in, token_out, amount_in)
            .await?;
        let min_out = apply_slippage(quote.amount_out, SWAP_SLIPPAGE_BPS);
        let deadline = U256::from(now + DEADLINE_SECS);

        let mut drafts = Vec::with_capacity(2);
        if quote.needs_approval {
            drafts.push(self.approval_draft(token_in, amount_in)?);
        }

        let router = self.network.router;
        let action = match &quote.route {
            SwapRoute::Wrap => {
                let wrapped = Self::erc20_address(token_out)?;
                let data = abi::deposit()?;
                let gas_limit = self.estimated_gas(wallet, wrapped, &data, amount_in).await?;
                TxDraft {
                    to: wrapped,
                    data,
                    value: amount_in,
                    gas_limit,
                    description: format!("Wrap {amount} {} to {}", token_in.symbol, token_out.symbol),
                }
            }
            SwapRoute::Unwrap => {
                let wrapped = Self::erc20_address(token_in)?;
                let data = abi::withdraw(amount_in)?;
                let gas_limit = self
                    .estimated_gas(wallet, wrapped, &data, U256::zero())
                    .await?;
                TxDraft {
                    to: wrapped,
                    data,
                    value: U256::zero(),
                    gas_limit,
                    description: format!(
                        "Unwrap {amount} {} to {}",
                        token_in.symbol, token_out.symbol
                    ),
                }
            }
            SwapRoute::NativeIn { path } => TxDraft {
                to: router,
                data: abi::swap_exact_nat_for_tokens(min_out, path, wallet, deadline)?,
                value: amount_in,
                gas_limit: U256::from(NATIVE_IN_SWAP_GAS),
                description: format!("Swap {amount} {} for {}", token_in.symbol, token_out.symbol),
            },
            SwapRoute::NativeOut { path } => TxDraft {
                to: router,
                data: abi::swap_exact_tokens(
                    "swapExactTokensForNAT",
                    amount_in,
                    min_out,
                    path,
                    wallet,
                    deadline,
                )?,
                value: U256::zero(),
                gas_limit: U256::from(DEFAULT_CALL_GAS),
                description: format!("Swap {amount} {} for {}", token_in.symbol, token_out.symbol),
            },
            SwapRoute::TokenToToken { path } => TxDraft {
                to: router,
                data: abi::swap_exact_tokens(
                    "swapExactTokensForTokens",
                    amount_in,
                    min_out,
                    path,
                    wallet,
                    deadline,
                )?,
                value: U256::zero(),
                gas_limit: U256::from(DEFAULT_CALL_GAS),
                description: format!("Swap {amount} {} for {}", token_in.symbol, token_out.symbol),
            },
        };
        drafts.push(action);

        let is_wrapping = matches!(quote.route, SwapRoute::Wrap | SwapRoute::Unwrap);
        let expected = format_minor_units(quote.amount_out, token_out.decimals);
        let headline = if is_wrapping {
            format!(
                "Ready to convert {amount} {} to {expected} {}.",
                token_in.symbol, token_out.symbol
            )
        } else {
            format!(
                "Ready to swap {amount} {} for about {expected} {}.",
                token_in.symbol, token_out.symbol
            )
        };
        let mut details = vec![
            format!("From: {}", mask_address(&wallet)),
            format!("Expected output: {expected} {}", token_out.symbol),
        ];
        if !is_wrapping {
            details.push(format!(
                "Minimum output (5% slippage): {} {}",
                format_minor_units(min_out, token_out.decimals),
                token_out.symbol
            ));
            details.push(format!("Deadline: {deadline} (20 minutes)"));
        }

        self.finish(lease, drafts, headline, details).await
    }

    /// Stake native coin into the liquid staking contract via `submit()`.
    pub async fn build_stake(
        &self,
        lease: &WalletLease,
        amount: Decimal,
    ) -> Result<BuiltPlan, CommandError> {
        let staking = self.network.staking.ok_or_else(|| CommandError::Unavailable {
            feature: "Staking".to_string(),
            reason: format!("no staking contract on {}", self.network.id),
        })?;
        let native = self.tokens.native();
        let value = to_minor_units(amount, native.decimals)?;

        let drafts = vec![TxDraft {
            to: staking,
            data: abi::submit()?,
            value,
            gas_limit: U256::from(DEFAULT_CALL_GAS),
            description: format!("Stake {amount} {} for sFLR", native.symbol),
        }];
        let headline = format!("Ready to stake {amount} {}.", native.symbol);
        let details = vec![
            format!("From: {}", mask_address(&lease.wallet())),
            format!("Staking contract: {}", checksum(&staking)),
        ];
        self.finish(lease, drafts, headline, details).await
    }

    /// Plain native transfer.
    pub async fn build_send(
        &self,
        lease: &WalletLease,
        to: Address,
        amount: Decimal,
    ) -> Result<BuiltPlan, CommandError> {
        let native = self.tokens.native();
        let value = to_minor_units(amount, native.decimals)?;

        let drafts = vec![TxDraft {
            to,
            data: Bytes::new(),
            value,
            gas_limit: U256::from(TRANSFER_GAS),
            description: format!("Send {amount} {} to {}", native.symbol, checksum(&to)),
        }];
        let headline = format!("Ready to send {amount} {}.", native.symbol);
        let details = vec![
            format!("From: {}", mask_address(&lease.wallet())),
            format!("To: {}", checksum(&to)),
            format!("Amount: {amount} {}", native.symbol),
        ];
        self.finish(lease, drafts, headline, details).await
    }

    /// `addLiquidityNAT` pairing `amount_native` with the matching amount of
    /// `token`, preceded by an approval when the allowance is short.
    pub async fn build_add_liquidity_native(
        &self,
        lease: &WalletLease,
        token: &str,
        amount_native: Decimal,
        now: u64,
    ) -> Result<BuiltPlan, CommandError> {
        let native = self.tokens.native();
        let token = self.tokens.resolve(token)?;
        let wrapped = self.wrapped()?;
        if token.is_native() || token.symbol == wrapped.symbol {
            return Err(CommandError::validation(format!(
                "Pair {} with a token other than {} or {}.",
                native.symbol, native.symbol, wrapped.symbol
            )));
        }
        let token_address = Self::erc20_address(token)?;
        let wallet = lease.wallet();

        let native_minor = to_minor_units(amount_native, native.decimals)?;
        let token_minor = self
            .quotes
            .quote_liquidity(native, token, native_minor)
            .await?;
        let token_min = apply_slippage(token_minor, LIQUIDITY_SLIPPAGE_BPS);
        let native_min = apply_slippage(native_minor, LIQUIDITY_SLIPPAGE_BPS);
        let deadline = U256::from(now + DEADLINE_SECS);

        let mut drafts = Vec::with_capacity(2);
        if self
            .quotes
            .needs_approval(wallet, token_address, token_minor)
            .await?
        {
            drafts.push(self.approval_draft(token, token_minor)?);
        }
        drafts.push(TxDraft {
            to: self.network.router,
            data: abi::add_liquidity_nat(&AddLiquidityNatArgs {
                token: token_address,
                amount_token_desired: token_minor,
                amount_token_min: token_min,
                amount_nat_min: native_min,
                fee_bips_token: U256::from(NATIVE_LIQUIDITY_FEE_BIPS),
                to: wallet,
                deadline,
            })?,
            value: native_minor,
            gas_limit: U256::from(DEFAULT_CALL_GAS),
            description: format!("Add liquidity with {} and {}", native.symbol, token.symbol),
        });

        let token_display = format_minor_units(token_minor, token.decimals);
        let headline = format!(
            "Ready to add liquidity with {amount_native} {} and {token_display} {}.",
            native.symbol, token.symbol
        );
        let details = vec![
            format!("From: {}", mask_address(&wallet)),
            format!(
                "{} amount: {amount_native} (min: {})",
                native.symbol,
                format_minor_units(native_min, native.decimals)
            ),
            format!(
                "{} amount: {token_display} (min: {})",
                token.symbol,
                format_minor_units(token_min, token.decimals)
            ),
        ];
        self.finish(lease, drafts, headline, details).await
    }

    /// Two-token `addLiquidity`. A native leg redirects to
    /// [`Self::build_add_liquidity_native`] with `amount_a` as the native
    /// amount.
    pub async fn build_add_liquidity(
        &self,
        lease: &WalletLease,
        token_a: &str,
        token_b: &str,
        amount_a: Decimal,
        now: u64,
    ) -> Result<BuiltPlan, CommandError> {
        let token_a = self.tokens.resolve(token_a)?;
        let token_b = self.tokens.resolve(token_b)?;
        if token_a.is_native() {
            return self
                .build_add_liquidity_native(lease, &token_b.symbol, amount_a, now)
                .await;
        }
        if token_b.is_native() {
            return self
                .build_add_liquidity_native(lease, &token_a.symbol, amount_a, now)
                .await;
        }
        if token_a.symbol == token_b.symbol {
            return Err(CommandError::validation(format!(
                "Cannot pool {} with itself.",
                token_a.symbol
            )));
        }

        let address_a = Self::erc20_address(token_a)?;
        let address_b = Self::erc20_address(token_b)?;
        let wallet = lease.wallet();

        let amount_a_minor = to_minor_units(amount_a, token_a.decimals)?;
        let amount_b_minor = self
            .quotes
            .quote_liquidity(token_a, token_b, amount_a_minor)
            .await?;
        let reported_a_min = apply_slippage(amount_a_minor, LIQUIDITY_SLIPPAGE_BPS);
        let reported_b_min = apply_slippage(amount_b_minor, LIQUIDITY_SLIPPAGE_BPS);
        let onchain_a_min = apply_slippage(amount_a_minor, PAIR_LIQUIDITY_ONCHAIN_SLIPPAGE_BPS);
        let deadline = U256::from(now + PAIR_LIQUIDITY_DEADLINE_SECS);

        let mut drafts = Vec::with_capacity(3);
        if self
            .quotes
            .needs_approval(wallet, address_a, amount_a_minor)
            .await?
        {
            drafts.push(self.approval_draft(token_a, amount_a_minor)?);
        }
        if self
            .quotes
            .needs_approval(wallet, address_b, amount_b_minor)
            .await?
        {
            drafts.push(self.approval_draft(token_b, amount_b_minor)?);
        }
        drafts.push(TxDraft {
            to: self.network.router,
            data: abi::add_liquidity(&AddLiquidityArgs {
                token_a: address_a,
                token_b: address_b,
                amount_a_desired: amount_a_minor,
                amount_b_desired: amount_b_minor,
                amount_a_min: onchain_a_min,
                amount_b_min: U256::zero(),
                fee_bips_a: U256::from(PAIR_LIQUIDITY_FEE_BIPS_A),
                fee_bips_b: U256::from(PAIR_LIQUIDITY_FEE_BIPS_B),
                to: wallet,
                deadline,
            })?,
            value: U256::zero(),
            gas_limit: U256::from(PAIR_LIQUIDITY_GAS),
            description: format!("Add liquidity with {} and {}", token_a.symbol, token_b.symbol),
        });

        let amount_b_display = format_minor_units(amount_b_minor, token_b.decimals);
        let headline = format!(
            "Ready to add liquidity with {amount_a} {} and {amount_b_display} {}.",
            token_a.symbol, token_b.symbol
        );
        let details = vec![
            format!("From: {}", mask_address(&wallet)),
            format!(
                "{} amount: {amount_a} (min: {})",
                token_a.symbol,
                format_minor_units(reported_a_min, token_a.decimals)
            ),
            format!(
                "{} amount: {amount_b_display} (min: {})",
                token_b.symbol,
                format_minor_units(reported_b_min, token_b.decimals)
            ),
        ];
        self.finish(lease, drafts, headline, details).await
    }
}

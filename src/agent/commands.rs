//! Intent handlers.

use std::cmp::max;
use std::sync::atomic::Ordering;

use chrono::Utc;
use ethers::types::Address;
use rust_decimal::Decimal;

use crate::agent::intent::{COMMAND_WORDS, Intent};
use crate::agent::router::{CommandRouter, HandlerResult};
use crate::chain;
use crate::defi::units::format_minor_units;
use crate::defi::{BuiltPlan, WalletLease};
use crate::error::CommandError;
use crate::llm::prompts;
use crate::network::{TokenDescriptor, mask_address};

fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, a_ch) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != b_ch);
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

fn command_suggestions(word: &str) -> Vec<&'static str> {
    let normalized = word.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(&'static str, usize)> = COMMAND_WORDS
        .iter()
        .map(|candidate| (*candidate, levenshtein_distance(&normalized, candidate)))
        .collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

    let threshold = if normalized.len() <= 4 {
        1
    } else {
        max(2, normalized.len() / 3)
    };

    ranked
        .into_iter()
        .filter(|(_, distance)| *distance <= threshold)
        .take(3)
        .map(|(candidate, _)| candidate)
        .collect()
}

/// Fallback when no conversational reply could be produced.
fn unrecognized_message(text: &str) -> String {
    let first = text.split_whitespace().next().unwrap_or_default();
    let suggestions = command_suggestions(first);
    match suggestions.as_slice() {
        [] => "I couldn't process that request. Type help to see the available commands."
            .to_string(),
        [only] => format!("I couldn't process that request. Did you mean {only}? Type help for details."),
        many => format!(
            "I couldn't process that request. Did you mean one of: {}? Type help for details.",
            many.join(", ")
        ),
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

impl CommandRouter {
    /// Exhaustive dispatch over resolved intents.
    pub(super) async fn handle_intent(
        &self,
        text: &str,
        intent: Intent,
        wallet: Option<Address>,
    ) -> Result<HandlerResult, CommandError> {
        match intent {
            Intent::CheckBalance => self.handle_balance(wallet).await,
            Intent::SendToken { to_address, amount } => {
                let lease = self.lease(wallet).await?;
                let built = self
                    .deps
                    .builder
                    .build_send(&lease, to_address, amount)
                    .await?;
                self.queue_plan(text, lease, built).await
            }
            Intent::SwapToken {
                token_in,
                token_out,
                amount,
            } => {
                self.validate_tokens(&[token_in.as_str(), token_out.as_str()])?;
                let lease = self.lease(wallet).await?;
                let built = self
                    .deps
                    .builder
                    .build_swap(&lease, &token_in, &token_out, amount, unix_now())
                    .await?;
                self.queue_plan(text, lease, built).await
            }
            Intent::CrossChainSwap { amount } => Err(self.cross_chain_unavailable(amount)),
            Intent::StakeNative { amount } => {
                let lease = self.lease(wallet).await?;
                let built = self.deps.builder.build_stake(&lease, amount).await?;
                self.queue_plan(text, lease, built).await
            }
            Intent::AddLiquidity {
                token_a,
                token_b,
                amount_a,
            } => {
                self.validate_tokens(&[token_a.as_str(), token_b.as_str()])?;
                let lease = self.lease(wallet).await?;
                let built = self
                    .deps
                    .builder
                    .build_add_liquidity(&lease, &token_a, &token_b, amount_a, unix_now())
                    .await?;
                self.queue_plan(text, lease, built).await
            }
            Intent::AddLiquidityNative {
                token,
                amount_native,
            } => {
                self.validate_tokens(&[token.as_str()])?;
                let lease = self.lease(wallet).await?;
                let built = self
                    .deps
                    .builder
                    .build_add_liquidity_native(&lease, &token, amount_native, unix_now())
                    .await?;
                self.queue_plan(text, lease, built).await
            }
            Intent::RiskAssessment { score } => self.handle_risk(score).await,
            Intent::RequestAttestation => self.handle_attestation().await,
            Intent::Help => Ok(HandlerResult::response(self.help_text())),
            Intent::Conversational => Ok(self.handle_conversation(text).await),
        }
    }

    /// Fail fast on unknown symbols before any chain access.
    fn validate_tokens(&self, symbols: &[&str]) -> Result<(), CommandError> {
        for symbol in symbols {
            self.deps.tokens.resolve(symbol)?;
        }
        Ok(())
    }

    async fn lease(&self, wallet: Option<Address>) -> Result<WalletLease, CommandError> {
        let wallet = wallet.ok_or(CommandError::WalletNotConnected)?;
        Ok(self.deps.nonces.lease(wallet).await)
    }

    /// Enqueue while still holding the wallet lease, then release it.
    async fn queue_plan(
        &self,
        text: &str,
        lease: WalletLease,
        built: BuiltPlan,
    ) -> Result<HandlerResult, CommandError> {
        let wire = built.plan.to_wire();
        let preview = built.preview();
        self.deps.confirmations.enqueue(text, built.plan).await;
        drop(lease);
        Ok(HandlerResult::with_transaction(
            format!("{preview}\nType CONFIRM to proceed."),
            wire,
        ))
    }

    async fn handle_balance(&self, wallet: Option<Address>) -> Result<HandlerResult, CommandError> {
        let wallet = wallet.ok_or(CommandError::WalletNotConnected)?;
        let native: &TokenDescriptor = self.deps.tokens.native();
        let balance = self.deps.chain.balance(wallet).await?;

        let mut lines = vec![format!(
            "{} {}",
            format_minor_units(balance, native.decimals),
            native.symbol
        )];
        if let Some(staking) = self.deps.network.staking {
            let staked = chain::erc20_balance(self.deps.chain.as_ref(), staking, wallet).await?;
            lines.push(format!("{} sFLR", format_minor_units(staked, 18)));
        }

        Ok(HandlerResult::response(format!(
            "Your wallet ({}) has:\n\n{}",
            mask_address(&wallet),
            lines.join("\n")
        )))
    }

    fn cross_chain_unavailable(&self, amount: Decimal) -> CommandError {
        CommandError::Unavailable {
            feature: "Cross-chain swapping".to_string(),
            reason: format!(
                "moving {amount} {} off {} is not supported. Swaps run on {} through BlazeSwap.",
                self.deps.network.native_symbol, self.deps.network.id, self.deps.network.id
            ),
        }
    }

    pub(super) async fn handle_confirm(
        &self,
        wallet: Option<Address>,
    ) -> Result<HandlerResult, CommandError> {
        let wallet = wallet.ok_or(CommandError::WalletNotConnected)?;
        let entry = self.deps.confirmations.take_for_confirmation(wallet).await?;
        let plan = entry.plan;
        tracing::info!(
            plan_id = %plan.id,
            wallet = %mask_address(&wallet),
            steps = plan.len(),
            "Plan confirmed"
        );

        let Some(signer) = self.deps.signer.as_ref() else {
            let count = plan.len();
            let noun = if count == 1 { "transaction" } else { "transactions" };
            return Ok(HandlerResult::with_transaction(
                format!(
                    "Confirmed. Sign and broadcast the following {count} {noun} in order from your wallet."
                ),
                plan.to_wire(),
            ));
        };

        if signer.address() != wallet {
            return Err(CommandError::Signer(format!(
                "the configured key does not control {}",
                mask_address(&wallet)
            )));
        }

        // Hold the wallet until every step is out so no build reads a stale count.
        let _lease = self.lease(Some(wallet)).await?;
        let mut submitted = Vec::with_capacity(plan.len());
        for (index, step) in plan.steps.iter().enumerate() {
            match signer.submit(&step.tx).await {
                Ok(hash) => {
                    let url = self.deps.network.tx_url(&format!("{hash:?}"));
                    submitted.push(format!("{}: {url}", step.description));
                }
                Err(err) => {
                    let sent = if submitted.is_empty() {
                        String::new()
                    } else {
                        format!(" Already broadcast:\n{}", submitted.join("\n"))
                    };
                    return Err(CommandError::Signer(format!(
                        "step {} of {} ({}) failed: {err}.{sent}",
                        index + 1,
                        plan.len(),
                        step.description
                    )));
                }
            }
        }

        Ok(HandlerResult::response(format!(
            "Transaction submitted. Track it on the explorer:\n{}",
            submitted.join("\n")
        )))
    }

    async fn handle_risk(&self, score: u8) -> Result<HandlerResult, CommandError> {
        let score_text = score.to_string();
        let prompt = prompts::render(
            prompts::RISK_STRATEGY,
            &[("score", score_text.as_str()), ("symbols", self.symbols.as_str())],
        );
        let strategy = self
            .deps
            .generator
            .generate(&prompt, None)
            .await
            .map_err(|e| CommandError::Unavailable {
                feature: "Risk assessment".to_string(),
                reason: e.to_string(),
            })?;
        Ok(HandlerResult::response(strategy))
    }

    async fn handle_attestation(&self) -> Result<HandlerResult, CommandError> {
        let reply = self
            .deps
            .generator
            .generate(prompts::REMOTE_ATTESTATION, None)
            .await
            .map_err(|e| CommandError::Unavailable {
                feature: "Attestation".to_string(),
                reason: e.to_string(),
            })?;
        self.attestation_requested.store(true, Ordering::SeqCst);
        Ok(HandlerResult::response(reply))
    }

    /// Whether `attest` has been answered in this session.
    pub fn attestation_requested(&self) -> bool {
        self.attestation_requested.load(Ordering::SeqCst)
    }

    async fn handle_conversation(&self, text: &str) -> HandlerResult {
        let prompt = prompts::render(prompts::CONVERSATIONAL, &[("user_input", text)]);
        match self.deps.generator.generate(&prompt, None).await {
            Ok(reply) => HandlerResult::response(reply),
            Err(e) => {
                tracing::warn!(error = %e, "Conversational reply failed");
                HandlerResult::response(unrecognized_message(text))
            }
        }
    }

    fn help_text(&self) -> String {
        let native = self.deps.network.native_symbol;
        let wrapped = self.deps.network.wrapped_symbol;
        let mut help = format!(
            "DeFi Assistant Commands ({network})\n\
             \n\
             Wallet:\n\
             \x20 balance                                Check your wallet balance\n\
             \x20 send <amount> <address>                Send {native} to an address\n\
             \n\
             Trading:\n\
             \x20 swap <amount> <token_in> to <token_out>  Swap tokens on BlazeSwap\n\
             \x20   Example: swap 0.1 {wrapped} to USDC.E\n\
             \x20   Example: swap 0.1 {native} to FLX\n\
             \x20   Example: swap 0.5 FLX to {native}\n\
             \n\
             Liquidity:\n\
             \x20 pool add <amount> <token_a> <token_b>  Add liquidity with two tokens\n\
             \x20   Example: pool add 1 {wrapped} USDC.E\n\
             \x20 pool add <amount> {native} <token>        Add liquidity with native {native}\n\
             \x20   Example: pool add 1 {native} USDC.E\n",
            network = self.deps.network.id,
        );
        if self.deps.network.staking.is_some() {
            help.push_str(&format!(
                "\nStaking:\n\
                 \x20 stake <amount> {native}                  Stake {native} for sFLR\n\
                 \x20   Example: stake 10 {native}\n"
            ));
        }
        help.push_str(concat!(
            "\nRisk:\n",
            "  risk <score>                           Strategy for a risk tolerance of 1-10\n",
            "    Example: risk 5\n",
            "\nOther:\n",
            "  confirm                                Release the pending transaction\n",
            "  attest                                 Verify the assistant with a remote attestation\n",
            "  help                                   Show this help\n",
        ));
        help.push_str(&format!("\nSupported tokens: {}\n", self.symbols));
        help.push_str("\nYou can also ask general questions about DeFi on Flare.");
        help
    }
}

#[cfg(test)]
mod tests {
    use super::{command_suggestions, levenshtein_distance, unrecognized_message};

    #[test]
    fn levenshtein_distance_basic() {
        assert_eq!(levenshtein_distance("swap", "swap"), 0);
        assert_eq!(levenshtein_distance("swpa", "swap"), 2);
        assert_eq!(levenshtein_distance("stak", "stake"), 1);
        assert_eq!(levenshtein_distance("", "pool"), 4);
    }

    #[test]
    fn suggestions_for_typos() {
        assert_eq!(command_suggestions("stak"), vec!["stake"]);
        assert_eq!(command_suggestions("balanse"), vec!["balance"]);
        assert!(command_suggestions("weather").is_empty());
    }

    #[test]
    fn unrecognized_message_mentions_help() {
        assert!(unrecognized_message("xyzzy").contains("Type help"));
        assert!(unrecognized_message("pooll add 1").contains("Did you mean pool?"));
    }
}

//! Message routing.
//!
//! Resolution order, first match wins:
//! 1. literal first-word commands,
//! 2. a swap phrase embedded anywhere in the message,
//! 3. the classifier, which defaults to conversation.
//!
//! Every handler error is caught here, logged in full and turned into its
//! user-facing message.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use ethers::types::Address;
use serde_json::Value;

use crate::agent::classifier::Classifier;
use crate::agent::intent::{Intent, LiteralCommand, find_embedded_swap, parse_literal};
use crate::chain::ChainClient;
use crate::defi::{ConfirmationQueue, NonceSequencer, TransactionBuilder};
use crate::error::CommandError;
use crate::llm::{TextGenerator, prompts};
use crate::network::{NetworkProfile, TokenRegistry, mask_address};
use crate::signer::Signer;

/// Reply to one message.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub response: String,
    /// Wire-form plan, present when a plan was built or released unsigned.
    pub transaction: Option<Value>,
}

impl HandlerResult {
    pub fn response(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            transaction: None,
        }
    }

    pub fn with_transaction(text: impl Into<String>, transaction: Value) -> Self {
        Self {
            response: text.into(),
            transaction: Some(transaction),
        }
    }
}

/// Collaborators the router dispatches to. All are shared read-only or
/// internally synchronized.
pub struct RouterDeps {
    pub network: Arc<NetworkProfile>,
    pub tokens: Arc<TokenRegistry>,
    pub chain: Arc<dyn ChainClient>,
    pub builder: Arc<TransactionBuilder>,
    pub nonces: Arc<NonceSequencer>,
    pub confirmations: Arc<ConfirmationQueue>,
    pub classifier: Arc<dyn Classifier>,
    pub generator: Arc<dyn TextGenerator>,
    pub signer: Option<Arc<dyn Signer>>,
}

/// How a message was resolved before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Intent(Intent),
    Confirm,
    Rejected(&'static str),
}

pub struct CommandRouter {
    pub(super) deps: RouterDeps,
    pub(super) symbols: String,
    pub(super) attestation_requested: AtomicBool,
}

impl CommandRouter {
    pub fn new(deps: RouterDeps) -> Self {
        let symbols = deps.tokens.supported_symbols().join(", ");
        Self {
            deps,
            symbols,
            attestation_requested: AtomicBool::new(false),
        }
    }

    pub fn network(&self) -> &NetworkProfile {
        &self.deps.network
    }

    /// Handle one message for `wallet`. Never fails: errors become text.
    pub async fn route(&self, message: &str, wallet: Option<Address>) -> HandlerResult {
        let text = message.trim();
        if text.is_empty() {
            return HandlerResult::response("Please enter a message.");
        }

        match self.dispatch(text, wallet).await {
            Ok(result) => result,
            Err(err) => self.render_error(text, wallet, err).await,
        }
    }

    async fn dispatch(
        &self,
        text: &str,
        wallet: Option<Address>,
    ) -> Result<HandlerResult, CommandError> {
        let resolution = self.resolve(text).await?;

        if resolution != Resolution::Confirm
            && let Some(wallet) = wallet
            && self.deps.confirmations.discard(wallet).await
        {
            tracing::debug!(wallet = %mask_address(&wallet), "Discarded pending plan for new command");
        }

        match resolution {
            Resolution::Confirm => self.handle_confirm(wallet).await,
            Resolution::Rejected(reply) => Ok(HandlerResult::response(reply)),
            Resolution::Intent(intent) => {
                tracing::info!(
                    intent = intent.label(),
                    wallet = %wallet.map(|w| mask_address(&w)).unwrap_or_else(|| "none".to_string()),
                    "Routing message"
                );
                self.handle_intent(text, intent, wallet).await
            }
        }
    }

    /// Resolve without touching wallet, nonce or queue state.
    pub(crate) async fn resolve(&self, text: &str) -> Result<Resolution, CommandError> {
        if let Some(literal) = parse_literal(text, &self.deps.network, &self.symbols) {
            return match literal? {
                LiteralCommand::Intent(intent) => Ok(Resolution::Intent(intent)),
                LiteralCommand::Confirm => Ok(Resolution::Confirm),
                LiteralCommand::Rejected(reply) => Ok(Resolution::Rejected(reply)),
                LiteralCommand::ExtractSend => self.extract_send(text).await,
            };
        }

        if let Some(swap) = find_embedded_swap(text) {
            tracing::debug!("Matched embedded swap phrase");
            return swap.map(Resolution::Intent);
        }

        self.deps
            .classifier
            .classify(text)
            .await
            .map(Resolution::Intent)
    }

    /// A `send` the literal grammar could not parse: only a transfer from
    /// the classifier is acceptable.
    async fn extract_send(&self, text: &str) -> Result<Resolution, CommandError> {
        match self.deps.classifier.classify(text).await? {
            intent @ Intent::SendToken { .. } => Ok(Resolution::Intent(intent)),
            other => {
                tracing::debug!(classified = other.label(), "Send extraction returned another intent");
                Err(CommandError::parse(
                    "the transfer details",
                    "Try: send <amount> <address>",
                ))
            }
        }
    }

    async fn render_error(
        &self,
        text: &str,
        wallet: Option<Address>,
        err: CommandError,
    ) -> HandlerResult {
        tracing::warn!(
            kind = err.kind(),
            wallet = %wallet.map(|w| mask_address(&w)).unwrap_or_else(|| "none".to_string()),
            error = ?err,
            "Command failed"
        );

        let CommandError::Parse { field, hint } = &err else {
            return HandlerResult::response(err.to_string());
        };

        let prompt = prompts::render(
            prompts::FOLLOW_UP,
            &[
                ("missing", field.as_str()),
                ("example", hint.as_str()),
                ("user_input", text),
            ],
        );
        match self.deps.generator.generate(&prompt, None).await {
            Ok(follow_up) => HandlerResult::response(follow_up),
            Err(e) => {
                tracing::debug!(error = %e, "Follow-up prompt failed, using static hint");
                HandlerResult::response(err.to_string())
            }
        }
    }
}

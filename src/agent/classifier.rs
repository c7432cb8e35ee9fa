//! Free-text classification behind a typed interface.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::agent::intent::{Intent, parse_stake};
use crate::error::{CommandError, LlmError};
use crate::chain::RetryPolicy;
use crate::llm::{
    TextGenerator, default_retry_policy, generate_with_retry, prompts, strip_code_fence,
};
use crate::network::{NetworkProfile, parse_address};

/// Maps a message the literal grammar did not recognize to an intent.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Unrecognized or failed classifications resolve to
    /// `Intent::Conversational`. Recognized categories whose fields cannot
    /// be extracted return `CommandError::Parse`.
    async fn classify(&self, text: &str) -> Result<Intent, CommandError>;
}

/// Category labels returned by the routing prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    StakeNative,
    CheckBalance,
    SendToken,
    CrossChainSwap,
    SwapToken,
    AddLiquidityNative,
    RequestAttestation,
    Conversational,
}

impl Category {
    fn from_label(label: &str) -> Self {
        match label.trim().trim_matches('"').to_ascii_uppercase().as_str() {
            "STAKE_FLR" => Self::StakeNative,
            "CHECK_BALANCE" => Self::CheckBalance,
            "SEND_TOKEN" => Self::SendToken,
            "CROSS_CHAIN_SWAP" => Self::CrossChainSwap,
            "SWAP_TOKEN" => Self::SwapToken,
            "ADD_LIQUIDITY_NAT" => Self::AddLiquidityNative,
            "REQUEST_ATTESTATION" => Self::RequestAttestation,
            _ => Self::Conversational,
        }
    }
}

/// Two-stage classifier: a category label, then field extraction for the
/// categories that carry arguments.
pub struct LlmClassifier {
    generator: Arc<dyn TextGenerator>,
    network: Arc<NetworkProfile>,
    symbols: String,
    retry: RetryPolicy,
}

impl LlmClassifier {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        network: Arc<NetworkProfile>,
        symbols: &[String],
    ) -> Self {
        Self {
            generator,
            network,
            symbols: symbols.join(", "),
            retry: default_retry_policy(),
        }
    }

    /// Replace the timeout and retry budget applied to each generation.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn generate(&self, prompt: &str, schema: &Value) -> Result<String, LlmError> {
        generate_with_retry(self.generator.as_ref(), prompt, Some(schema), self.retry).await
    }

    async fn category(&self, text: &str) -> Category {
        let prompt = prompts::render(prompts::SEMANTIC_ROUTER, &[("user_input", text)]);
        let schema = prompts::router_schema();
        match self.generate(&prompt, &schema).await {
            Ok(raw) => {
                let body = strip_code_fence(&raw);
                let label = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| v.get("category").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| body.to_string());
                Category::from_label(&label)
            }
            Err(e) => {
                tracing::warn!(
                    provider = self.generator.provider_name(),
                    error = %e,
                    "Classification failed, treating message as conversational"
                );
                Category::Conversational
            }
        }
    }

    async fn extract(
        &self,
        template: &str,
        schema: Value,
        text: &str,
        field: &str,
        hint: &str,
    ) -> Result<Value, CommandError> {
        let prompt = prompts::render(
            template,
            &[("user_input", text), ("symbols", self.symbols.as_str())],
        );
        let raw = self
            .generate(&prompt, &schema)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, field, "Field extraction failed");
                CommandError::parse(field, hint)
            })?;
        serde_json::from_str(strip_code_fence(&raw)).map_err(|e| {
            tracing::warn!(error = %e, field, "Extraction reply was not JSON");
            CommandError::parse(field, hint)
        })
    }

    async fn extract_send(&self, text: &str) -> Result<Intent, CommandError> {
        let hint = "Try: send <amount> <address>\nExample: send 1 0x1D80c49BbBCd1C0911346656B529DF9E5c2F783d";
        let value = self
            .extract(
                prompts::TOKEN_SEND,
                prompts::send_schema(),
                text,
                "the transfer details",
                hint,
            )
            .await?;
        let to_address = value
            .get("to_address")
            .and_then(Value::as_str)
            .and_then(|raw| parse_address(raw.trim()).ok())
            .ok_or_else(|| CommandError::parse("the destination address", hint))?;
        let amount = positive_decimal(value.get("amount"))
            .ok_or_else(|| CommandError::parse("the amount to send", hint))?;
        Ok(Intent::SendToken { to_address, amount })
    }

    async fn extract_swap(&self, text: &str) -> Result<Intent, CommandError> {
        let hint = format!(
            "Try: swap <amount> <token_in> to <token_out>\nSupported tokens: {}",
            self.symbols
        );
        let value = self
            .extract(
                prompts::TOKEN_SWAP,
                prompts::swap_schema(),
                text,
                "the swap details",
                &hint,
            )
            .await?;
        let token_in = symbol(value.get("from_token"))
            .ok_or_else(|| CommandError::parse("the token to sell", hint.as_str()))?;
        let token_out = symbol(value.get("to_token"))
            .ok_or_else(|| CommandError::parse("the token to buy", hint.as_str()))?;
        let amount = positive_decimal(value.get("amount"))
            .ok_or_else(|| CommandError::parse("the amount to swap", hint.as_str()))?;
        Ok(Intent::SwapToken {
            token_in,
            token_out,
            amount,
        })
    }

    async fn extract_cross_chain(&self, text: &str) -> Result<Intent, CommandError> {
        let hint = format!(
            "Say how much {} to move, for example: swap 10 {} to USDC on Arbitrum",
            self.network.native_symbol, self.network.native_symbol
        );
        let value = self
            .extract(
                prompts::CROSS_CHAIN_SWAP,
                prompts::amount_schema(),
                text,
                "the amount",
                &hint,
            )
            .await?;
        let amount = positive_decimal(value.get("amount"))
            .ok_or_else(|| CommandError::parse("the amount", hint.as_str()))?;
        Ok(Intent::CrossChainSwap { amount })
    }

    async fn extract_liquidity_native(&self, text: &str) -> Result<Intent, CommandError> {
        let native = self.network.native_symbol;
        let hint = format!("Try: pool add <amount> {native} <token>\nExample: pool add 1 {native} USDC.E");
        let value = self
            .extract(
                prompts::ADD_LIQUIDITY_NAT,
                prompts::liquidity_nat_schema(),
                text,
                "the liquidity details",
                &hint,
            )
            .await?;
        let token = symbol(value.get("token"))
            .ok_or_else(|| CommandError::parse("the token to pair", hint.as_str()))?;
        let amount_native = positive_decimal(value.get("amount_native"))
            .ok_or_else(|| CommandError::parse(format!("the {native} amount"), hint.as_str()))?;
        Ok(Intent::AddLiquidityNative {
            token,
            amount_native,
        })
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Intent, CommandError> {
        let category = self.category(text).await;
        tracing::debug!(?category, "Classified message");
        match category {
            Category::StakeNative => parse_stake(text, &self.network),
            Category::CheckBalance => Ok(Intent::CheckBalance),
            Category::SendToken => self.extract_send(text).await,
            Category::CrossChainSwap => self.extract_cross_chain(text).await,
            Category::SwapToken => self.extract_swap(text).await,
            Category::AddLiquidityNative => self.extract_liquidity_native(text).await,
            Category::RequestAttestation => Ok(Intent::RequestAttestation),
            Category::Conversational => Ok(Intent::Conversational),
        }
    }
}

/// Accept JSON numbers or numeric strings; zero and negatives are absent.
fn positive_decimal(value: Option<&Value>) -> Option<Decimal> {
    let raw = match value? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    let amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()?
        .normalize();
    (amount > Decimal::ZERO).then_some(amount)
}

fn symbol(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkId, NetworkRegistry};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Replies with queued strings in order.
    struct Scripted {
        replies: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            let mut replies = replies;
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn generate(&self, _prompt: &str, _schema: Option<&Value>) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("{}".to_string()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn classifier(replies: Vec<Result<String, LlmError>>) -> LlmClassifier {
        let network = NetworkRegistry::builtin()
            .unwrap()
            .profile(NetworkId::Flare)
            .unwrap()
            .clone();
        LlmClassifier::new(
            Scripted::new(replies),
            Arc::new(network),
            &["FLR".to_string(), "USDC.E".to_string()],
        )
        .with_retry_policy(RetryPolicy {
            timeout: std::time::Duration::from_millis(200),
            max_retries: 1,
            backoff: std::time::Duration::from_millis(1),
        })
    }

    fn dropped_connection() -> Result<String, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "scripted".to_string(),
            reason: "connection reset".to_string(),
        })
    }

    #[tokio::test]
    async fn unknown_label_is_conversational() {
        let c = classifier(vec![Ok(r#"{"category":"WEATHER"}"#.to_string())]);
        assert_eq!(c.classify("is it sunny").await.unwrap(), Intent::Conversational);
    }

    #[tokio::test]
    async fn generator_failure_is_conversational() {
        let c = classifier(vec![dropped_connection(), dropped_connection()]);
        assert_eq!(c.classify("hello").await.unwrap(), Intent::Conversational);
    }

    #[tokio::test]
    async fn dropped_connection_is_retried_before_classifying() {
        let c = classifier(vec![
            dropped_connection(),
            Ok(r#"{"category":"CHECK_BALANCE"}"#.to_string()),
        ]);
        assert_eq!(
            c.classify("how much do I have").await.unwrap(),
            Intent::CheckBalance
        );
    }

    #[tokio::test]
    async fn extraction_retries_a_dropped_connection() {
        let c = classifier(vec![
            Ok(r#"{"category":"CROSS_CHAIN_SWAP"}"#.to_string()),
            dropped_connection(),
            Ok(r#"{"amount":4}"#.to_string()),
        ]);
        assert_eq!(
            c.classify("move 4 flr to base").await.unwrap(),
            Intent::CrossChainSwap { amount: dec!(4) }
        );
    }

    #[tokio::test]
    async fn send_extraction_accepts_string_amount() {
        let c = classifier(vec![
            Ok("```json\n{\"category\":\"SEND_TOKEN\"}\n```".to_string()),
            Ok(r#"{"to_address":"0xe3A1b355ca63abCBC9589334B5e609583C7BAa06","amount":"2.5"}"#
                .to_string()),
        ]);
        match c.classify("pay the router 2.5").await.unwrap() {
            Intent::SendToken { amount, .. } => assert_eq!(amount, dec!(2.5)),
            other => panic!("Expected SendToken, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_send_amount_asks_for_clarification() {
        let c = classifier(vec![
            Ok(r#"{"category":"SEND_TOKEN"}"#.to_string()),
            Ok(r#"{"to_address":"0xe3A1b355ca63abCBC9589334B5e609583C7BAa06","amount":0}"#
                .to_string()),
        ]);
        let err = c.classify("send some flr").await.unwrap_err();
        assert!(matches!(err, CommandError::Parse { .. }));
    }

    #[tokio::test]
    async fn swap_extraction_uppercases_symbols() {
        let c = classifier(vec![
            Ok("SWAP_TOKEN".to_string()),
            Ok(r#"{"from_token":"flr","to_token":"usdc.e","amount":0.1}"#.to_string()),
        ]);
        assert_eq!(
            c.classify("trade a tenth of a flare into usdc").await.unwrap(),
            Intent::SwapToken {
                token_in: "FLR".to_string(),
                token_out: "USDC.E".to_string(),
                amount: dec!(0.1),
            }
        );
    }

    #[tokio::test]
    async fn stake_category_uses_lexical_scan() {
        let c = classifier(vec![Ok(r#"{"category":"STAKE_FLR"}"#.to_string())]);
        assert_eq!(
            c.classify("I'd like to stake 3 flare").await.unwrap(),
            Intent::StakeNative { amount: dec!(3) }
        );
    }

    #[tokio::test]
    async fn cross_chain_extracts_amount() {
        let c = classifier(vec![
            Ok(r#"{"category":"CROSS_CHAIN_SWAP"}"#.to_string()),
            Ok(r#"{"amount":10}"#.to_string()),
        ]);
        assert_eq!(
            c.classify("bridge 10 flr to usdc on arbitrum").await.unwrap(),
            Intent::CrossChainSwap { amount: dec!(10) }
        );
    }

    #[test]
    fn positive_decimal_rejects_non_positive() {
        assert_eq!(positive_decimal(Some(&serde_json::json!(1.25))), Some(dec!(1.25)));
        assert_eq!(positive_decimal(Some(&serde_json::json!(0))), None);
        assert_eq!(positive_decimal(Some(&serde_json::json!("-1"))), None);
        assert_eq!(positive_decimal(None), None);
    }
}

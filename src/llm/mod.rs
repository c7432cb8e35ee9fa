//! Language-model access.
//!
//! The router only needs free-text generation, optionally constrained to a
//! JSON schema. Everything model-specific stays behind `TextGenerator`.

mod openai_compat;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::chain::RetryPolicy;
use crate::error::LlmError;

pub use self::openai_compat::{OpenAiCompatibleConfig, OpenAiCompatibleGenerator};

/// Free-text generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply to `prompt`. When `schema` is given the reply must
    /// be a JSON document matching it.
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&serde_json::Value>,
    ) -> Result<String, LlmError>;

    fn provider_name(&self) -> &str;
}

/// Call `generator` under `policy`: each attempt is bounded by the policy
/// timeout and request failures are retried up to `max_retries` times.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    schema: Option<&serde_json::Value>,
    policy: RetryPolicy,
) -> Result<String, LlmError> {
    let mut tries = 0u32;
    loop {
        let result =
            match tokio::time::timeout(policy.timeout, generator.generate(prompt, schema)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::RequestFailed {
                    provider: generator.provider_name().to_string(),
                    reason: format!("timed out after {:?}", policy.timeout),
                }),
            };

        match result {
            Ok(reply) => return Ok(reply),
            Err(err) if err.is_retryable() && tries < policy.max_retries => {
                tries += 1;
                tracing::warn!(
                    provider = generator.provider_name(),
                    attempt = tries,
                    error = %err,
                    "Retrying generation after transient failure"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Retry budget for generation when none is configured.
pub fn default_retry_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(30),
        ..RetryPolicy::default()
    }
}

/// `TextGenerator` that runs every call through [`generate_with_retry`].
pub struct RetryingGenerator {
    inner: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl RetryingGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl TextGenerator for RetryingGenerator {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&serde_json::Value>,
    ) -> Result<String, LlmError> {
        generate_with_retry(self.inner.as_ref(), prompt, schema, self.policy).await
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

/// Strip a Markdown code fence some models wrap JSON replies in.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

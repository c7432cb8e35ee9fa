//! OpenAI-compatible chat-completions backend (Gemini, OpenAI, local
//! gateways).

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::TextGenerator;

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout: Duration,
    /// Persona prompt sent as the system message.
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

fn redact_sensitive_detail(raw: &str) -> String {
    let mut value = raw.to_string();
    let patterns = [
        (r"(?i)\b(bearer)\s+[a-z0-9._\-~+/]+=*", "$1 [REDACTED]"),
        (r"(?i)\b(key)=([^&\s]+)", "$1=[REDACTED]"),
        (r"(?i)\bAIza[0-9a-z_\-]{20,}\b", "[REDACTED]"),
    ];
    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            value = re.replace_all(&value, replacement).into_owned();
        }
    }
    value
}

pub struct OpenAiCompatibleGenerator {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleGenerator {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: config.model.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(
        &self,
        prompt: &str,
        schema: Option<&serde_json::Value>,
    ) -> Result<String, LlmError> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            return Err(LlmError::MissingApiKey {
                provider: self.provider_name().to_string(),
            });
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            response_format: schema.map(|schema| {
                serde_json::json!({
                    "type": "json_schema",
                    "json_schema": { "name": "response", "schema": schema },
                })
            }),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider_name().to_string(),
                reason: redact_sensitive_detail(&e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: self.provider_name().to_string(),
                reason: format!("HTTP {}: {}", status, redact_sensitive_detail(&body)),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                provider: self.provider_name().to_string(),
                reason: e.to_string(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: self.provider_name().to_string(),
                reason: "empty completion".to_string(),
            })
    }

    fn provider_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> OpenAiCompatibleConfig {
        OpenAiCompatibleConfig {
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            api_key: api_key.map(|k| SecretString::from(k.to_string())),
            model: "test-model".to_string(),
            timeout: Duration::from_millis(200),
            system_prompt: None,
        }
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let generator = OpenAiCompatibleGenerator::new(config(None)).unwrap();
        assert_eq!(
            generator.endpoint(),
            "http://127.0.0.1:9/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let generator = OpenAiCompatibleGenerator::new(config(None)).unwrap();
        let err = generator.generate("hi", None).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[test]
    fn redacts_keys_in_error_text() {
        let redacted = redact_sensitive_detail(
            "error sending request for url (https://x/v1?key=AIzaSyA1234567890abcdefghijk): Bearer abc.def",
        );
        assert!(!redacted.contains("AIzaSyA1234567890abcdefghijk"));
        assert!(redacted.contains("Bearer [REDACTED]"));
    }
}

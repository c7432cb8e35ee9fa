//! Error types for defai.

use std::time::Duration;

/// Top-level error type for the router runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while talking to the JSON-RPC node.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC {operation} failed: {reason}")]
    Network { operation: String, reason: String },

    #[error("RPC {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("execution reverted: {reason}")]
    Reverted { reason: String },

    #[error("Failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("ABI error: {0}")]
    Abi(#[from] ethers::abi::Error),
}

impl ChainError {
    /// Transient transport failures are the only ones worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// Language-model backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("No API key configured for {provider}")]
    MissingApiKey { provider: String },
}

impl LlmError {
    /// Only transport-level request failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
    }
}

/// Interactive channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to start channel {name}: {reason}")]
    StartupFailed { name: String, reason: String },
}

/// Failures a command handler can surface to the user.
///
/// The `Display` text of every variant is safe to show verbatim; the
/// router logs the full value and replies with the message only.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported token: {symbol}. Supported tokens: {}", supported.join(", "))]
    UnsupportedToken {
        symbol: String,
        supported: Vec<String>,
    },

    #[error("Insufficient liquidity: {reason}")]
    InsufficientLiquidity { reason: String },

    #[error("No wallet connected. Connect a wallet address before requesting transactions.")]
    WalletNotConnected,

    #[error("Could not determine {field}. {hint}")]
    Parse { field: String, hint: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("No pending transaction to confirm. Issue a command first.")]
    ConfirmationNotFound,

    #[error("{feature} is not available: {reason}")]
    Unavailable { feature: String, reason: String },

    #[error("Signing failed: {0}")]
    Signer(String),
}

impl CommandError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn parse(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Parse {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Stable label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnsupportedToken { .. } => "unsupported_token",
            Self::InsufficientLiquidity { .. } => "insufficient_liquidity",
            Self::WalletNotConnected => "wallet_not_connected",
            Self::Parse { .. } => "parse",
            Self::Network(_) => "network",
            Self::ConfirmationNotFound => "confirmation_not_found",
            Self::Unavailable { .. } => "unavailable",
            Self::Signer(_) => "signer",
        }
    }
}

/// A revert means the transaction itself would fail, so it is reported as
/// a validation problem. Everything else is a network failure.
impl From<ChainError> for CommandError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Reverted { reason } => Self::Validation(format!(
                "The transaction would fail on-chain ({reason}). Check your balance and amounts."
            )),
            other => Self::Network(other.to_string()),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

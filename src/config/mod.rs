//! Configuration for defai.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! `./.env` and `~/.defai/.env` are loaded via dotenvy early in startup.

pub(crate) mod helpers;

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use ethers::types::Address;
use secrecy::SecretString;

use crate::chain::RetryPolicy;
use crate::defi::LiquidityQuoteMode;
use crate::error::ConfigError;
use crate::llm::OpenAiCompatibleConfig;
use crate::network::{NetworkId, NetworkRegistry, parse_address};
use crate::settings::Settings;

pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Main configuration for the router.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub rpc: RetryPolicy,
    pub liquidity_mode: LiquidityQuoteMode,
    pub confirmation: ConfirmationConfig,
    pub llm: LlmConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub id: NetworkId,
    pub rpc_url: String,
}

impl NetworkConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let id = NetworkId::parse(
            &helpers::optional_env("DEFAI_NETWORK")?.unwrap_or_else(|| settings.network.clone()),
            "DEFAI_NETWORK",
        )?;

        let rpc_url = match helpers::optional_env("WEB3_PROVIDER_URL")?
            .or_else(|| settings.rpc.provider_url.clone())
        {
            Some(url) => url,
            None => NetworkRegistry::builtin()?
                .profile(id)
                .map(|profile| profile.default_rpc_url.to_string())
                .ok_or_else(|| ConfigError::MissingRequired {
                    key: "WEB3_PROVIDER_URL".to_string(),
                    hint: format!("no default RPC endpoint for {id}"),
                })?,
        };
        url::Url::parse(&rpc_url).map_err(|e| ConfigError::InvalidValue {
            key: "WEB3_PROVIDER_URL".to_string(),
            message: format!("must be a URL: {e}"),
        })?;

        Ok(Self { id, rpc_url })
    }
}

fn resolve_rpc(settings: &Settings) -> Result<RetryPolicy, ConfigError> {
    let timeout_ms = helpers::require_positive(
        "RPC_TIMEOUT_MS",
        helpers::parse_env_or(
            "RPC_TIMEOUT_MS",
            settings.rpc.timeout_ms,
            "a positive integer",
        )?,
    )?;
    let max_retries = helpers::parse_env_or(
        "RPC_MAX_RETRIES",
        settings.rpc.max_retries,
        "a non-negative integer",
    )?;
    let backoff_ms = helpers::parse_env_or(
        "RPC_RETRY_BACKOFF_MS",
        settings.rpc.retry_backoff_ms,
        "a non-negative integer",
    )?;

    Ok(RetryPolicy {
        timeout: Duration::from_millis(timeout_ms),
        max_retries,
        backoff: Duration::from_millis(backoff_ms),
    })
}

fn parse_quote_mode(value: &str, key: &str) -> Result<LiquidityQuoteMode, ConfigError> {
    match normalize_variant(value).as_str() {
        "reserves" | "reserve" => Ok(LiquidityQuoteMode::Reserves),
        "legacy" | "static" => Ok(LiquidityQuoteMode::Legacy),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected 'reserves' or 'legacy', got '{value}'"),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationConfig {
    pub capacity: NonZeroUsize,
    pub ttl: chrono::Duration,
}

impl ConfirmationConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let capacity = helpers::parse_env_or(
            "CONFIRMATION_QUEUE_CAPACITY",
            settings.confirmation.capacity,
            "a positive integer",
        )?;
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| ConfigError::InvalidValue {
            key: "CONFIRMATION_QUEUE_CAPACITY".to_string(),
            message: "must be > 0".to_string(),
        })?;

        let ttl_secs = helpers::require_positive(
            "CONFIRMATION_TTL_SECS",
            helpers::parse_env_or(
                "CONFIRMATION_TTL_SECS",
                settings.confirmation.ttl_secs,
                "a positive integer",
            )?,
        )?;
        let ttl_secs = i64::try_from(ttl_secs).map_err(|_| ConfigError::InvalidValue {
            key: "CONFIRMATION_TTL_SECS".to_string(),
            message: "out of range".to_string(),
        })?;
        let ttl = chrono::Duration::try_seconds(ttl_secs).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "CONFIRMATION_TTL_SECS".to_string(),
                message: "out of range".to_string(),
            }
        })?;

        Ok(Self { capacity, ttl })
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let base_url = helpers::optional_env("LLM_BASE_URL")?
            .or_else(|| settings.llm.base_url.clone())
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        url::Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "LLM_BASE_URL".to_string(),
            message: format!("must be a URL: {e}"),
        })?;

        let api_key = match helpers::optional_env("LLM_API_KEY")? {
            Some(key) => Some(key),
            None => helpers::optional_env("GEMINI_API_KEY")?,
        }
        .map(SecretString::from);

        let model = helpers::optional_env("LLM_MODEL")?.unwrap_or_else(|| settings.llm.model.clone());

        let timeout_ms = helpers::require_positive(
            "LLM_TIMEOUT_MS",
            helpers::parse_env_or("LLM_TIMEOUT_MS", settings.llm.timeout_ms, "a positive integer")?,
        )?;

        Ok(Self {
            base_url,
            api_key,
            model,
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    /// Retry budget for generation: the LLM timeout with the RPC retry
    /// count and backoff.
    pub fn retry_policy(&self, rpc: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            timeout: self.timeout,
            ..rpc
        }
    }

    /// Backend config with `system_prompt` as the persona.
    pub fn generator_config(&self, system_prompt: &str) -> OpenAiCompatibleConfig {
        OpenAiCompatibleConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            timeout: self.timeout,
            system_prompt: Some(system_prompt.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalletConfig {
    /// Address bound to the REPL session.
    pub address: Option<Address>,
    /// Key for in-process signing on `confirm`. Without it, confirmed plans
    /// are returned unsigned.
    pub signer_key: Option<SecretString>,
}

impl WalletConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let address = helpers::optional_env("WALLET_ADDRESS")?
            .or_else(|| settings.wallet_address.clone())
            .map(|raw| {
                parse_address(&raw).map_err(|message| ConfigError::InvalidValue {
                    key: "WALLET_ADDRESS".to_string(),
                    message,
                })
            })
            .transpose()?;
        let signer_key = helpers::optional_env("SIGNER_PRIVATE_KEY")?.map(SecretString::from);
        Ok(Self {
            address,
            signer_key,
        })
    }
}

fn normalize_variant(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

impl Config {
    /// Load from env with an optional TOML config file overlay.
    ///
    /// Loads both `./.env` (higher priority) and `~/.defai/.env` (lower
    /// priority) via dotenvy, which never overwrites existing vars.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_defai_env();
        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;
        Self::build(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.defai/config.toml` (missing file is ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    pub(crate) fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let liquidity_mode = parse_quote_mode(
            &helpers::optional_env("LIQUIDITY_QUOTE_MODE")?
                .unwrap_or_else(|| settings.liquidity.quote_mode.clone()),
            "LIQUIDITY_QUOTE_MODE",
        )?;

        Ok(Self {
            network: NetworkConfig::resolve(settings)?,
            rpc: resolve_rpc(settings)?,
            liquidity_mode,
            confirmation: ConfirmationConfig::resolve(settings)?,
            llm: LlmConfig::resolve(settings)?,
            wallet: WalletConfig::resolve(settings)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "DEFAI_NETWORK",
        "WEB3_PROVIDER_URL",
        "RPC_TIMEOUT_MS",
        "RPC_MAX_RETRIES",
        "RPC_RETRY_BACKOFF_MS",
        "LIQUIDITY_QUOTE_MODE",
        "CONFIRMATION_QUEUE_CAPACITY",
        "CONFIRMATION_TTL_SECS",
        "LLM_BASE_URL",
        "LLM_API_KEY",
        "GEMINI_API_KEY",
        "LLM_MODEL",
        "LLM_TIMEOUT_MS",
        "WALLET_ADDRESS",
        "SIGNER_PRIVATE_KEY",
    ];

    fn clear_env() {
        for key in KEYS {
            // SAFETY: Guarded by ENV_MUTEX in tests.
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_without_env() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();

        let config = Config::build(&Settings::default()).unwrap();
        assert_eq!(config.network.id, NetworkId::Flare);
        assert_eq!(
            config.network.rpc_url,
            "https://flare-api.flare.network/ext/C/rpc"
        );
        assert_eq!(config.rpc, RetryPolicy::default());
        assert_eq!(config.liquidity_mode, LiquidityQuoteMode::Reserves);
        assert_eq!(config.confirmation.capacity.get(), 256);
        assert_eq!(config.confirmation.ttl, chrono::Duration::seconds(900));
        assert_eq!(config.llm.base_url, DEFAULT_LLM_BASE_URL);
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert!(config.llm.api_key.is_none());
        assert!(config.wallet.address.is_none());

        let llm_retry = config.llm.retry_policy(config.rpc);
        assert_eq!(llm_retry.timeout, Duration::from_millis(30_000));
        assert_eq!(llm_retry.max_retries, config.rpc.max_retries);
        assert_eq!(llm_retry.backoff, config.rpc.backoff);
    }

    #[test]
    fn env_overrides_settings() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();
        // SAFETY: Guarded by ENV_MUTEX in tests.
        unsafe {
            std::env::set_var("DEFAI_NETWORK", "coston2");
            std::env::set_var("RPC_TIMEOUT_MS", "1500");
            std::env::set_var("LIQUIDITY_QUOTE_MODE", "legacy");
            std::env::set_var("GEMINI_API_KEY", "gemini-secret");
            std::env::set_var(
                "WALLET_ADDRESS",
                "0xe3a1b355ca63abcbc9589334b5e609583c7baa06",
            );
        }

        let settings = Settings {
            network: "flare".to_string(),
            ..Default::default()
        };
        let config = Config::build(&settings).unwrap();
        clear_env();

        assert_eq!(config.network.id, NetworkId::Coston2);
        assert_eq!(
            config.network.rpc_url,
            "https://coston2-api.flare.network/ext/C/rpc"
        );
        assert_eq!(config.rpc.timeout, Duration::from_millis(1500));
        assert_eq!(config.liquidity_mode, LiquidityQuoteMode::Legacy);
        assert_eq!(
            config.llm.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("gemini-secret".to_string())
        );
        assert!(config.wallet.address.is_some());
    }

    #[test]
    fn rejects_invalid_values() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");

        for (key, value) in [
            ("DEFAI_NETWORK", "ethereum"),
            ("RPC_TIMEOUT_MS", "0"),
            ("RPC_MAX_RETRIES", "-1"),
            ("CONFIRMATION_QUEUE_CAPACITY", "0"),
            ("LIQUIDITY_QUOTE_MODE", "oracle"),
            ("WEB3_PROVIDER_URL", "not a url"),
            ("WALLET_ADDRESS", "0x1234"),
        ] {
            clear_env();
            // SAFETY: Guarded by ENV_MUTEX in tests.
            unsafe {
                std::env::set_var(key, value);
            }
            let err = Config::build(&Settings::default()).unwrap_err();
            assert!(
                matches!(&err, ConfigError::InvalidValue { key: k, .. } if k == key),
                "{key}={value} gave {err}"
            );
        }
        clear_env();
    }

    #[test]
    fn explicit_toml_overlay_applies_and_missing_file_fails() {
        let _guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        clear_env();
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "network = \"coston2\"\n\n[rpc]\nmax_retries = 3\n",
        )
        .unwrap();

        let mut settings = Settings::default();
        Config::apply_toml_overlay(&mut settings, Some(&path)).unwrap();
        let config = Config::build(&settings).unwrap();
        assert_eq!(config.network.id, NetworkId::Coston2);
        assert_eq!(config.rpc.max_retries, 3);

        let missing = dir.path().join("absent.toml");
        let err = Config::apply_toml_overlay(&mut Settings::default(), Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}

//! File-backed settings.
//!
//! `~/.defai/config.toml` (or the `--config` path) supplies values that env
//! vars do not override. Every field has a default, so a partial file is
//! valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Network id: "flare" or "coston2".
    #[serde(default = "default_network")]
    pub network: String,

    /// Wallet bound to the REPL session.
    #[serde(default)]
    pub wallet_address: Option<String>,

    #[serde(default)]
    pub rpc: RpcSettings,

    #[serde(default)]
    pub liquidity: LiquiditySettings,

    #[serde(default)]
    pub confirmation: ConfirmationSettings,

    #[serde(default)]
    pub llm: LlmSettings,
}

fn default_network() -> String {
    "flare".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: default_network(),
            wallet_address: None,
            rpc: RpcSettings::default(),
            liquidity: LiquiditySettings::default(),
            confirmation: ConfirmationSettings::default(),
            llm: LlmSettings::default(),
        }
    }
}

/// JSON-RPC endpoint and call budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcSettings {
    /// Endpoint override; the network default is used when absent.
    #[serde(default)]
    pub provider_url: Option<String>,

    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries for transport failures only.
    #[serde(default = "default_rpc_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_rpc_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_rpc_timeout_ms() -> u64 {
    5_000
}

fn default_rpc_max_retries() -> u32 {
    1
}

fn default_rpc_retry_backoff_ms() -> u64 {
    250
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            provider_url: None,
            timeout_ms: default_rpc_timeout_ms(),
            max_retries: default_rpc_max_retries(),
            retry_backoff_ms: default_rpc_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquiditySettings {
    /// "reserves" (live pool ratio) or "legacy" (static table).
    #[serde(default = "default_quote_mode")]
    pub quote_mode: String,
}

fn default_quote_mode() -> String {
    "reserves".to_string()
}

impl Default for LiquiditySettings {
    fn default() -> Self {
        Self {
            quote_mode: default_quote_mode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationSettings {
    /// Maximum wallets with a pending plan.
    #[serde(default = "default_confirmation_capacity")]
    pub capacity: usize,

    #[serde(default = "default_confirmation_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_confirmation_capacity() -> usize {
    256
}

fn default_confirmation_ttl_secs() -> u64 {
    900
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            capacity: default_confirmation_capacity(),
            ttl_secs: default_confirmation_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL override.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_llm_timeout_ms() -> u64 {
    30_000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_llm_model(),
            timeout_ms: default_llm_timeout_ms(),
        }
    }
}

impl Settings {
    /// Default TOML config file path (~/.defai/config.toml).
    pub fn default_toml_path() -> PathBuf {
        crate::bootstrap::defai_home().join("config.toml")
    }

    /// Load settings from a TOML file.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_toml(path: &std::path::Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        let settings: Self = toml::from_str(&data)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))?;
        Ok(Some(settings))
    }

    /// Overlay every value in `other` that differs from the default.
    pub fn merge_from(&mut self, other: &Self) {
        let default_json = match serde_json::to_value(Self::default()) {
            Ok(v) => v,
            Err(_) => return,
        };
        let other_json = match serde_json::to_value(other) {
            Ok(v) => v,
            Err(_) => return,
        };
        let mut self_json = match serde_json::to_value(&*self) {
            Ok(v) => v,
            Err(_) => return,
        };

        merge_non_default(&mut self_json, &other_json, &default_json);

        if let Ok(merged) = serde_json::from_value(self_json) {
            *self = merged;
        }
    }
}

fn merge_non_default(
    target: &mut serde_json::Value,
    other: &serde_json::Value,
    defaults: &serde_json::Value,
) {
    match (target, other, defaults) {
        (
            serde_json::Value::Object(t),
            serde_json::Value::Object(o),
            serde_json::Value::Object(d),
        ) => {
            for (key, other_val) in o {
                let default_val = d.get(key).cloned().unwrap_or(serde_json::Value::Null);
                if let Some(target_val) = t.get_mut(key) {
                    merge_non_default(target_val, other_val, &default_val);
                } else if other_val != &default_val {
                    t.insert(key.clone(), other_val.clone());
                }
            }
        }
        (target, other, defaults) => {
            if other != defaults {
                *target = other.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::settings::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn default_toml_path_under_defai() {
        let path = Settings::default_toml_path();
        assert!(path.to_string_lossy().contains(".defai"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert_eq!(Settings::load_toml(&dir.path().join("absent.toml")), Ok(None));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "network = \"coston2\"\n\n[confirmation]\nttl_secs = 60\n",
        )
        .unwrap();

        let loaded = Settings::load_toml(&path).unwrap().unwrap();
        assert_eq!(loaded.network, "coston2");
        assert_eq!(loaded.confirmation.ttl_secs, 60);
        assert_eq!(loaded.confirmation.capacity, 256);
        assert_eq!(loaded.rpc, RpcSettings::default());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "network = [").unwrap();
        let err = Settings::load_toml(&path).unwrap_err();
        assert!(err.contains("invalid TOML"));
    }

    #[test]
    fn merge_only_overrides_non_defaults() {
        let mut base = Settings {
            wallet_address: Some("0xabc".to_string()),
            ..Default::default()
        };
        let overlay = Settings {
            network: "coston2".to_string(),
            rpc: RpcSettings {
                timeout_ms: 2_000,
                ..Default::default()
            },
            ..Default::default()
        };

        base.merge_from(&overlay);

        assert_eq!(base.network, "coston2");
        assert_eq!(base.rpc.timeout_ms, 2_000);
        assert_eq!(base.rpc.max_retries, 1);
        assert_eq!(base.wallet_address, Some("0xabc".to_string()));
    }
}

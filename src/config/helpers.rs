//! Env var readers shared by the config resolvers.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read `key`, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "not valid UTF-8".to_string(),
        }),
    }
}

/// Parse `key` when set, otherwise return `default`.
pub(crate) fn parse_env_or<T>(key: &str, default: T, expected: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be {expected}: {e}"),
        })
        .map(|value| value.unwrap_or(default))
}

/// Reject zero for values that size a timeout or a buffer.
pub(crate) fn require_positive<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default,
{
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(value)
}

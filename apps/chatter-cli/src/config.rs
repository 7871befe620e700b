//! Environment-backed runtime configuration for `chatter-cli`.

use std::{env, error::Error, fmt};

use client_core::RetryPolicy;
use url::Url;

const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/";
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 8;

/// Runtime configuration used by the terminal client.
#[derive(Debug, Clone, PartialEq)]
pub struct CliConfig {
    /// Base URL of the chat server's REST API.
    pub api_url: Url,
    /// Base URL of the chat server's WebSocket streams. Derived from
    /// `api_url` unless set explicitly.
    pub ws_url: Url,
    /// Optional username prefill for `/login`.
    pub prefill_username: Option<String>,
    /// Optional password prefill for `/login`.
    pub prefill_password: Option<String>,
    /// Backoff tuning forwarded to the synchronization runtime.
    pub retry: RetryPolicy,
}

impl CliConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_url = parse_url("CHATTER_API_URL", DEFAULT_API_URL, &mut lookup)?;
        let ws_url = match optional_trimmed_env("CHATTER_WS_URL", &mut lookup) {
            Some(raw) => Url::parse(&raw).map_err(|err| ConfigError::InvalidValue {
                key: "CHATTER_WS_URL",
                value: raw,
                reason: err.to_string(),
            })?,
            None => derive_ws_url(&api_url)?,
        };

        let prefill_username = optional_trimmed_env("CHATTER_USER", &mut lookup);
        let prefill_password = optional_trimmed_env("CHATTER_PASSWORD", &mut lookup);

        let retry_base_ms = parse_optional_u64(
            "CHATTER_RETRY_BASE_MS",
            DEFAULT_RETRY_BASE_MS,
            &mut lookup,
        )?;
        let retry_max_ms =
            parse_optional_u64("CHATTER_RETRY_MAX_MS", DEFAULT_RETRY_MAX_MS, &mut lookup)?;
        let retry_max_attempts = parse_optional_u32(
            "CHATTER_RETRY_MAX_ATTEMPTS",
            DEFAULT_RETRY_MAX_ATTEMPTS,
            &mut lookup,
        )?;

        Ok(Self {
            api_url,
            ws_url,
            prefill_username,
            prefill_password,
            retry: RetryPolicy::new(retry_base_ms, retry_max_ms, retry_max_attempts),
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn derive_ws_url(api_url: &Url) -> Result<Url, ConfigError> {
    let mut ws_url = api_url.clone();
    let scheme = match api_url.scheme() {
        "https" => "wss",
        _ => "ws",
    };
    ws_url
        .set_scheme(scheme)
        .map_err(|()| ConfigError::InvalidValue {
            key: "CHATTER_API_URL",
            value: api_url.to_string(),
            reason: "cannot derive a websocket url from this scheme".to_owned(),
        })?;
    Ok(ws_url)
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_url<F>(key: &'static str, default: &str, lookup: &mut F) -> Result<Url, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let raw = optional_trimmed_env(key, lookup).unwrap_or_else(|| default.to_owned());
    Url::parse(&raw).map_err(|err| ConfigError::InvalidValue {
        key,
        value: raw,
        reason: err.to_string(),
    })
}

fn parse_optional_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_optional_u32<F>(key: &'static str, default: u32, lookup: &mut F) -> Result<u32, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<u32>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<CliConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        CliConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn uses_defaults_when_environment_is_empty() {
        let cfg = config_from_pairs(&[]).expect("config should parse");
        assert_eq!(cfg.api_url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(cfg.ws_url.as_str(), "ws://127.0.0.1:5000/");
        assert_eq!(cfg.prefill_username, None);
        assert_eq!(cfg.retry, RetryPolicy::new(500, 30_000, 8));
    }

    #[test]
    fn derives_secure_websocket_scheme_from_https() {
        let cfg = config_from_pairs(&[("CHATTER_API_URL", "https://chat.example.org/api")])
            .expect("config should parse");
        assert_eq!(cfg.ws_url.as_str(), "wss://chat.example.org/api");
    }

    #[test]
    fn explicit_websocket_url_wins_over_derivation() {
        let cfg = config_from_pairs(&[
            ("CHATTER_API_URL", "http://chat.example.org"),
            ("CHATTER_WS_URL", "ws://push.example.org"),
        ])
        .expect("config should parse");
        assert_eq!(cfg.ws_url.as_str(), "ws://push.example.org/");
    }

    #[test]
    fn parses_retry_tuning() {
        let cfg = config_from_pairs(&[
            ("CHATTER_RETRY_BASE_MS", "100"),
            ("CHATTER_RETRY_MAX_MS", "5000"),
            ("CHATTER_RETRY_MAX_ATTEMPTS", "4"),
        ])
        .expect("config should parse");
        assert_eq!(cfg.retry, RetryPolicy::new(100, 5_000, 4));
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let err = config_from_pairs(&[("CHATTER_RETRY_BASE_MS", "soon")])
            .expect_err("invalid retry value should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHATTER_RETRY_BASE_MS",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unparseable_urls() {
        let err = config_from_pairs(&[("CHATTER_API_URL", "not a url")])
            .expect_err("invalid url should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHATTER_API_URL",
                ..
            }
        ));
    }
}

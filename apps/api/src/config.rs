use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};

const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "mistralai/mistral-7b-instruct";
const DEFAULT_REFERER: &str = "http://localhost:8080";
const DEFAULT_TITLE: &str = "AI Resume Rewriter";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;
const DEFAULT_TIMEOUT_SECS: u64 = 45;
const MAX_TIMEOUT_SECS: u64 = 300;
/// 3 MiB upload ceiling.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 3 * 1024 * 1024;

/// Application configuration loaded once from environment variables at startup.
/// Immutable for the lifetime of the process and passed explicitly to whoever needs it.
#[derive(Clone)]
pub struct Config {
    pub openrouter_api_key: String,
    pub openrouter_api_url: String,
    pub model: String,
    /// Sent as `HTTP-Referer` for attribution on the completion endpoint.
    pub referer: String,
    /// Sent as `X-Title`.
    pub app_title: String,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` is the only
    /// production caller; tests feed a fixed map.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_timeout_secs = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if request_timeout_secs == 0 || request_timeout_secs > MAX_TIMEOUT_SECS {
            bail!("REQUEST_TIMEOUT_SECS must be between 1 and {MAX_TIMEOUT_SECS}");
        }

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        if max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }

        Ok(Config {
            openrouter_api_key: get("OPENROUTER_API_KEY").with_context(|| {
                "Required environment variable 'OPENROUTER_API_KEY' is not set".to_string()
            })?,
            openrouter_api_url: get("OPENROUTER_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            referer: get("APP_REFERER").unwrap_or_else(|| DEFAULT_REFERER.to_string()),
            app_title: get("APP_TITLE").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            max_output_tokens: match get("MAX_OUTPUT_TOKENS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .context("MAX_OUTPUT_TOKENS must be a positive integer")?,
                None => DEFAULT_MAX_OUTPUT_TOKENS,
            },
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_upload_bytes,
            port: get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

// The API key never reaches logs, even through `{:?}`.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("openrouter_api_key", &"<redacted>")
            .field("openrouter_api_url", &self.openrouter_api_url)
            .field("model", &self.model)
            .field("referer", &self.referer)
            .field("app_title", &self.app_title)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied_when_only_key_is_set() {
        let config = Config::from_source(lookup(&[("OPENROUTER_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.openrouter_api_url, DEFAULT_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_upload_bytes, 3 * 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(45));
        assert_eq!(config.max_output_tokens, 2000);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_missing_api_key_fails() {
        let err = Config::from_source(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        assert!(Config::from_source(lookup(&[("OPENROUTER_API_KEY", "   ")])).is_err());
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let result = Config::from_source(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ]));
        assert!(result.is_err());

        let result = Config::from_source(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("REQUEST_TIMEOUT_SECS", "301"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_are_read() {
        let config = Config::from_source(lookup(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("OPENROUTER_MODEL", "some/model"),
            ("REQUEST_TIMEOUT_SECS", "30"),
            ("MAX_UPLOAD_BYTES", "1024"),
            ("APP_TITLE", "Rewriter"),
        ]))
        .unwrap();
        assert_eq!(config.model, "some/model");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.app_title, "Rewriter");
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config =
            Config::from_source(lookup(&[("OPENROUTER_API_KEY", "sk-secret-value")])).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("<redacted>"));
    }
}

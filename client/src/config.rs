//! Client configuration.
//!
//! ```toml
//! [client]
//! base_url = "https://api.example.net/v1/"
//! api_token = "${PNCP_TOKEN}"
//! poll_interval_ms = 1000
//! max_retries = 2
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::retry::RetryConfig;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    client: ClientConfig,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base for relative request and status URLs.
    pub base_url: Option<String>,
    /// Sent as a bearer token. `${ENV_VAR}` references are expanded on load.
    pub api_token: Option<String>,
    /// Fixed wait between task status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Transport retries per call, not counting the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Permit plain `http://` URLs. Off outside of local testing.
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            allow_insecure_http: false,
        }
    }
}

// Manual Debug impl to prevent leaking the API token in logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = if self.api_token.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &token)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("allow_insecure_http", &self.allow_insecure_http)
            .finish()
    }
}

impl ClientConfig {
    /// Load `[client]` from `~/.pncp/config.toml` and apply environment
    /// overrides. Returns `Ok(None)` when there is no config file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(Some(config))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match Self::from_toml_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = file.client;
        config.api_token = config.api_token.map(|token| expand_env_vars(&token));
        Ok(config)
    }

    /// Apply `PNCP_BASE_URL`, `PNCP_API_TOKEN` and `PNCP_POLL_INTERVAL_MS`.
    ///
    /// A poll interval that is not a positive integer is ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup("PNCP_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(base_url);
        }
        if let Some(token) = lookup("PNCP_API_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.api_token = Some(token);
        }
        if let Some(interval) = lookup("PNCP_POLL_INTERVAL_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
        {
            self.poll_interval_ms = interval;
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: &RetryConfig) -> Self {
        self.max_retries = retry.max_retries;
        self.retry_delay_ms = retry.delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }
}

/// Replace `${VAR}` with the value of `VAR`, or nothing if it is unset.
/// An unterminated `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&std::env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pncp").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.retry(), RetryConfig::default());
    }

    #[test]
    fn parses_client_table() {
        let config = ClientConfig::from_toml_str(
            r#"
            [client]
            base_url = "https://api.example.net/v1/"
            poll_interval_ms = 250
            connect_timeout_secs = 5
            request_timeout_secs = 20
            max_retries = 4
            retry_delay_ms = 100
            allow_insecure_http = true
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("https://api.example.net/v1/"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(20));
        assert_eq!(
            config.retry(),
            RetryConfig {
                max_retries: 4,
                delay: Duration::from_millis(100),
            }
        );
        assert!(config.allow_insecure_http);
    }

    #[test]
    fn rejects_wrong_field_type() {
        let result = ClientConfig::from_toml_str("[client]\npoll_interval_ms = \"fast\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn api_token_expands_env_reference() {
        unsafe {
            std::env::set_var("PNCP_CONFIG_TEST_TOKEN", "s3cret");
        }
        let config =
            ClientConfig::from_toml_str("[client]\napi_token = \"${PNCP_CONFIG_TEST_TOKEN}\"\n")
                .unwrap();
        assert_eq!(config.api_token.as_deref(), Some("s3cret"));
        unsafe {
            std::env::remove_var("PNCP_CONFIG_TEST_TOKEN");
        }
    }

    #[test]
    fn debug_redacts_api_token() {
        let config = ClientConfig::default().with_api_token("s3cret");
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = ClientConfig::default().with_base_url("https://file.example.net/");
        config.apply_env_overrides(lookup(&[
            ("PNCP_BASE_URL", "https://env.example.net/"),
            ("PNCP_API_TOKEN", "tok"),
            ("PNCP_POLL_INTERVAL_MS", "40"),
        ]));

        assert_eq!(config.base_url.as_deref(), Some("https://env.example.net/"));
        assert_eq!(config.api_token.as_deref(), Some("tok"));
        assert_eq!(config.poll_interval_ms, 40);
    }

    #[test]
    fn invalid_poll_interval_override_is_ignored() {
        for bad in ["0", "-5", "soon", ""] {
            let mut config = ClientConfig::default();
            config.apply_env_overrides(lookup(&[("PNCP_POLL_INTERVAL_MS", bad)]));
            assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS, "{bad:?}");
        }
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nmax_retries = 0\n").unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn load_from_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[client\n").unwrap();

        let err = ClientConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn load_from_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = ClientConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn expand_env_vars_cases() {
        unsafe {
            std::env::set_var("PNCP_EXPAND_A", "alpha");
            std::env::set_var("PNCP_EXPAND_B", "beta");
            std::env::remove_var("PNCP_EXPAND_MISSING");
        }
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("${PNCP_EXPAND_A}-${PNCP_EXPAND_B}"), "alpha-beta");
        assert_eq!(expand_env_vars("a ${PNCP_EXPAND_MISSING} b"), "a  b");
        assert_eq!(expand_env_vars("x ${} y"), "x  y");
        assert_eq!(expand_env_vars("keep ${UNCLOSED"), "keep ${UNCLOSED");
        unsafe {
            std::env::remove_var("PNCP_EXPAND_A");
            std::env::remove_var("PNCP_EXPAND_B");
        }
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};

pub const ENV_BACKEND_URL: &str = "ECHOBRIDGE_BACKEND_URL";
pub const ENV_TIMEOUT: &str = "ECHOBRIDGE_TIMEOUT";
pub const ENV_RETRY_ATTEMPTS: &str = "ECHOBRIDGE_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY: &str = "ECHOBRIDGE_RETRY_DELAY";

/// Connection settings for the backend.
///
/// Durations are stored as seconds so the file format stays human-editable;
/// use [`BridgeConfig::timeout_duration`] and [`BridgeConfig::retry_delay_duration`]
/// at call sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_backend_url", alias = "backend_url")]
    pub url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: f64,
    /// Total tries for a sensory send, including the first one.
    #[serde(default = "default_retry_attempts", alias = "max_retry_attempts")]
    pub retry_attempts: u32,
    /// Pause between sensory send attempts, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    /// `None` follows HTTP(S)_PROXY, `Some("")` forces a direct connection,
    /// anything else is used as the proxy URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            proxy: None,
        }
    }
}

impl BridgeConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_retry_delay(mut self, secs: f64) -> Self {
        self.retry_delay = secs;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<&str>) -> Self {
        self.proxy = proxy.map(str::to_string);
        self
    }

    /// Falls back to the default when `timeout` is out of range; `validate`
    /// rejects such values up front.
    pub fn timeout_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_timeout_secs()))
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay).unwrap_or(Duration::ZERO)
    }

    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Joins `path` (which starts with `/`) onto the backend base address.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid backend url '{}': {}", self.url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "backend url '{}' must use http or https",
                self.url
            )));
        }
        if self.timeout <= 0.0 || !fits_duration(self.timeout) {
            return Err(Error::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout
            )));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Config("retry_attempts must be positive".to_string()));
        }
        if !fits_duration(self.retry_delay) {
            return Err(Error::Config(format!(
                "retry_delay must be a non-negative number of seconds, got {}",
                self.retry_delay
            )));
        }
        Ok(())
    }
}

/// Non-negative, finite and small enough for a `Duration`.
fn fits_duration(secs: f64) -> bool {
    Duration::try_from_secs_f64(secs).is_ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Pause between two command polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Built-in handlers report `<type>_complete` back to the backend.
    #[serde(default = "default_acknowledge_commands")]
    pub acknowledge_commands: bool,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_acknowledge_commands() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            acknowledge_commands: default_acknowledge_commands(),
        }
    }
}

impl RuntimeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level configuration file.
///
/// Sections this program does not know about are ignored, so a config file
/// shared with other subsystems loads unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BridgeConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Applies `ECHOBRIDGE_*` environment variables on top of the loaded file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.backend.url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            self.backend.timeout = parse_override(ENV_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_ATTEMPTS) {
            self.backend.retry_attempts = parse_override(ENV_RETRY_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETRY_DELAY) {
            self.backend.retry_delay = parse_override(ENV_RETRY_DELAY, &raw)?;
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}='{}': {}", key, raw, e)))
}

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Default TCP port of the bridge's telnet-style console
pub const DEFAULT_PORT: u16 = 23;

const DEFAULT_FIFO_CAPACITY: usize = 200;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_LIGHT_FADE_SECONDS: u32 = 2;

/// How many notifications the log keeps around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Keep everything
    Unbounded,
    /// Keep the most recent `capacity` notifications, evicting the oldest
    BoundedFifo { capacity: usize },
    /// Keep only the latest notification per address
    KeyedLatest,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::BoundedFifo {
            capacity: DEFAULT_FIFO_CAPACITY,
        }
    }
}

/// How `get_light` obtains a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryStrategy {
    /// Always send `rdl` and wait for a fresh report
    #[default]
    Poll,
    /// Answer from the log when the address has been seen, otherwise poll
    CacheFirst,
}

/// Connection and correlation settings for a bridge session
///
/// # Example
///
/// ```
/// use homeworks_bridge::{BridgeConfig, QueryStrategy, RetentionPolicy};
///
/// let config = BridgeConfig::new("192.168.1.50", 23, "admin", "secret")
///     .with_retention(RetentionPolicy::KeyedLatest)
///     .with_query_strategy(QueryStrategy::CacheFirst);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub query_strategy: QueryStrategy,
    /// Interval between log re-scans while waiting for a response
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a command waits for its notification
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Fade time sent with `set_light`
    #[serde(default = "default_light_fade_seconds")]
    pub light_fade_seconds: u32,
    /// Delay sent with `set_light`
    #[serde(default)]
    pub light_delay_seconds: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_light_fade_seconds() -> u32 {
    DEFAULT_LIGHT_FADE_SECONDS
}

impl BridgeConfig {
    /// Create a config with default correlation settings
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            retention: RetentionPolicy::default(),
            query_strategy: QueryStrategy::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            light_fade_seconds: DEFAULT_LIGHT_FADE_SECONDS,
            light_delay_seconds: 0,
        }
    }

    /// Parse a config from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file and validate it
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Set the notification retention policy
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set how `get_light` obtains a level
    pub fn with_query_strategy(mut self, strategy: QueryStrategy) -> Self {
        self.query_strategy = strategy;
        self
    }

    /// Set the interval between log re-scans
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Set how long a command waits for its notification
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Fade and delay used by `set_light`
    pub fn with_light_timing(mut self, fade_seconds: u32, delay_seconds: u32) -> Self {
        self.light_fade_seconds = fade_seconds;
        self.light_delay_seconds = delay_seconds;
        self
    }

    /// Get the poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the response timeout
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Get the connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(BridgeError::InvalidConfig("port must not be 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "response_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let RetentionPolicy::BoundedFifo { capacity: 0 } = self.retention {
            return Err(BridgeError::InvalidConfig(
                "bounded-fifo capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// Keeps the password out of logs
impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("retention", &self.retention)
            .field("query_strategy", &self.query_strategy)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("response_timeout_ms", &self.response_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("light_fade_seconds", &self.light_fade_seconds)
            .field("light_delay_seconds", &self.light_delay_seconds)
            .finish()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_in_defaults() {
        let config = BridgeConfig::from_json_str(
            r#"{ "host": "10.0.0.2", "username": "lutron", "password": "integration" }"#,
        )
        .unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.retention, RetentionPolicy::BoundedFifo { capacity: 200 });
        assert_eq!(config.query_strategy, QueryStrategy::Poll);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.response_timeout(), Duration::from_secs(5));
        assert_eq!(config.light_fade_seconds, 2);
        assert_eq!(config.light_delay_seconds, 0);
    }

    #[test]
    fn json_selects_policies() {
        let config = BridgeConfig::from_json_str(
            r#"{
                "host": "bridge.local",
                "port": 4503,
                "username": "u",
                "password": "p",
                "retention": { "kind": "keyed-latest" },
                "query_strategy": "cache-first"
            }"#,
        )
        .unwrap();
        assert_eq!(config.retention, RetentionPolicy::KeyedLatest);
        assert_eq!(config.query_strategy, QueryStrategy::CacheFirst);

        let config = BridgeConfig::from_json_str(
            r#"{
                "host": "bridge.local",
                "username": "u",
                "password": "p",
                "retention": { "kind": "bounded-fifo", "capacity": 256 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.retention, RetentionPolicy::BoundedFifo { capacity: 256 });
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let base = BridgeConfig::new("host", 23, "u", "p");
        assert!(base.validate().is_ok());

        let cases = [
            BridgeConfig { host: " ".to_string(), ..base.clone() },
            BridgeConfig { port: 0, ..base.clone() },
            BridgeConfig { poll_interval_ms: 0, ..base.clone() },
            BridgeConfig { response_timeout_ms: 0, ..base.clone() },
            base.clone().with_retention(RetentionPolicy::BoundedFifo { capacity: 0 }),
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(BridgeError::InvalidConfig(_))));
        }
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = BridgeConfig::new("host", 23, "admin", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn builders_set_durations() {
        let config = BridgeConfig::new("host", 23, "u", "p")
            .with_poll_interval(Duration::from_millis(20))
            .with_response_timeout(Duration::from_millis(750))
            .with_light_timing(5, 1);
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.response_timeout_ms, 750);
        assert_eq!(config.light_fade_seconds, 5);
        assert_eq!(config.light_delay_seconds, 1);
    }
}

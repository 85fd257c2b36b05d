//! Session configuration
//!
//! Loaded from TOML. Every section except `[broker]` is optional and falls
//! back to the defaults below, which match the chat backend this client was
//! built for (10 s heart-beats both ways, bearer token in `Authorization`).

use crate::credentials::{CredentialProvider, EnvCredential};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Broker endpoint and authentication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Endpoint URL: `ws://`, `wss://` or `tcp://`
    pub url: String,
    /// STOMP `host` header (defaults to the URL host)
    pub host: Option<String>,
    /// Environment variable holding the bearer credential
    pub credential_env: Option<String>,
    /// CONNECT header carrying the credential
    #[serde(default = "default_auth_header")]
    pub auth_header: String,
    /// Prefix placed before the credential, e.g. `Bearer`
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: Option<String>,
}

fn default_auth_header() -> String {
    "Authorization".to_string()
}

fn default_auth_scheme() -> Option<String> {
    Some("Bearer".to_string())
}

/// Session timing and buffer sizes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    /// Topics subscribed when the session opens
    pub topics: Vec<String>,
    pub connect_timeout_ms: u64,
    /// Default deadline for publishes that request a receipt
    pub receipt_timeout_ms: u64,
    pub receipt_sweep_interval_ms: u64,
    pub disconnect_timeout_ms: u64,
    /// How often to re-ask the credential provider while it has nothing
    pub credential_poll_interval_ms: u64,
    /// Number of recent message ids remembered for de-duplication
    pub dedup_capacity: usize,
    /// Messages a log reader may fall behind before it lags
    pub log_capacity: usize,
    pub max_frame_bytes: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            connect_timeout_ms: 10_000,
            receipt_timeout_ms: 10_000,
            receipt_sweep_interval_ms: 250,
            disconnect_timeout_ms: 2_000,
            credential_poll_interval_ms: 1_000,
            dedup_capacity: 1024,
            log_capacity: 256,
            max_frame_bytes: crate::protocol::DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl SessionSection {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn receipt_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_sweep_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn credential_poll_interval(&self) -> Duration {
        Duration::from_millis(self.credential_poll_interval_ms)
    }
}

/// Heart-beat offer sent on CONNECT
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatSection {
    /// Interval we can send heart-beats at (0 = never)
    pub outgoing_ms: u64,
    /// Interval we want to receive heart-beats at (0 = never)
    pub incoming_ms: u64,
    /// Incoming silence tolerated, as a multiple of the negotiated interval
    pub grace_multiplier: f64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            outgoing_ms: 10_000,
            incoming_ms: 10_000,
            grace_multiplier: 2.5,
        }
    }
}

/// Reconnection backoff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectSection {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Maximum consecutive attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Proportional jitter in `0.0..=1.0`
    pub jitter_ratio: f64,
    /// Case-insensitive fragments that mark an ERROR answering an anonymous
    /// CONNECT as a rejection rather than a transient failure. An ERROR
    /// answering a CONNECT that carried a credential is always a rejection.
    pub auth_error_patterns: Vec<String>,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: None,
            jitter_ratio: 0.0,
            auth_error_patterns: default_auth_error_patterns(),
        }
    }
}

pub fn default_auth_error_patterns() -> Vec<String> {
    [
        "unauthorized",
        "unauthenticated",
        "authentication",
        "forbidden",
        "access denied",
        "invalid token",
        "token",
        "credential",
        "401",
        "403",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SessionConfig {
    /// Minimal configuration for an endpoint with all defaults
    pub fn for_endpoint(url: &str) -> Self {
        Self {
            broker: BrokerSection {
                url: url.to_string(),
                host: None,
                credential_env: None,
                auth_header: default_auth_header(),
                auth_scheme: default_auth_scheme(),
            },
            session: SessionSection::default(),
            heartbeat: HeartbeatSection::default(),
            reconnect: ReconnectSection::default(),
        }
    }

    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges and the endpoint URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.broker.url).map_err(|_| {
            ConfigError::InvalidConfig(format!("broker.url '{}' is not a URL", self.broker.url))
        })?;
        if !matches!(url.scheme(), "ws" | "wss" | "tcp") {
            return Err(ConfigError::InvalidConfig(format!(
                "broker.url scheme must be ws, wss or tcp, got '{}'",
                url.scheme()
            )));
        }
        if self.broker.auth_header.trim().is_empty() {
            return Err(invalid("broker.auth_header must not be empty"));
        }
        if self.broker.auth_header.contains([':', '\r', '\n', '\0']) {
            return Err(invalid("broker.auth_header must be a single header name"));
        }
        if self
            .broker
            .auth_scheme
            .as_deref()
            .is_some_and(|scheme| scheme.contains(['\r', '\n', '\0']))
        {
            return Err(invalid("broker.auth_scheme must not contain line breaks"));
        }

        let session = &self.session;
        if session.connect_timeout_ms == 0
            || session.receipt_timeout_ms == 0
            || session.receipt_sweep_interval_ms == 0
            || session.disconnect_timeout_ms == 0
            || session.credential_poll_interval_ms == 0
        {
            return Err(invalid("session timeouts and intervals must be greater than 0"));
        }
        if session.dedup_capacity == 0 || session.log_capacity == 0 {
            return Err(invalid("session capacities must be greater than 0"));
        }
        if session.max_frame_bytes < 64 {
            return Err(invalid("session.max_frame_bytes must be at least 64"));
        }

        if self.heartbeat.grace_multiplier < 1.0 || !self.heartbeat.grace_multiplier.is_finite() {
            return Err(invalid("heartbeat.grace_multiplier must be at least 1.0"));
        }

        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(invalid("reconnect.base_delay_ms must be greater than 0"));
        }
        if reconnect.base_delay_ms > reconnect.max_delay_ms {
            return Err(invalid(
                "reconnect.base_delay_ms must not exceed reconnect.max_delay_ms",
            ));
        }
        if reconnect.max_attempts == Some(0) {
            return Err(invalid(
                "reconnect.max_attempts must be greater than 0 or omitted for unlimited",
            ));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter_ratio) {
            return Err(invalid("reconnect.jitter_ratio must be within 0.0..=1.0"));
        }

        Ok(())
    }

    /// STOMP `host` header: explicit setting, else the URL host
    pub fn virtual_host(&self) -> String {
        if let Some(host) = &self.broker.host {
            return host.clone();
        }
        Url::parse(&self.broker.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Provider for the configured credential source, `None` when anonymous
    pub fn credential_provider(&self) -> Option<Arc<dyn CredentialProvider>> {
        self.broker
            .credential_env
            .as_ref()
            .map(|var| Arc::new(EnvCredential::new(var.clone())) as Arc<dyn CredentialProvider>)
    }

    /// Read the credential from the configured environment variable
    pub fn get_credential(&self) -> Result<Option<String>, ConfigError> {
        match &self.broker.credential_env {
            None => Ok(None),
            Some(name) => std::env::var(name)
                .map(Some)
                .map_err(|_| ConfigError::EnvVarNotFound(name.clone())),
        }
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidConfig(message.to_string())
}

use super::commands::Credentials;
use super::heartbeat::{DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL};
use crate::traits::{ExponentialBackoff, KnotError, OpenOptions, Result, MAX_BACKOFF_SECS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Standard secure WebSocket port
pub const DEFAULT_PORT: u16 = 443;

/// Default endpoint path
pub const DEFAULT_PATH: &str = "/ws";

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Ws,
    #[default]
    Wss,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Ws => f.write_str("ws"),
            Scheme::Wss => f.write_str("wss"),
        }
    }
}

/// Connection options for a client
///
/// Deserializable from YAML; every field except `hostname` has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    pub hostname: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    /// Ignored when `port` is 443, which always uses `wss`
    #[serde(default)]
    pub scheme: Scheme,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub token: String,

    /// WebSocket subprotocol advertised during the handshake
    #[serde(default)]
    pub protocol_version: Option<String>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    #[serde(default = "default_keepalive_idle_timeout_ms")]
    pub keepalive_idle_timeout_ms: u64,

    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: f64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_keepalive_interval_ms() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL.as_millis() as u64
}

fn default_keepalive_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_millis() as u64
}

fn default_backoff_initial_secs() -> f64 {
    1.0
}

fn default_backoff_max_secs() -> f64 {
    32.0
}

impl ConnectionOptions {
    /// Options for `hostname` with every other field defaulted
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: default_port(),
            path: default_path(),
            scheme: Scheme::default(),
            id: String::new(),
            token: String::new(),
            protocol_version: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            keepalive_idle_timeout_ms: default_keepalive_idle_timeout_ms(),
            backoff_initial_secs: default_backoff_initial_secs(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_credentials(mut self, id: impl Into<String>, token: impl Into<String>) -> Self {
        self.id = id.into();
        self.token = token.into();
        self
    }

    /// Scheme actually used, accounting for the secure-port override
    pub fn effective_scheme(&self) -> Scheme {
        if self.port == DEFAULT_PORT {
            Scheme::Wss
        } else {
            self.scheme
        }
    }

    /// Build the endpoint URI
    pub fn uri(&self) -> Result<Url> {
        let uri = format!(
            "{}://{}:{}{}",
            self.effective_scheme(),
            self.hostname,
            self.port,
            self.path
        );
        Url::parse(&uri).map_err(|e| KnotError::Configuration(format!("invalid uri {}: {}", uri, e)))
    }

    /// Snapshot of the credential pair
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.id.clone(), self.token.clone())
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            protocol: self.protocol_version.clone(),
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn keepalive_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_idle_timeout_ms)
    }

    /// Jittered backoff built from the configured bounds
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.backoff_initial_secs, self.backoff_max_secs)
    }

    /// Validate option values
    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(KnotError::Configuration("hostname must not be empty".into()));
        }
        if !self.path.starts_with('/') {
            return Err(KnotError::Configuration(format!(
                "path must start with '/': {}",
                self.path
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(KnotError::Configuration(
                "connect_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.keepalive_interval_ms == 0 || self.keepalive_idle_timeout_ms == 0 {
            return Err(KnotError::Configuration(
                "keepalive intervals must be greater than 0".into(),
            ));
        }
        if !(self.backoff_initial_secs > 0.0) || self.backoff_max_secs < self.backoff_initial_secs {
            return Err(KnotError::Configuration(
                "backoff must satisfy 0 < backoff_initial_secs <= backoff_max_secs".into(),
            ));
        }
        if !self.backoff_max_secs.is_finite() || self.backoff_max_secs > MAX_BACKOFF_SECS {
            return Err(KnotError::Configuration(format!(
                "backoff_max_secs must not exceed {}",
                MAX_BACKOFF_SECS
            )));
        }
        self.uri().map(|_| ())
    }
}

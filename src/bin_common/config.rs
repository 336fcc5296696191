//! Client configuration
//!
//! YAML file plus `.env`/environment overrides for the credential pair and
//! hostname.

use knot_socket::ConnectionOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment overrides applied after the YAML is parsed
const ENV_ID: &str = "KNOT_ID";
const ENV_TOKEN: &str = "KNOT_TOKEN";
const ENV_HOSTNAME: &str = "KNOT_HOSTNAME";

/// Configuration for the `knot_client` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub connection: ConnectionOptions,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    /// Load configuration from YAML file
    ///
    /// `.env` is read first so its values take part in the overrides.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse without touching the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override credentials and hostname from the environment if present
    pub fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(ENV_ID) {
            info!("Overriding device id from environment variable");
            self.connection.id = id;
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            info!("Overriding token from environment variable");
            self.connection.token = token;
        }
        if let Ok(hostname) = std::env::var(ENV_HOSTNAME) {
            info!("Overriding hostname from environment variable");
            self.connection.hostname = hostname;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.connection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        // Credentials usually come from .env rather than the YAML
        if self.connection.id.is_empty() {
            return Err(ConfigError::EnvVarMissing(ENV_ID.to_string()));
        }
        if self.connection.token.is_empty() {
            return Err(ConfigError::EnvVarMissing(ENV_TOKEN.to_string()));
        }

        Ok(())
    }

    /// Log the loaded configuration, without the token
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Log level: {}", self.log_level);
        match self.connection.uri() {
            Ok(uri) => info!("  URI: {}", uri),
            Err(e) => info!("  URI: invalid ({})", e),
        }
        info!("  Device id: {}", self.connection.id);
        if let Some(ref protocol) = self.connection.protocol_version {
            info!("  Protocol: {}", protocol);
        }
    }
}

use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};
use thiserror::Error;

use crate::core::address::AddressFullPolicy;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Root directory holding one page directory per address.
    pub data_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: "pagemq-data".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PagingConfig {
    pub page_size_bytes: u64,
    /// In-memory bytes per address before the full policy applies. Zero disables the limit.
    pub max_size_bytes: u64,
    pub address_full_policy: AddressFullPolicy,
    pub sync_on_write: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: 5120,
            max_size_bytes: 10240,
            address_full_policy: AddressFullPolicy::Page,
            sync_on_write: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub redelivery_timeout_ms: u64,
    pub default_receive_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redelivery_timeout_ms: 30_000,
            default_receive_timeout_ms: 5_000,
        }
    }
}

impl QueueConfig {
    pub fn redelivery_timeout(&self) -> Duration {
        Duration::from_millis(self.redelivery_timeout_ms)
    }

    pub fn default_receive_timeout(&self) -> Duration {
        Duration::from_millis(self.default_receive_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paging: PagingConfig,
    pub queues: QueueConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("unsupported config: {0}")]
    Unsupported(String),
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load configuration from an optional file path and environment variables.
    ///
    /// Precedence: built-in defaults, then the file, then environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let env_path = env::var("PAGEMQ_CONFIG").ok();
        let effective_path = path.map(|s| s.to_string()).or(env_path);

        let mut config = match effective_path {
            Some(p) => Self::load_file(p)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("PAGEMQ_DATA_DIR") {
            self.server.data_dir = v;
        }

        if let Ok(v) = env::var("PAGEMQ_PAGE_SIZE_BYTES") {
            self.paging.page_size_bytes = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("PAGEMQ_PAGE_SIZE_BYTES: {e}")))?;
        }

        if let Ok(v) = env::var("PAGEMQ_MAX_SIZE_BYTES") {
            self.paging.max_size_bytes = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("PAGEMQ_MAX_SIZE_BYTES: {e}")))?;
        }

        if let Ok(v) = env::var("PAGEMQ_ADDRESS_FULL_POLICY") {
            self.paging.address_full_policy = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("PAGEMQ_ADDRESS_FULL_POLICY: {e}")))?;
        }

        if let Ok(v) = env::var("PAGEMQ_REDELIVERY_TIMEOUT_MS") {
            self.queues.redelivery_timeout_ms = v
                .parse()
                .map_err(|e| ConfigError::Parse(format!("PAGEMQ_REDELIVERY_TIMEOUT_MS: {e}")))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.data_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("server.data_dir must not be empty".into()));
        }
        if self.paging.page_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "paging.page_size_bytes must be greater than zero".into(),
            ));
        }
        if self.queues.redelivery_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "queues.redelivery_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config = Config::from_toml_str(&raw)?;
    config.validate()?;
    Ok(config)
}

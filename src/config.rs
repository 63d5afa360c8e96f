//! Engine configuration
//!
//! Loaded from TOML with the following discovery order:
//! 1. An explicit path passed by the caller
//! 2. `./datagate.toml` in the current directory
//! 3. Built-in defaults
//!
//! Durations are expressed in milliseconds.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// File name looked up in the current directory when no path is given
pub const CONFIG_FILE_NAME: &str = "datagate.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct EngineConfig {
    /// Keyspace used when a builder is not given one explicitly
    pub keyspace: String,
    pub read: RetryConfig,
    pub write: RetryConfig,
    pub ddl: RetryConfig,
    pub embedding: EmbeddingConfig,
}

/// Fixed-delay retry settings for one class of task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn new(max_retries: u32, delay_ms: u64) -> Self {
        Self {
            max_retries,
            delay_ms,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field,
                reason: "max_retries must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingConfig {
    pub retry: RetryConfig,
    /// Texts sent to the provider per request
    pub batch_size: usize,
    /// Inputs longer than this many characters are truncated
    pub max_input_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            keyspace: "default_keyspace".to_string(),
            read: RetryConfig::new(3, 100),
            write: RetryConfig::new(3, 100),
            ddl: RetryConfig::new(2, 1000),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::new(3, 500),
            batch_size: 16,
            max_input_chars: 8192,
        }
    }
}

/// File layout of [`EngineConfig`]. Every key is optional and an unset key
/// takes the default of its own section, so `[ddl]` with only `max_retries`
/// keeps the DDL delay rather than the read delay.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    keyspace: Option<String>,
    read: RetrySection,
    write: RetrySection,
    ddl: RetrySection,
    embedding: EmbeddingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RetrySection {
    max_retries: Option<u32>,
    delay_ms: Option<u64>,
}

impl RetrySection {
    fn over(self, defaults: RetryConfig) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            delay_ms: self.delay_ms.unwrap_or(defaults.delay_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmbeddingSection {
    retry: RetrySection,
    batch_size: Option<usize>,
    max_input_chars: Option<usize>,
}

impl From<ConfigFile> for EngineConfig {
    fn from(file: ConfigFile) -> Self {
        let defaults = EngineConfig::default();
        let embedding = defaults.embedding;
        Self {
            keyspace: file.keyspace.unwrap_or(defaults.keyspace),
            read: file.read.over(defaults.read),
            write: file.write.over(defaults.write),
            ddl: file.ddl.over(defaults.ddl),
            embedding: EmbeddingConfig {
                retry: file.embedding.retry.over(embedding.retry),
                batch_size: file.embedding.batch_size.unwrap_or(embedding.batch_size),
                max_input_chars: file
                    .embedding
                    .max_input_chars
                    .unwrap_or(embedding.max_input_chars),
            },
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load using the discovery order described in the module docs
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {:?}", path);
            return Self::from_toml_file(path);
        }

        let candidate = PathBuf::from(CONFIG_FILE_NAME);
        debug!("Checking for config file: {:?}", candidate);
        if candidate.is_file() {
            info!("Loading configuration from: {:?}", candidate);
            return Self::from_toml_file(candidate);
        }

        info!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.read.validate("read.max_retries")?;
        self.write.validate("write.max_retries")?;
        self.ddl.validate("ddl.max_retries")?;
        self.embedding.retry.validate("embedding.retry.max_retries")?;
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding.batch_size",
                reason: "batch_size must be positive".to_string(),
            });
        }
        if self.keyspace.is_empty() {
            return Err(ConfigError::Invalid {
                field: "keyspace",
                reason: "keyspace must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

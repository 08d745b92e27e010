//! Configuration loading and typed config structures for the relay.
//!
//! The configuration lives in `relay-config.yaml` next to the binary.
//! Every field has a default, so an absent file or an empty document
//! yields a working local setup.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override held an unusable value.
    #[error("invalid value for {name} ({value}): {reason}")]
    InvalidOverride {
        /// Name of the environment variable.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level relay configuration.
///
/// Mirrors the structure of `relay-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelayConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable store selection and connection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Match engine ingestion over NATS.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Registry tuning.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Archival retry policy.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `DRAGONFLY_URL` overrides `storage.dragonfly_url`
    /// - `NATS_URL` overrides `ingest.nats_url`
    /// - `RELAY_PORT` overrides `server.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidOverride`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides from a variable lookup (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] if `RELAY_PORT` is not a
    /// valid port number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DRAGONFLY_URL") {
            self.storage.dragonfly_url = val;
        }
        if let Some(val) = lookup("NATS_URL") {
            self.ingest.nats_url = val;
        }
        if let Some(val) = lookup("RELAY_PORT") {
            self.server.port = val.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidOverride {
                    name: "RELAY_PORT",
                    value: val.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// The host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// The TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which durable store backs archived matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// `Dragonfly` (or any Redis-compatible server).
    #[default]
    Dragonfly,
    /// In-process map; archives are lost on exit.
    Memory,
}

/// Durable store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StorageBackend,

    /// `Dragonfly` (Redis-compatible) URL.
    #[serde(default = "default_dragonfly_url")]
    pub dragonfly_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dragonfly_url: default_dragonfly_url(),
        }
    }
}

/// NATS ingestion configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IngestConfig {
    /// Whether to subscribe to match engine subjects at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subject prefix; registrations arrive on `{prefix}.register` and
    /// events on `{prefix}.{game_id}.events`.
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nats_url: default_nats_url(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

/// Registry tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Capacity of each observer's delivery-queue. An observer whose queue
    /// is full when an event arrives is disconnected.
    #[serde(default = "default_observer_queue_capacity")]
    pub observer_queue_capacity: usize,

    /// Drop a match from memory once its archive is fully written.
    #[serde(default = "default_true")]
    pub evict_on_archive: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            observer_queue_capacity: default_observer_queue_capacity(),
            evict_on_archive: true,
        }
    }
}

/// Archival retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArchiveConfig {
    /// Write attempts made while handling the terminal event.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on each further attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the delay between attempts.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Period of the background sweep over archives still pending.
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

impl ArchiveConfig {
    /// Period of the background retry sweep, never shorter than a second.
    pub const fn retry_interval(&self) -> Duration {
        if self.retry_interval_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.retry_interval_secs)
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            retry_interval_secs: default_retry_interval_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8080
}

fn default_dragonfly_url() -> String {
    String::from("redis://localhost:6379")
}

fn default_nats_url() -> String {
    String::from("nats://localhost:4222")
}

fn default_subject_prefix() -> String {
    String::from("relay.games")
}

const fn default_true() -> bool {
    true
}

const fn default_observer_queue_capacity() -> usize {
    100
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    5_000
}

const fn default_retry_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    String::from("info")
}

//! Configuration loading and XDG path helpers.
//!
//! Sources, lowest precedence first: built-in defaults,
//! `/etc/shotit/settings.toml`, `$XDG_CONFIG_HOME/shotit/settings.toml`,
//! `./config/settings.toml`, the file named by `SHOTIT_CONFIG_FILE`, and
//! `SHOTIT__SECTION__KEY` environment variables.

use std::env;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use shotit_store::StoreConfig;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE, DEFAULT_COLLECTION, DEFAULT_NORMALIZE_CHUNK,
    DEFAULT_RECONNECT_DELAY_MS, DEFAULT_RETRY_DELAY_MS, DEFAULT_VECTOR_DIM, DEFAULT_WORKER_TYPE,
};
use crate::services::maintenance::FlushSchedule;

const LOCAL_CONFIG_FILE: &str = "config/settings.toml";
const SETTINGS_FILE_NAME: &str = "settings.toml";
const ETC_DIR_ENV: &str = "SHOTIT_ETC_CONFIG_DIR";
const CONFIG_FILE_ENV: &str = "SHOTIT_CONFIG_FILE";
const ENV_PREFIX: &str = "SHOTIT";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Media API that serves hash artifacts and hosts the job channel.
#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "MediaConfig::default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "MediaConfig::default_request_timeout_secs")]
    pub request_timeout_secs: NonZeroU64,
}

impl MediaConfig {
    fn default_api_url() -> String {
        "http://127.0.0.1:3311".to_string()
    }

    fn default_request_timeout_secs() -> NonZeroU64 {
        NonZeroU64::new(120).expect("default request timeout must be non-zero")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.get())
    }

    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_url: Self::default_api_url(),
            secret: String::new(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "WorkerConfig::default_collection")]
    pub collection: String,
    #[serde(default = "WorkerConfig::default_dimension")]
    pub dimension: usize,
    #[serde(default = "WorkerConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "WorkerConfig::default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "WorkerConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "WorkerConfig::default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "WorkerConfig::default_worker_type")]
    pub worker_type: String,
    #[serde(default = "WorkerConfig::default_normalize_chunk")]
    pub normalize_chunk: usize,
}

impl WorkerConfig {
    fn default_collection() -> String {
        DEFAULT_COLLECTION.to_string()
    }

    fn default_dimension() -> usize {
        DEFAULT_VECTOR_DIM
    }

    fn default_batch_size() -> usize {
        DEFAULT_BATCH_SIZE
    }

    fn default_batch_pause_ms() -> u64 {
        DEFAULT_BATCH_PAUSE_MS
    }

    fn default_retry_delay_ms() -> u64 {
        DEFAULT_RETRY_DELAY_MS
    }

    fn default_reconnect_delay_ms() -> u64 {
        DEFAULT_RECONNECT_DELAY_MS
    }

    fn default_worker_type() -> String {
        DEFAULT_WORKER_TYPE.to_string()
    }

    fn default_normalize_chunk() -> usize {
        DEFAULT_NORMALIZE_CHUNK
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            collection: Self::default_collection(),
            dimension: Self::default_dimension(),
            batch_size: Self::default_batch_size(),
            batch_pause_ms: Self::default_batch_pause_ms(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            reconnect_delay_ms: Self::default_reconnect_delay_ms(),
            worker_type: Self::default_worker_type(),
            normalize_chunk: Self::default_normalize_chunk(),
        }
    }
}

/// Daily durability flush, independent of the flushes done after each load.
#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "MaintenanceConfig::default_enabled")]
    pub enabled: bool,
    /// UTC wall-clock time, `HH:MM`.
    #[serde(default = "MaintenanceConfig::default_flush_at")]
    pub flush_at: String,
}

impl MaintenanceConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_flush_at() -> String {
        "00:00".to_string()
    }

    pub fn schedule(&self) -> Result<FlushSchedule, AppConfigError> {
        FlushSchedule::parse(&self.flush_at).map_err(|err| AppConfigError::Invalid(err.to_string()))
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            flush_at: Self::default_flush_at(),
        }
    }
}

/// Health endpoint settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "ServerConfig::default_listen_addr")]
    pub listen_addr: String,
}

impl ServerConfig {
    fn default_listen_addr() -> String {
        "127.0.0.1:8080".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: Self::default_listen_addr(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AppConfigError> {
        let invalid = |msg: &str| Err(AppConfigError::Invalid(msg.to_string()));
        if self.media.api_url.trim().is_empty() {
            return invalid("media.api_url must not be empty");
        }
        if self.store.url.trim().is_empty() {
            return invalid("store.url must not be empty");
        }
        if self.worker.collection.trim().is_empty() {
            return invalid("worker.collection must not be empty");
        }
        if self.worker.dimension == 0 {
            return invalid("worker.dimension must be greater than zero");
        }
        if self.worker.batch_size == 0 {
            return invalid("worker.batch_size must be greater than zero");
        }
        if self.worker.normalize_chunk == 0 {
            return invalid("worker.normalize_chunk must be greater than zero");
        }
        if self.worker.worker_type.trim().is_empty() {
            return invalid("worker.worker_type must not be empty");
        }
        self.maintenance.schedule()?;
        Ok(())
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let mut builder = Config::builder();
    for path in candidate_files() {
        builder = builder.add_source(File::from(path).required(false));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "shotit", "shotit")
}

/// Config files in ascending precedence.
fn candidate_files() -> Vec<PathBuf> {
    let etc_root = env::var_os(ETC_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc"));
    let mut files = vec![etc_root.join("shotit").join(SETTINGS_FILE_NAME)];
    if let Some(dirs) = project_dirs() {
        files.push(dirs.config_dir().join(SETTINGS_FILE_NAME));
    }
    files.push(PathBuf::from(LOCAL_CONFIG_FILE));
    if let Some(path) = env::var_os(CONFIG_FILE_ENV) {
        files.push(PathBuf::from(path));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        cfg.validate().expect("defaults validate");
        assert_eq!(cfg.worker.collection, "shotit");
        assert_eq!(cfg.worker.dimension, 100);
        assert_eq!(cfg.worker.batch_size, 10_000);
        assert_eq!(cfg.worker.retry_delay(), Duration::from_secs(30));
        assert_eq!(cfg.worker.reconnect_delay(), Duration::from_secs(5));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.worker.dimension = 0;
        assert!(matches!(cfg.validate(), Err(AppConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_flush_time_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.maintenance.flush_at = "25:99".to_string();
        assert!(matches!(cfg.validate(), Err(AppConfigError::Invalid(_))));
    }
}

use std::num::NonZeroU64;
use std::time::Duration;

use serde::Deserialize;

/// Connection settings for the vector store REST endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_url")]
    pub url: String,
    /// Bearer token (`user:password` or API key). Omitted when empty.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "StoreConfig::default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
}

impl StoreConfig {
    fn default_url() -> String {
        "http://127.0.0.1:19530".to_string()
    }

    fn default_timeout_secs() -> NonZeroU64 {
        NonZeroU64::new(60).expect("default store timeout must be non-zero")
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.get())
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            token: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

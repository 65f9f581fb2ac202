use serde::{Deserialize, Serialize};
use std::time::Duration;
use storage::S3Options;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `s3` or `memory`.
    pub provider: String,
    pub s3: S3Options,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: "s3".to_string(),
            s3: S3Options::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// `http` or `noop`.
    pub provider: String,
    pub api_uri_base: String,
    pub api_key: Option<String>,
    pub api_version: String,
    /// `azure` or `simple`; detected from `api_uri_base` when unset.
    pub flavor: Option<String>,
    pub api_token: Option<String>,
    pub user_token: Option<String>,
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: "http".to_string(),
            api_uri_base: String::new(),
            api_key: None,
            api_version: "v2.1".to_string(),
            flavor: None,
            api_token: None,
            user_token: None,
            timeout_secs: 120,
            poll_interval_ms: 1500,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Loads the config file (or `config/default` when present) and overlays
/// `LABELER__<SECTION>__<KEY>` environment variables.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(config::Environment::with_prefix("LABELER").separator("__"));
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

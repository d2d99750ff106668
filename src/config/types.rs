//! Configuration types and structures.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration source priority (higher = more important), used only to
/// annotate where a value came from when debugging a merged config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ConfigSource {
    #[default]
    Default = 0,
    File = 1,
    Environment = 2,
    CommandLine = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8731,
        }
    }
}

/// Defaults for the resumable downloader (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    pub concurrency: usize,
    pub max_retries_per_shard: u32,
    pub backoff_initial_secs: u64,
    pub backoff_cap_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries_per_shard: 3,
            backoff_initial_secs: 1,
            backoff_cap_secs: 30,
        }
    }
}

/// Device/tier override (spec §4.4). `None` fields are inferred by the
/// capability probe; a config file may pin them for testing or to force a
/// lower tier than the probe would pick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub force_tier: Option<u8>,
    pub power_preference: Option<String>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub models_dir: PathBuf,
    pub server: ServerConfig,
    pub downloader: DownloaderConfig,
    pub device: DeviceConfig,
    #[serde(skip)]
    pub source: ConfigSource,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        let home = home::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            models_dir: home.join(".doppler").join("models"),
            server: ServerConfig::default(),
            downloader: DownloaderConfig::default(),
            device: DeviceConfig::default(),
            source: ConfigSource::Default,
        }
    }
}

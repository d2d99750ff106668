//! Configuration validation.

use super::types::{ApplicationConfig, DownloaderConfig, ServerConfig};

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate_server(config: &ServerConfig) -> Result<(), String> {
        if config.port == 0 {
            return Err("port cannot be 0".to_string());
        }
        if config.host.is_empty() {
            return Err("host cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn validate_downloader(config: &DownloaderConfig) -> Result<(), String> {
        if config.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if config.backoff_cap_secs < config.backoff_initial_secs {
            return Err("backoff_cap_secs must be >= backoff_initial_secs".to_string());
        }
        Ok(())
    }

    pub fn validate_all(config: &ApplicationConfig) -> Result<(), String> {
        Self::validate_server(&config.server)?;
        Self::validate_downloader(&config.downloader)?;
        if let Some(tier) = config.device.force_tier {
            if !(1..=3).contains(&tier) {
                return Err("force_tier must be 1, 2, or 3".to_string());
            }
        }
        Ok(())
    }
}

//! Configuration loading: defaults → JSON file → environment.

use super::types::ApplicationConfig;
use super::validator::ConfigValidator;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `~/.doppler/config.json`, falling back to defaults if the
    /// file does not exist.
    pub fn load() -> Result<ApplicationConfig, String> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_json(&path)
        } else {
            Ok(ApplicationConfig::default())
        }
    }

    pub fn load_json(path: &Path) -> Result<ApplicationConfig, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;
        let mut config: ApplicationConfig =
            serde_json::from_str(&content).map_err(|e| format!("failed to parse json: {e}"))?;
        config.source = super::types::ConfigSource::File;
        Self::apply_env(&mut config);
        ConfigValidator::validate_all(&config)?;
        Ok(config)
    }

    /// Environment overrides take priority over file values (spec: ambient
    /// config layering, same three-tier order as the teacher's
    /// `ConfigSource` ranking).
    fn apply_env(config: &mut ApplicationConfig) {
        if let Ok(port) = std::env::var("DOPPLER_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
                config.source = super::types::ConfigSource::Environment;
            }
        }
        if let Ok(dir) = std::env::var("DOPPLER_MODELS_DIR") {
            config.models_dir = PathBuf::from(dir);
            config.source = super::types::ConfigSource::Environment;
        }
    }

    fn default_path() -> Result<PathBuf, String> {
        let home = home::home_dir().ok_or_else(|| "could not determine home directory".to_string())?;
        Ok(home.join(".doppler").join("config.json"))
    }
}

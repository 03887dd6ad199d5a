use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub target: String,
    /// Time between echo requests.
    pub interval_ms: u64,
    /// How long one echo request waits for its reply.
    pub timeout_ms: u64,
    pub payload_size: usize,
    pub green_threshold: u64,
    pub yellow_threshold: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target: "google.com".to_string(),
            interval_ms: 1000,
            timeout_ms: 5000,
            payload_size: 24,
            green_threshold: 100,
            yellow_threshold: 200,
        }
    }
}

impl AppConfig {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(Error::ConfigDir)?
            .join("PacketLossRecorder");

        fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("config.json"))
    }

    /// Loads the user's config, falling back to defaults on any problem.
    pub fn load() -> Self {
        match Self::get_config_path() {
            Ok(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("{} ({}), using defaults", e.report(), path.display());
                AppConfig::default()
            }),
            Ok(_) => AppConfig::default(),
            Err(e) => {
                log::warn!("{}, using defaults", e.report());
                AppConfig::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::get_config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig {
            target: "192.0.2.7".into(),
            interval_ms: 500,
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "target": "example.org" }"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.target, "example.org");
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        let error = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(error, Error::ConfigFormat(_)));
        assert!(error.report().starts_with("Error reading config: config format"));
    }
}

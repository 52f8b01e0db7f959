use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::errors::*;
use crate::types::*;

/// Contents of `hb-config.json`.  Every key is optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub sync_config: Option<PathBuf>,
    #[serde(default)]
    pub forex: ForexSettings,
    #[serde(default)]
    pub ui: UiSettings,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ForexSettings {
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct UiSettings {
    #[serde(default)]
    pub close_command: Option<String>,
    #[serde(default)]
    pub open_command: Option<String>,
}

fn default_cache_ttl_hours() -> u64 {
    DEFAULT_FOREX_CACHE_TTL_HOURS
}

fn default_timeout() -> u64 {
    DEFAULT_FOREX_TIMEOUT_SECONDS
}

impl Default for ForexSettings {
    fn default() -> ForexSettings {
        ForexSettings {
            cache_ttl_hours: DEFAULT_FOREX_CACHE_TTL_HOURS,
            timeout: DEFAULT_FOREX_TIMEOUT_SECONDS,
        }
    }
}

impl ForexSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Settings {
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No config file at {}; using defaults", path.display());
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(path)
            .chain_err(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .chain_err(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn base_currency(&self) -> Result<Option<CurrencyCode>> {
        self.base_currency
            .as_ref()
            .filter(|code| !code.trim().is_empty())
            .map(|code| CurrencyCode::from_str(code))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("hb-config.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.forex.cache_ttl_hours, 1);
        assert_eq!(settings.forex.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb-config.json");
        fs::write(
            &path,
            r#"{"db_path": "/data/homebudget.db", "base_currency": "sgd",
                "forex": {"cache_ttl_hours": 6},
                "ui": {"close_command": "pkill HomeBudget"}}"#,
        )
        .unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.db_path, Some(PathBuf::from("/data/homebudget.db")));
        assert_eq!(
            settings.base_currency().unwrap(),
            Some(CurrencyCode::from_str("SGD").unwrap())
        );
        assert_eq!(settings.forex.cache_ttl_hours, 6);
        assert_eq!(settings.forex.timeout, 5);
        assert_eq!(settings.ui.close_command.as_deref(), Some("pkill HomeBudget"));
        assert_eq!(settings.ui.open_command, None);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb-config.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}

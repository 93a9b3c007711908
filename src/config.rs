//! Configuration file loading and data directory resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

pub const CONFIG_ENV: &str = "ILPTRACK_CONFIG";
pub const HOME_ENV: &str = "ILPTRACK_HOME";
pub const LOG_ENV: &str = "ILPTRACK_LOG";
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub log_level: Option<String>,
}

impl Config {
    /// Loads the config file named by `explicit` or `ILPTRACK_CONFIG`, falling
    /// back to `<config dir>/ilptrack/config.toml`. Only an explicitly named
    /// file is required to exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Self::from_file(Path::new(&path));
            }
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::parse(&raw)
            .map_err(|err| AppError::Config(format!("{}: {err}", path.display())))
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Data directory priority: command line, `ILPTRACK_HOME`, config file,
    /// platform default.
    pub fn resolve_data_dir(&self, cli_arg: Option<&Path>) -> Result<PathBuf, AppError> {
        if let Some(path) = cli_arg {
            return non_empty_path(path.to_path_buf(), "--data-dir");
        }
        if let Ok(path) = std::env::var(HOME_ENV) {
            return non_empty_path(PathBuf::from(path), HOME_ENV);
        }
        if let Some(path) = &self.data_dir {
            return non_empty_path(path.clone(), "data_dir");
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("ilptrack"))
            .ok_or_else(|| {
                AppError::Config(format!(
                    "unable to resolve a data directory; set {HOME_ENV} or --data-dir"
                ))
            })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ilptrack").join("config.toml"))
}

fn non_empty_path(path: PathBuf, source: &str) -> Result<PathBuf, AppError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(AppError::Config(format!("{source} is empty")));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_all_keys() {
        let config = Config::parse(
            "data_dir = \"/var/lib/ilptrack\"\ndebounce_ms = 50\nlog_level = \"debug\"\n",
        )
        .expect("parse");
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/ilptrack")));
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn missing_keys_use_defaults() {
        let config = Config::parse("").expect("parse");
        assert_eq!(config.debounce(), Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.log_level(), DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn rejects_unknown_value_types() {
        assert!(Config::parse("debounce_ms = \"soon\"").is_err());
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = TempDir::new().expect("temp dir");
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let path = dir.path().join("config.toml");
        fs::write(&path, "debounce_ms = 10").expect("write config");
        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.debounce(), Duration::from_millis(10));
    }

    #[test]
    fn cli_data_dir_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/from/config")),
            ..Default::default()
        };
        let resolved = config
            .resolve_data_dir(Some(Path::new("/from/cli")))
            .expect("resolve");
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const CONFIG_DIR_ENV: &str = "DBCHAT_CONFIG_DIR";
pub const API_URL_ENV: &str = "DBCHAT_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub default_connection_string: Option<String>,
    #[serde(default)]
    pub remember_connection: bool,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            default_connection_string: None,
            remember_connection: false,
            log_dir: None,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup(API_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.api_base_url = api_url.trim().to_string();
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to create config directory at {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {source}")]
    Serialize {
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
    config: ClientConfig,
}

impl FileConfigStore {
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                config: ClientConfig::default(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                config: ClientConfig::default(),
            });
        }

        let config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        Ok(Self { path, config })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stored config with environment overrides applied. Overrides are never persisted.
    #[must_use]
    pub fn effective_config(&self) -> ClientConfig {
        let mut config = self.config.clone();
        config.apply_env_overrides();
        config
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        if let Some(log_dir) = &self.config.log_dir {
            return log_dir.clone();
        }
        self.path
            .parent()
            .map_or_else(|| PathBuf::from("logs"), |parent| parent.join("logs"))
    }

    pub fn remember_connection_string(&mut self, raw_connection_string: &str) -> bool {
        if !self.config.remember_connection {
            return false;
        }
        if self.config.default_connection_string.as_deref() == Some(raw_connection_string) {
            return false;
        }
        self.config.default_connection_string = Some(raw_connection_string.to_string());
        true
    }

    pub fn persist(&self) -> Result<(), ConfigError> {
        if let Some(parent_dir) = self.path.parent() {
            fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
                path: parent_dir.to_path_buf(),
                source,
            })?;
        }

        let rendered = toml::to_string_pretty(&self.config)
            .map_err(|source| ConfigError::Serialize { source })?;

        fs::write(&self.path, rendered).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base_dir = if let Some(custom) = env::var_os(CONFIG_DIR_ENV) {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ConfigError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ConfigError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("dbchat").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::{ClientConfig, FileConfigStore, API_URL_ENV, DEFAULT_API_BASE_URL};

    fn temp_config_path(temp_dir: &TempDir) -> PathBuf {
        temp_dir.path().join("config.toml")
    }

    #[test]
    fn missing_config_file_loads_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let store =
            FileConfigStore::load_from_path(temp_config_path(&temp_dir)).expect("failed to load");

        assert_eq!(store.config(), &ClientConfig::default());
        assert_eq!(store.config().api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(store.config().request_timeout().as_secs(), 120);
        assert_eq!(store.log_dir(), temp_dir.path().join("logs"));
    }

    #[test]
    fn partial_config_fills_remaining_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_config_path(&temp_dir);
        std::fs::write(
            &path,
            "api_base_url = \"http://agent.internal:9000/api\"\nlog_dir = \"/var/log/dbchat\"\n",
        )
        .expect("failed to write config");

        let store = FileConfigStore::load_from_path(&path).expect("failed to load");
        assert_eq!(store.config().api_base_url, "http://agent.internal:9000/api");
        assert_eq!(store.config().request_timeout_secs, 120);
        assert!(!store.config().remember_connection);
        assert_eq!(store.log_dir(), PathBuf::from("/var/log/dbchat"));
    }

    #[test]
    fn invalid_config_reports_parse_error() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_config_path(&temp_dir);
        std::fs::write(&path, "request_timeout_secs = \"soon\"").expect("failed to write config");

        let err = FileConfigStore::load_from_path(&path).expect_err("parse should fail");
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn remembered_connection_round_trips_only_when_enabled() {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let path = temp_config_path(&temp_dir);

        let mut store = FileConfigStore::load_from_path(&path).expect("failed to load");
        assert!(!store.remember_connection_string("sqlite:///tmp/a.db"));

        std::fs::write(&path, "remember_connection = true\n").expect("failed to write config");
        let mut store = FileConfigStore::load_from_path(&path).expect("failed to reload");
        assert!(store.remember_connection_string("sqlite:///tmp/a.db"));
        assert!(!store.remember_connection_string("sqlite:///tmp/a.db"));
        store.persist().expect("failed to persist");

        let reloaded = FileConfigStore::load_from_path(&path).expect("failed to reload");
        assert_eq!(
            reloaded.config().default_connection_string.as_deref(),
            Some("sqlite:///tmp/a.db")
        );
    }

    #[test]
    fn env_override_replaces_api_url() {
        let mut config = ClientConfig::default();
        config.apply_overrides_from(|key| {
            (key == API_URL_ENV).then(|| " http://10.0.0.5:8000/api ".to_string())
        });
        assert_eq!(config.api_base_url, "http://10.0.0.5:8000/api");

        let mut config = ClientConfig::default();
        config.apply_overrides_from(|_| Some("   ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }
}

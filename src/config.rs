use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::openlibrary::OPENLIBRARY_URL;

pub const APP_DIR: &str = "ol-catalog";
pub const DB_ENV_VAR: &str = "OL_CATALOG_DB";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_openlibrary_url")]
    pub openlibrary_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> String {
    data_dir().join("catalog.db").to_string_lossy().to_string()
}

fn default_openlibrary_url() -> String {
    OPENLIBRARY_URL.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent_fetches() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            openlibrary_url: default_openlibrary_url(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl Config {
    /// Loads the user config, then applies `OL_CATALOG_DB` and `cli_db`.
    pub fn load(cli_db: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        let env_db = std::env::var(DB_ENV_VAR).ok();
        config.resolve_db_path(env_db.as_deref(), cli_db);
        Ok(config)
    }

    /// Reads the config at `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// A command line path wins over the environment, which wins over the
    /// config file. An empty environment value counts as unset.
    pub fn resolve_db_path(&mut self, env_db: Option<&str>, cli_db: Option<&Path>) {
        if let Some(path) = cli_db {
            self.db_path = path.to_string_lossy().to_string();
        } else if let Some(value) = env_db {
            self.apply_db_override(value);
        }
    }

    /// Absolute paths are taken as-is, relative ones live in the data directory.
    pub fn apply_db_override(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let path = Path::new(value);
        self.db_path = if path.is_absolute() {
            value.to_string()
        } else {
            data_dir().join(path).to_string_lossy().to_string()
        };
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(AppError::Config("db_path must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(AppError::Config("max_concurrent_fetches must be positive".to_string()));
        }
        Ok(())
    }
}

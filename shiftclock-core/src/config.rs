//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/shiftclock/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/shiftclock/` (~/.config/shiftclock/)
//! - Data: `$XDG_DATA_HOME/shiftclock/` (~/.local/share/shiftclock/)
//! - State/Logs: `$XDG_STATE_HOME/shiftclock/` (~/.local/state/shiftclock/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Store retry and conflict handling
    #[serde(default)]
    pub store: StoreConfig,

    /// Administrator access
    #[serde(default)]
    pub admin: AdminConfig,

    /// Task catalog override (optional)
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Retry and conflict settings for store calls
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First backoff delay in milliseconds (doubles per attempt)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How many times a task selection is recomputed after a concurrent update
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2000
}

fn default_conflict_retries() -> usize {
    2
}

/// Administrator access configuration
///
/// An identifier must be on `allow_list`; when `secret_sha256` is set the
/// shared secret must also hash to it.
#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    /// Identifiers allowed into admin mode
    #[serde(default = "default_admin_ids")]
    pub allow_list: Vec<String>,

    /// Hex SHA-256 digest of the shared admin secret (optional)
    pub secret_sha256: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            allow_list: default_admin_ids(),
            secret_sha256: None,
        }
    }
}

fn default_admin_ids() -> Vec<String> {
    vec![
        "ajaypal.sangha".to_string(),
        "abin.thomas".to_string(),
        "camilo.torres".to_string(),
    ]
}

impl AdminConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.allow_list.is_empty() {
            return Err(Error::Config(
                "admin.allow_list must name at least one administrator".to_string(),
            ));
        }
        if let Some(digest) = &self.secret_sha256 {
            let well_formed = digest.len() == 64 && hex::decode(digest).is_ok();
            if !well_formed {
                return Err(Error::Config(
                    "admin.secret_sha256 must be 64 hex characters".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Catalog override: replaces the built-in departments when non-empty
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogConfig {
    #[serde(default)]
    pub departments: Vec<DepartmentConfig>,
}

/// One department in a catalog override
#[derive(Debug, Deserialize, Clone)]
pub struct DepartmentConfig {
    pub name: String,
    pub tasks: Vec<String>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        self.admin.validate()?;
        crate::catalog::Catalog::from_config(&self.catalog.departments)?;
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/shiftclock/config.toml` (~/.config/shiftclock/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("shiftclock").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/shiftclock/` (~/.local/share/shiftclock/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("shiftclock")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/shiftclock/` (~/.local/state/shiftclock/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("shiftclock")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/shiftclock/data.db` (~/.local/share/shiftclock/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

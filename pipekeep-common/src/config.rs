//! Bootstrap configuration loading and database path resolution
//!
//! Runtime knobs (thresholds) live in the database `settings` table; the TOML
//! file only carries what is needed before the database is open.
//!
//! Database path priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PIPEKEEP_DATABASE` environment variable
//! 3. `database_path` in the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DATABASE_ENV_VAR: &str = "PIPEKEEP_DATABASE";
pub const CONFIG_ENV_VAR: &str = "PIPEKEEP_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Interface to bind the HTTP server to
    #[serde(default = "default_bind")]
    pub bind: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            bind: default_bind(),
            port: default_port(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load from an explicit file
    ///
    /// A missing file yields defaults (with a warning); a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from the resolved config location, or defaults if there is none
    pub fn load_resolved(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config file location available, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Config file location: CLI argument, then environment, then the user config dir
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("pipekeep").join("config.toml"))
}

/// Resolve the database file following the priority order in the module docs
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pipekeep"))
        .unwrap_or_else(|| PathBuf::from("./pipekeep_data"))
        .join("pipekeep.db")
}

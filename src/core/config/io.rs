use crate::core::config::data::HubConfig;
use directories::ProjectDirs;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        /// Path to the configuration file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file as valid TOML.
    Parse {
        /// Path to the configuration file with invalid TOML.
        path: PathBuf,
        /// The TOML deserialization error.
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config at {}: {}", path.display(), source)
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl HubConfig {
    /// Loads the config file if it exists; a missing file yields defaults.
    pub fn load_from_path(config_path: &Path) -> Result<HubConfig, ConfigError> {
        if !config_path.exists() {
            return Ok(HubConfig::default());
        }
        let contents = fs::read_to_string(config_path).map_err(|source| ConfigError::Read {
            path: config_path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })
    }

    /// Loads from `path` (or the default location) and applies environment
    /// overrides on top.
    pub fn load(path: Option<&Path>) -> Result<HubConfig, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => match Self::default_config_path() {
                Some(path) => Self::load_from_path(&path)?,
                None => HubConfig::default(),
            },
        };
        config.apply_env();
        Ok(config)
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "hubtools", "hubtools")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

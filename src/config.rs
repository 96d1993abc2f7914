use std::{io, path::Path, path::PathBuf, time::Duration};

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("couldn't write config file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("couldn't determine a config directory for this platform")]
    NoHome,
    #[error("queue_capacity must be at least 1")]
    EmptyQueue,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// slots in the request queue between input and dispatcher
    pub queue_capacity: usize,
    /// how often every display thread polls the registry
    pub display_tick_ms: u64,
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: buffer::DEFAULT_CAPACITY,
            display_tick_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't a valid config
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&config)?;
        config.validate()?;
        Ok(config)
    }

    /// a missing file is not an error, it just means defaults
    ///
    /// # Errors
    /// if the file exists but can't be read or parsed
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// # Errors
    /// if the directory or file can't be written
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, config).map_err(write_err)
    }

    /// # Errors
    /// if the platform has no notion of a config directory
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = directories::ProjectDirs::from("", "", "group_alarm")
            .ok_or(ConfigError::NoHome)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    /// # Errors
    /// if a value can't work at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::EmptyQueue);
        }
        Ok(())
    }

    #[must_use]
    pub const fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms)
    }

    /// unknown levels fall back to `info`
    #[must_use]
    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

//! CLI configuration
//!
//! Loaded from `--config`, else `<config dir>/unifleet/config.toml`. A missing
//! file means defaults.

use crate::error::{CliError, CliResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory holding composite state records
    pub state_dir: Option<PathBuf>,

    /// Pidfile written by `events`
    pub events_pidfile: Option<PathBuf>,

    /// Platform used by `--plat auto` and by services without a platform
    pub default_platform: Option<String>,

    /// Default poll granularity of `events`, in milliseconds
    pub poll_granularity_ms: u64,

    /// Default log level when neither RUST_LOG nor `--log-level` is set
    pub log_level: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            events_pidfile: None,
            default_platform: None,
            poll_granularity_ms: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load configuration from `path`, or from the default location.
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load_file(Path::new(path)),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn load_file(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("unifleet").join("config.toml"))
    }

    /// State directory: configured, else `<local data dir>/unifleet`.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("unifleet")
        })
    }

    /// Directory of the per-project composite state records
    pub fn compose_dir(&self) -> PathBuf {
        self.state_dir().join("compose")
    }

    pub fn events_pidfile(&self) -> PathBuf {
        self.events_pidfile
            .clone()
            .unwrap_or_else(|| self.state_dir().join("events.pid"))
    }

    pub fn poll_granularity(&self) -> Duration {
        Duration::from_millis(self.poll_granularity_ms)
    }
}

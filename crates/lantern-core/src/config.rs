//! Persistent configuration for lantern.
//!
//! Stores user settings in `~/.lantern/config.json` (or `$LANTERN_HOME/config.json`).
//! Everything has a built-in default, so a missing file is not an error; suite
//! files and command-line flags override what is stored here.
//!
//! # Example
//!
//! ```no_run
//! use lantern_core::config::LanternConfig;
//!
//! let config = LanternConfig::load().unwrap_or_default();
//! println!("WebDriver endpoint: {}", config.webdriver_url);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::ContextRetry;
use crate::policy::Policy;
use crate::runner::RunOptions;
use crate::webdriver::WebDriverConfig;

const CONFIG_FILENAME: &str = "config.json";

/// Environment variable that relocates the lantern directory.
pub const LANTERN_HOME_ENV: &str = "LANTERN_HOME";

/// Default Appium / WebDriver endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4723";

/// Returns the lantern state directory (`~/.lantern/` unless `LANTERN_HOME` is set).
///
/// Creates the directory if it doesn't exist. Falls back to `./.lantern` when
/// no home directory can be determined.
pub fn lantern_dir() -> PathBuf {
    let dir = match std::env::var_os(LANTERN_HOME_ENV) {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lantern"),
    };
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Errors reading or writing the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn default_wait_timeout_ms() -> u64 {
    crate::runner::DEFAULT_WAIT_TIMEOUT_MS
}

fn default_poll_interval_ms() -> u64 {
    crate::backend::DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_capabilities() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Persistent lantern configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanternConfig {
    /// WebDriver / Appium server URL.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Base URL that relative `navigate` targets are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Capabilities sent when creating a session (a JSON object).
    #[serde(default = "default_capabilities")]
    pub capabilities: serde_json::Value,

    /// Where screenshots are written. Defaults to `<lantern dir>/artifacts`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<PathBuf>,

    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub context_retry: ContextRetry,

    #[serde(default)]
    pub policy: Policy,
}

impl Default for LanternConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            base_url: None,
            capabilities: default_capabilities(),
            artifacts_dir: None,
            default_wait_timeout_ms: default_wait_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            context_retry: ContextRetry::default(),
            policy: Policy::default(),
        }
    }
}

impl LanternConfig {
    /// Path of the config file in the lantern directory.
    pub fn path() -> PathBuf {
        lantern_dir().join(CONFIG_FILENAME)
    }

    /// Load config from `~/.lantern/config.json`.
    ///
    /// Returns [`Default`] if the file does not exist. A file that exists but
    /// cannot be parsed is an error rather than being silently ignored.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path())
    }

    /// Load config from an explicit path, with the same missing-file rule as [`load`](Self::load).
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to `~/.lantern/config.json`.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts_dir
            .clone()
            .unwrap_or_else(|| lantern_dir().join("artifacts"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Connection settings for [`WebDriverBackend`](crate::webdriver::WebDriverBackend).
    pub fn webdriver(&self) -> WebDriverConfig {
        WebDriverConfig {
            webdriver_url: self.webdriver_url.clone(),
            base_url: self.base_url.clone(),
            capabilities: self.capabilities.clone(),
            artifacts_dir: self.artifacts_dir(),
            poll_interval: self.poll_interval(),
        }
    }

    /// Runner options derived from the stored defaults.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            wait_timeout: Duration::from_millis(self.default_wait_timeout_ms),
            context_retry: self.context_retry,
        }
    }
}

//! Configuration for the reload watcher.
//!
//! Layered configuration:
//! - Default values
//! - TOML configuration file (`.autoreload/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `AR_` and use double
//! underscores to separate nested levels:
//! - `AR_DEBOUNCE_MS=250` sets `debounce_ms`
//! - `AR_NOTIFY_LEVEL=warn` sets `notify_level`
//! - `AR_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::watcher::config::{DEFAULT_DEBOUNCE_MS, DEFAULT_REARM_GRACE_MS};
use crate::watcher::{NotifyLevel, PathFilter, WatchConfig, WatchError};

pub const CONFIG_DIR: &str = ".autoreload";
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Quiet period in milliseconds before a burst of changes reloads
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Delay in milliseconds between a reload and re-subscribing
    #[serde(default = "default_rearm_grace_ms")]
    pub rearm_grace_ms: u64,

    /// Show notifications at all
    #[serde(default = "default_true")]
    pub notify: bool,

    /// Lowest level that is shown
    #[serde(default = "default_notify_level")]
    pub notify_level: NotifyLevel,

    /// Paths matching any of these are never watched
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Start enabled
    #[serde(default = "default_true")]
    pub auto_enable: bool,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every module
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `autoreload = "debug"`
    #[serde(default)]
    pub modules: IndexMap<String, String>,
}

// Default value functions
fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_rearm_grace_ms() -> u64 {
    DEFAULT_REARM_GRACE_MS
}
fn default_true() -> bool {
    true
}
fn default_notify_level() -> NotifyLevel {
    NotifyLevel::Info
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            rearm_grace_ms: default_rearm_grace_ms(),
            notify: true,
            notify_level: default_notify_level(),
            ignore_patterns: Vec::new(),
            auto_enable: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: IndexMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honouring `AR_` variables
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name
            .merge(Env::prefixed("AR_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.autoreload` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Validate into the snapshot the watcher runs with
    pub fn watch_config(&self) -> Result<WatchConfig, WatchError> {
        if self.debounce_ms == 0 {
            return Err(WatchError::ConfigError {
                reason: "debounce_ms must be greater than zero".to_string(),
            });
        }

        Ok(WatchConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            rearm_grace: Duration::from_millis(self.rearm_grace_ms),
            notify: self.notify,
            notify_level: self.notify_level,
            filter: PathFilter::new(&self.ignore_patterns),
            auto_enable: self.auto_enable,
        })
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}

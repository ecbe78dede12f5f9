pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings};
pub use watcher::{
    Host, HostEvent, NotifyLevel, ReloadControl, ReloadWatcher, ResourceId, WatchConfig,
    WatchError, WatchEvent, WatchStatus,
};

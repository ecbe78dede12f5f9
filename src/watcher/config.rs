//! Validated, immutable options snapshot read by the controller.
//!
//! Built from [`crate::config::Settings`]; swapped wholesale on
//! reconfiguration and never mutated while handles are active.

use std::time::Duration;

use super::filter::PathFilter;
use super::host::NotifyLevel;

pub const DEFAULT_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_REARM_GRACE_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period after the last raw event before reloading.
    pub debounce: Duration,
    /// Pause between a reload and the fresh subscription.
    pub rearm_grace: Duration,
    /// Master switch for user notifications.
    pub notify: bool,
    /// Notifications below this level are dropped.
    pub notify_level: NotifyLevel,
    pub filter: PathFilter,
    /// Enable as soon as the controller starts running.
    pub auto_enable: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            rearm_grace: Duration::from_millis(DEFAULT_REARM_GRACE_MS),
            notify: true,
            notify_level: NotifyLevel::Info,
            filter: PathFilter::default(),
            auto_enable: true,
        }
    }
}

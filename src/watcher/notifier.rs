//! User notifications and the watch event broadcast.
//!
//! Every state change is broadcast as a [`WatchEvent`] to any number of
//! observers. A subset also becomes a user-facing notification, delivered to
//! the host only when notifications are on and the level reaches the
//! configured threshold.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

use super::config::WatchConfig;
use super::host::{Host, NotifyLevel, ResourceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    Enabled,
    Disabled,
    Watching { id: ResourceId, path: PathBuf },
    Unwatched { id: ResourceId },
    Reloaded { id: ResourceId, path: PathBuf, changed: bool },
    Deleted { id: ResourceId, path: PathBuf },
}

impl WatchEvent {
    /// The user-facing form of this event, if it has one.
    fn notification(&self) -> Option<(NotifyLevel, String)> {
        match self {
            WatchEvent::Enabled => Some((NotifyLevel::Info, "autoreload enabled".to_string())),
            WatchEvent::Disabled => Some((NotifyLevel::Info, "autoreload disabled".to_string())),
            WatchEvent::Reloaded {
                path,
                changed: true,
                ..
            } => Some((NotifyLevel::Info, format!("{} reloaded", path.display()))),
            WatchEvent::Deleted { path, .. } => Some((
                NotifyLevel::Warn,
                format!("{} was deleted, no longer watching", path.display()),
            )),
            _ => None,
        }
    }
}

/// Fans watch events out to observers and to the host.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<WatchEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Broadcast `event` and, if it warrants one, notify the user.
    pub fn publish(&self, event: WatchEvent, host: &dyn Host, config: &WatchConfig) {
        if let Some((level, message)) = event.notification() {
            if config.notify && level >= config.notify_level {
                host.notify(level, &message);
            } else {
                crate::debug_event!("notify", "suppressed", "{level} {message}");
            }
        }

        if self.sender.send(event).is_err() {
            // No observers, this is fine
            tracing::trace!("[notify] no observers");
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

//! Host trait and the identifiers exchanged with it.
//!
//! The host owns the documents ("buffers"). The watcher only asks it
//! questions and tells it when to reload; it never reads or writes file
//! content itself.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque identifier for an open host document.
///
/// Stable for the lifetime of the document in memory; a reopened file may
/// get a different id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque token for a document's in-memory content state.
///
/// Two equal markers mean the content did not change in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentMarker(pub u64);

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    #[serde(alias = "DEBUG")]
    Debug,
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARN", alias = "warning")]
    Warn,
    #[serde(alias = "ERROR")]
    Error,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotifyLevel::Debug => "debug",
            NotifyLevel::Info => "info",
            NotifyLevel::Warn => "warn",
            NotifyLevel::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for NotifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(NotifyLevel::Debug),
            "info" => Ok(NotifyLevel::Info),
            "warn" | "warning" => Ok(NotifyLevel::Warn),
            "error" => Ok(NotifyLevel::Error),
            other => Err(format!("unknown notify level '{other}'")),
        }
    }
}

/// Lifecycle events the host reports about its documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Opened(ResourceId),
    Closed(ResourceId),
    Renamed {
        id: ResourceId,
        old_path: Option<PathBuf>,
        new_path: Option<PathBuf>,
    },
}

impl HostEvent {
    pub fn id(&self) -> ResourceId {
        match self {
            HostEvent::Opened(id) | HostEvent::Closed(id) => *id,
            HostEvent::Renamed { id, .. } => *id,
        }
    }
}

/// The host application's document model, as seen by the watcher.
///
/// Every method is called from the controller's event loop and must not
/// block for long. `reload` is expected to run the host's own reload and
/// conflict handling; the watcher only decides *when*.
pub trait Host: Send + Sync {
    /// Every document currently open, in any order.
    fn open_resources(&self) -> Vec<ResourceId>;

    /// Whether the id still refers to an open document.
    fn is_valid(&self, id: ResourceId) -> bool;

    /// The document's backing path, if it has one.
    fn resolve_path(&self, id: ResourceId) -> Option<PathBuf>;

    /// Reload the document from disk.
    fn reload(&self, id: ResourceId);

    /// Current content marker of the document.
    fn content_marker(&self, id: ResourceId) -> Option<ContentMarker>;

    /// Present a notification to the user.
    fn notify(&self, level: NotifyLevel, message: &str);
}

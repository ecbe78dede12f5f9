//! Error types for the reload watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// None of these escalate past the resource they concern: the controller
/// logs them and degrades that one resource to "not watched".
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    SubscribeFailed { path: PathBuf, reason: String },

    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl WatchError {
    pub(crate) fn subscribe(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        WatchError::SubscribeFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// Why a resource is not watched.
///
/// Not an error: an ineligible resource is simply skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    #[error("resource is not open")]
    InvalidResource,

    #[error("resource has no backing file")]
    NoPath,

    #[error("{scheme}:// paths are not local files")]
    RemoteScheme { scheme: String },

    #[error("cannot stat {path}: {reason}")]
    StatFailed { path: PathBuf, reason: String },

    #[error("{path} is not a regular file")]
    NotRegularFile { path: PathBuf },

    #[error("{path} matches an ignore pattern")]
    Ignored { path: PathBuf },
}

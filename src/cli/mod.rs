//! Command-line front end.
//!
//! Hosts open files as in-memory buffers and drives a
//! [`ReloadWatcher`](crate::watcher::ReloadWatcher) over them.

pub mod args;
pub mod commands;
pub mod host;

pub use args::{Cli, Commands, WatchArgs};
pub use host::BufferHost;

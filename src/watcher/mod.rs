//! Per-file watch lifecycle for open host documents.
//!
//! Maps each open document to one OS change subscription, collapses bursts
//! of raw events into a single reload, and re-arms after every reload.
//!
//! # Architecture
//!
//! ```text
//! ReloadWatcher (single task, one inbound queue)
//!   - WatchRegistry: ResourceId -> WatchHandle
//!       - WatchHandle: subscription + debounce timer + re-arm timer
//!   - Notifier: host notifications + WatchEvent broadcast
//!         ^
//!         | Inbound messages
//!    +----+--------------+---------------+-------------+
//!    |                   |               |             |
//! ChangeSource       timer tasks    host lifecycle   commands
//! (NotifySource)                    (ReloadControl)  (ReloadControl)
//! ```

pub mod config;
mod controller;
mod dispatch;
mod eligibility;
mod error;
mod filter;
mod handle;
mod host;
mod notifier;
mod registry;
mod source;

pub use config::WatchConfig;
pub use controller::{Command, ReloadControl, ReloadWatcher, ReloadWatcherBuilder, WatchStatus};
pub use dispatch::{EventSink, RawEventKind, TimerHandle};
pub use eligibility::check_eligible;
pub use error::{Ineligible, WatchError};
pub use filter::{PathFilter, should_ignore};
pub use handle::{FireOutcome, HandleState, RearmOutcome, WatchHandle};
pub use host::{ContentMarker, Host, HostEvent, NotifyLevel, ResourceId};
pub use notifier::{Notifier, WatchEvent};
pub use registry::{Registration, WatchRegistry, WatchedFile};
pub use source::{ChangeSource, NotifySource, Subscription};

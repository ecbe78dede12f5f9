//! Reload watcher: the controller that owns the registry and its event loop.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::config::WatchConfig;
use super::dispatch::{Dispatcher, Inbound, RawEventKind};
use super::error::WatchError;
use super::handle::{FireOutcome, RearmOutcome};
use super::host::{Host, HostEvent, ResourceId};
use super::notifier::{Notifier, WatchEvent};
use super::registry::{Registration, WatchRegistry, WatchedFile};
use super::source::{ChangeSource, NotifySource};

/// Snapshot returned by [`ReloadWatcher::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchStatus {
    pub enabled: bool,
    pub watched_count: usize,
    pub watched_files: Vec<WatchedFile>,
}

/// Requests sent through [`ReloadControl`].
#[derive(Debug)]
pub enum Command {
    Enable,
    Disable,
    Toggle,
    Status(oneshot::Sender<WatchStatus>),
    Reconfigure(Box<WatchConfig>),
    Shutdown,
}

/// Watches the files behind a host's open documents and reloads them.
///
/// Owns all watch state. Driven by [`run`](Self::run), which handles one
/// inbound message at a time: OS notifications, timer expiries, host
/// lifecycle events and commands all arrive on the same queue. The sync
/// methods (`enable`, `disable`, ...) may also be called directly when the
/// caller owns the watcher.
pub struct ReloadWatcher {
    host: Arc<dyn Host>,
    config: Arc<WatchConfig>,
    enabled: bool,
    registry: WatchRegistry,
    notifier: Notifier,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    control: ReloadControl,
}

impl ReloadWatcher {
    /// Create a builder for configuring the watcher.
    pub fn builder() -> ReloadWatcherBuilder {
        ReloadWatcherBuilder::new()
    }

    /// A cloneable handle for sending commands and lifecycle events.
    pub fn control(&self) -> ReloadControl {
        self.control.clone()
    }

    /// Observe every watch event.
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.notifier.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> Arc<WatchConfig> {
        self.config.clone()
    }

    /// Read-only view of the per-resource watch state.
    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Start watching every open eligible document. No-op if enabled.
    pub fn enable(&mut self) -> bool {
        if self.enabled {
            return false;
        }
        self.enabled = true;

        for id in self.host.open_resources() {
            self.register(id);
        }

        crate::log_event!("autoreload", "enabled", "{} files", self.registry.len());
        self.publish(WatchEvent::Enabled);
        true
    }

    /// Stop watching everything. No-op if disabled.
    pub fn disable(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.enabled = false;

        let released = self.registry.unregister_all();
        crate::log_event!("autoreload", "disabled", "{released} watches released");
        self.publish(WatchEvent::Disabled);
        true
    }

    /// Flip the enabled state. Returns the new state.
    pub fn toggle(&mut self) -> bool {
        if self.enabled {
            self.disable();
        } else {
            self.enable();
        }
        self.enabled
    }

    pub fn status(&self) -> WatchStatus {
        let watched_files = self.registry.list_active();
        WatchStatus {
            enabled: self.enabled,
            watched_count: watched_files.len(),
            watched_files,
        }
    }

    /// Swap the options snapshot.
    ///
    /// Running timers keep the delay they were created with. Entries whose
    /// path the new ignore list excludes are dropped right away.
    pub fn reconfigure(&mut self, config: WatchConfig) {
        self.config = Arc::new(config);
        crate::debug_event!(
            "autoreload",
            "reconfigured",
            "debounce {:?}, {} ignore patterns",
            self.config.debounce,
            self.config.filter.patterns().len()
        );

        if self.enabled {
            for id in self.registry.unregister_ignored(&self.config.filter) {
                self.publish(WatchEvent::Unwatched { id });
            }
        }
    }

    /// Apply a host lifecycle event. Ignored while disabled.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        if !self.enabled {
            crate::debug_event!("autoreload", "ignored while disabled", "{event:?}");
            return;
        }

        match event {
            HostEvent::Opened(id) => {
                self.register(id);
            }
            HostEvent::Closed(id) => {
                if self.registry.unregister(id) {
                    self.publish(WatchEvent::Unwatched { id });
                }
            }
            HostEvent::Renamed {
                id,
                old_path,
                new_path,
            } => {
                crate::debug_event!("autoreload", "renamed", "{id} {old_path:?} -> {new_path:?}");
                let was_watched = self.registry.unregister(id);
                if !self.register(id) && was_watched {
                    self.publish(WatchEvent::Unwatched { id });
                }
            }
        }
    }

    /// Handle the next inbound message, waiting for one if needed.
    ///
    /// Returns false once a shutdown command was handled.
    pub async fn step(&mut self) -> bool {
        match self.inbound.recv().await {
            Some(message) => self.handle(message),
            // The watcher holds a sender itself, so the queue never closes
            None => false,
        }
    }

    /// Event loop. Returns after [`ReloadControl::shutdown`].
    pub async fn run(mut self) {
        if self.config.auto_enable {
            self.enable();
        }
        crate::debug_event!("autoreload", "started");

        while self.step().await {}

        let released = self.registry.unregister_all();
        self.enabled = false;
        crate::log_event!("autoreload", "stopped", "{released} watches released");
    }

    fn handle(&mut self, message: Inbound) -> bool {
        match message {
            Inbound::Raw { id, token, kind } => self.on_raw_event(id, token, kind),
            Inbound::DebounceFired { id, token } => self.on_debounce_fire(id, token),
            Inbound::Rearm { id, token } => self.on_rearm(id, token),
            Inbound::Lifecycle(event) => self.handle_host_event(event),
            Inbound::Command(command) => return self.on_command(command),
        }
        true
    }

    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Enable => {
                self.enable();
            }
            Command::Disable => {
                self.disable();
            }
            Command::Toggle => {
                self.toggle();
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Reconfigure(config) => self.reconfigure(*config),
            Command::Shutdown => return false,
        }
        true
    }

    fn on_raw_event(&mut self, id: ResourceId, token: u64, kind: RawEventKind) {
        let delay = self.config.debounce;
        let Some((handle, _, dispatcher)) = self.registry.entry_mut(id) else {
            tracing::trace!("[autoreload] event for unwatched {id}");
            return;
        };
        if handle.on_raw_event(token, kind, delay, dispatcher) {
            tracing::trace!("[autoreload] debounce restarted for {id} ({kind:?})");
        }
    }

    fn on_debounce_fire(&mut self, id: ResourceId, token: u64) {
        let grace = self.config.rearm_grace;
        let Some((handle, _, dispatcher)) = self.registry.entry_mut(id) else {
            return;
        };
        let path = handle.path().to_path_buf();

        match handle.on_debounce_fire(token, self.host.as_ref(), grace, dispatcher) {
            FireOutcome::Stale => {
                crate::debug_event!("autoreload", "stale debounce", "{id}");
            }
            FireOutcome::ResourceClosed => {
                self.registry.unregister(id);
                crate::debug_event!("autoreload", "resource closed", "{id}");
                self.publish(WatchEvent::Unwatched { id });
            }
            FireOutcome::Deleted(path) => {
                self.registry.unregister(id);
                tracing::warn!("[autoreload] {} deleted, watch dropped", path.display());
                self.publish(WatchEvent::Deleted { id, path });
            }
            FireOutcome::Unreadable { path, reason } => {
                self.registry.unregister(id);
                tracing::warn!("[autoreload] cannot stat {}: {reason}", path.display());
                self.publish(WatchEvent::Unwatched { id });
            }
            FireOutcome::Reloaded => {
                crate::log_event!("autoreload", "reloading", "{id} {}", path.display());
            }
        }
    }

    fn on_rearm(&mut self, id: ResourceId, token: u64) {
        let Some((handle, source, dispatcher)) = self.registry.entry_mut(id) else {
            return;
        };
        let path = handle.path().to_path_buf();

        match handle.on_rearm(token, self.host.as_ref(), source, dispatcher) {
            RearmOutcome::Stale => {
                crate::debug_event!("autoreload", "stale re-arm", "{id}");
            }
            RearmOutcome::Armed { changed } => {
                self.publish(WatchEvent::Reloaded { id, path, changed });
            }
            RearmOutcome::Failed => {
                self.registry.unregister(id);
                self.publish(WatchEvent::Unwatched { id });
            }
        }
    }

    fn register(&mut self, id: ResourceId) -> bool {
        match self.registry.register(id, self.host.as_ref(), &self.config.filter) {
            Registration::Watching(path) => {
                self.publish(WatchEvent::Watching { id, path });
                true
            }
            Registration::Ineligible(_) | Registration::SubscribeFailed => false,
        }
    }

    fn publish(&self, event: WatchEvent) {
        self.notifier.publish(event, self.host.as_ref(), &self.config);
    }
}

/// Cloneable sender side of a [`ReloadWatcher`].
///
/// Every call queues a message; it takes effect when the watcher's loop
/// gets to it.
#[derive(Clone, Debug)]
pub struct ReloadControl {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl ReloadControl {
    fn send(&self, message: Inbound) -> Result<(), WatchError> {
        self.tx.send(message).map_err(|_| WatchError::ChannelClosed)
    }

    fn command(&self, command: Command) -> Result<(), WatchError> {
        self.send(Inbound::Command(command))
    }

    pub fn enable(&self) -> Result<(), WatchError> {
        self.command(Command::Enable)
    }

    pub fn disable(&self) -> Result<(), WatchError> {
        self.command(Command::Disable)
    }

    pub fn toggle(&self) -> Result<(), WatchError> {
        self.command(Command::Toggle)
    }

    pub async fn status(&self) -> Result<WatchStatus, WatchError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Status(reply))?;
        rx.await.map_err(|_| WatchError::ChannelClosed)
    }

    pub fn reconfigure(&self, config: WatchConfig) -> Result<(), WatchError> {
        self.command(Command::Reconfigure(Box::new(config)))
    }

    pub fn shutdown(&self) -> Result<(), WatchError> {
        self.command(Command::Shutdown)
    }

    pub fn opened(&self, id: ResourceId) -> Result<(), WatchError> {
        self.send(Inbound::Lifecycle(HostEvent::Opened(id)))
    }

    pub fn closed(&self, id: ResourceId) -> Result<(), WatchError> {
        self.send(Inbound::Lifecycle(HostEvent::Closed(id)))
    }

    pub fn renamed(
        &self,
        id: ResourceId,
        old_path: Option<PathBuf>,
        new_path: Option<PathBuf>,
    ) -> Result<(), WatchError> {
        self.send(Inbound::Lifecycle(HostEvent::Renamed {
            id,
            old_path,
            new_path,
        }))
    }
}

/// Builder for constructing a [`ReloadWatcher`].
pub struct ReloadWatcherBuilder {
    host: Option<Arc<dyn Host>>,
    source: Option<Box<dyn ChangeSource>>,
    config: WatchConfig,
    event_capacity: usize,
}

impl ReloadWatcherBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            host: None,
            source: None,
            config: WatchConfig::default(),
            event_capacity: 64,
        }
    }

    /// Set the host. Required.
    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the change source. Defaults to [`NotifySource`].
    pub fn source(mut self, source: impl ChangeSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of the watch event broadcast.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the ReloadWatcher.
    pub fn build(self) -> Result<ReloadWatcher, WatchError> {
        let host = self.host.ok_or_else(|| WatchError::InitFailed {
            reason: "Host is required".to_string(),
        })?;

        let source = match self.source {
            Some(source) => source,
            None => Box::new(NotifySource::new()?),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let control = ReloadControl { tx: tx.clone() };

        Ok(ReloadWatcher {
            host,
            config: Arc::new(self.config),
            enabled: false,
            registry: WatchRegistry::new(source, Dispatcher::new(tx)),
            notifier: Notifier::new(self.event_capacity),
            inbound: rx,
            control,
        })
    }
}

impl Default for ReloadWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

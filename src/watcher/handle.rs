//! Per-resource watch state machine.
//!
//! ```text
//!            arm ok                qualifying raw event
//!   Idle ──────────────► Armed ─────────────────────────► PendingReload
//!    ▲                                                         │
//!    │                     debounce fires, file still there    │
//!    └──────── reload, subscription released ◄─────────────────┘
//!              (re-arm scheduled after the grace delay)
//!
//!   any state ── close / arm failure / resource gone / file gone or unreadable ──► Closed
//! ```
//!
//! Every transition is synchronous and driven by one inbound message. Each
//! subscription and each timer carries a unique token; a message whose token
//! does not match what the handle currently holds is stale and dropped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::dispatch::{Dispatcher, RawEventKind, TimerHandle};
use super::error::WatchError;
use super::host::{ContentMarker, Host, ResourceId};
use super::source::{ChangeSource, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Not subscribed; a re-arm may be pending.
    Idle,
    /// Subscribed, no pending debounce.
    Armed,
    /// Subscribed, debounce timer running.
    PendingReload,
    /// Terminal.
    Closed,
}

/// What happened when the debounce timer fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Message from a superseded timer or a closed handle.
    Stale,
    /// The host no longer has the resource open.
    ResourceClosed,
    /// The file is gone from disk.
    Deleted(PathBuf),
    /// The file exists but can no longer be inspected; the handle is closed.
    Unreadable { path: PathBuf, reason: String },
    /// The host was asked to reload; a re-arm is scheduled.
    Reloaded,
}

/// What happened when the re-arm timer fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RearmOutcome {
    Stale,
    /// Subscribed again. `changed` tells whether the reload altered content.
    Armed { changed: bool },
    /// Could not subscribe again; the handle is closed.
    Failed,
}

/// Subscription plus timers for one resource.
#[derive(Debug)]
pub struct WatchHandle {
    id: ResourceId,
    path: PathBuf,
    state: HandleState,
    /// Token of the live subscription, 0 when there is none.
    epoch: u64,
    subscription: Option<Subscription>,
    debounce: Option<TimerHandle>,
    rearm: Option<TimerHandle>,
    /// Content marker recorded right before the last reload.
    marker: Option<ContentMarker>,
}

impl WatchHandle {
    pub fn new(id: ResourceId, path: PathBuf) -> Self {
        Self {
            id,
            path,
            state: HandleState::Idle,
            epoch: 0,
            subscription: None,
            debounce: None,
            rearm: None,
            marker: None,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == HandleState::Closed
    }

    pub fn has_pending_debounce(&self) -> bool {
        self.debounce.is_some()
    }

    pub fn last_marker(&self) -> Option<ContentMarker> {
        self.marker
    }

    /// Open the OS subscription. On failure the handle is closed.
    pub(crate) fn arm(
        &mut self,
        source: &mut dyn ChangeSource,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), WatchError> {
        if self.is_closed() {
            return Err(WatchError::subscribe(&self.path, "handle is closed"));
        }

        let token = dispatcher.next_token();
        match source.subscribe(&self.path, dispatcher.sink(self.id, token)) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.epoch = token;
                self.state = HandleState::Armed;
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Raw OS event. Returns true if the debounce timer was (re)started.
    ///
    /// The previous timer is dropped before the new one exists, so a burst
    /// never leaves more than one timer behind.
    pub(crate) fn on_raw_event(
        &mut self,
        token: u64,
        kind: RawEventKind,
        delay: Duration,
        dispatcher: &mut Dispatcher,
    ) -> bool {
        let subscribed = matches!(self.state, HandleState::Armed | HandleState::PendingReload);
        if !subscribed || token != self.epoch || !kind.qualifies() {
            return false;
        }

        self.debounce = None;
        self.debounce = Some(dispatcher.debounce(self.id, delay));
        self.state = HandleState::PendingReload;
        true
    }

    /// Debounce expiry: validate, then reload or close.
    pub(crate) fn on_debounce_fire(
        &mut self,
        token: u64,
        host: &dyn Host,
        grace: Duration,
        dispatcher: &mut Dispatcher,
    ) -> FireOutcome {
        let current = self.debounce.as_ref().map(TimerHandle::token);
        if self.state != HandleState::PendingReload || current != Some(token) {
            return FireOutcome::Stale;
        }
        self.debounce = None;

        if !host.is_valid(self.id) {
            self.close();
            return FireOutcome::ResourceClosed;
        }

        if let Err(e) = std::fs::metadata(&self.path) {
            self.close();
            if e.kind() == std::io::ErrorKind::NotFound {
                return FireOutcome::Deleted(self.path.clone());
            }
            return FireOutcome::Unreadable {
                path: self.path.clone(),
                reason: e.to_string(),
            };
        }

        self.marker = host.content_marker(self.id);
        // A fresh subscription is opened after the grace delay; the old one
        // may be tracking an inode the path no longer points at.
        self.subscription = None;
        self.epoch = 0;
        self.state = HandleState::Idle;

        host.reload(self.id);
        self.rearm = Some(dispatcher.rearm(self.id, grace));
        FireOutcome::Reloaded
    }

    /// Grace delay elapsed after a reload: subscribe again.
    pub(crate) fn on_rearm(
        &mut self,
        token: u64,
        host: &dyn Host,
        source: &mut dyn ChangeSource,
        dispatcher: &mut Dispatcher,
    ) -> RearmOutcome {
        let current = self.rearm.as_ref().map(TimerHandle::token);
        if self.state != HandleState::Idle || current != Some(token) {
            return RearmOutcome::Stale;
        }
        self.rearm = None;

        let changed = match (self.marker, host.content_marker(self.id)) {
            (Some(before), Some(after)) => before != after,
            // Without markers we cannot tell; assume it changed
            _ => true,
        };

        match self.arm(source, dispatcher) {
            Ok(()) => RearmOutcome::Armed { changed },
            Err(e) => {
                crate::debug_event!("handle", "re-arm failed", "{} {e}", self.id);
                RearmOutcome::Failed
            }
        }
    }

    /// Release the subscription and every timer. Idempotent.
    pub fn close(&mut self) {
        self.debounce = None;
        self.rearm = None;
        self.subscription = None;
        self.epoch = 0;
        self.state = HandleState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::dispatch::{EventSink, Inbound};
    use crate::watcher::host::NotifyLevel;
    use parking_lot::Mutex;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingSource {
        sinks: Arc<Mutex<Vec<EventSink>>>,
        fail: bool,
    }

    impl ChangeSource for RecordingSource {
        fn subscribe(&mut self, path: &Path, sink: EventSink) -> Result<Subscription, WatchError> {
            if self.fail {
                return Err(WatchError::subscribe(path, "limit reached"));
            }
            self.sinks.lock().push(sink);
            Ok(Subscription::new(()))
        }
    }

    #[derive(Default)]
    struct CountingHost {
        closed: bool,
        reloads: Mutex<u32>,
        marker: Mutex<u64>,
    }

    impl Host for CountingHost {
        fn open_resources(&self) -> Vec<ResourceId> {
            vec![ResourceId(1)]
        }
        fn is_valid(&self, _id: ResourceId) -> bool {
            !self.closed
        }
        fn resolve_path(&self, _id: ResourceId) -> Option<PathBuf> {
            None
        }
        fn reload(&self, _id: ResourceId) {
            *self.reloads.lock() += 1;
        }
        fn content_marker(&self, _id: ResourceId) -> Option<ContentMarker> {
            Some(ContentMarker(*self.marker.lock()))
        }
        fn notify(&self, _level: NotifyLevel, _message: &str) {}
    }

    struct Fixture {
        _dir: TempDir,
        path: PathBuf,
        source: RecordingSource,
        dispatcher: Dispatcher,
        rx: mpsc::UnboundedReceiver<Inbound>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "one").unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        Fixture {
            _dir: dir,
            path,
            source: RecordingSource::default(),
            dispatcher: Dispatcher::new(tx),
            rx,
        }
    }

    const DELAY: Duration = Duration::from_millis(100);
    const GRACE: Duration = Duration::from_millis(50);

    #[test]
    fn test_arm_failure_closes_handle() {
        let mut fx = fixture();
        fx.source.fail = true;
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());

        assert!(handle.arm(&mut fx.source, &mut fx.dispatcher).is_err());
        assert_eq!(handle.state(), HandleState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_keeps_one_timer() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        assert!(handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher));
        assert!(handle.on_raw_event(epoch, RawEventKind::Rename, DELAY, &mut fx.dispatcher));
        assert!(handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher));
        assert_eq!(handle.state(), HandleState::PendingReload);

        // Only the last timer survives
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };
        let waited = tokio::time::timeout(Duration::from_secs(1), fx.rx.recv()).await;
        assert!(waited.is_err());

        let host = CountingHost::default();
        let outcome = handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);
        assert_eq!(outcome, FireOutcome::Reloaded);
        assert_eq!(*host.reloads.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_events_and_stale_tokens_are_ignored() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        assert!(!handle.on_raw_event(epoch, RawEventKind::Other, DELAY, &mut fx.dispatcher));
        assert!(!handle.on_raw_event(
            epoch + 100,
            RawEventKind::Content,
            DELAY,
            &mut fx.dispatcher,
        ));
        assert_eq!(handle.state(), HandleState::Armed);

        let host = CountingHost::default();
        assert_eq!(
            handle.on_debounce_fire(42, &host, GRACE, &mut fx.dispatcher),
            FireOutcome::Stale
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_file_closes_handle() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        handle.on_raw_event(epoch, RawEventKind::Rename, DELAY, &mut fx.dispatcher);
        fs::remove_file(&fx.path).unwrap();
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };

        let host = CountingHost::default();
        let outcome = handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);
        assert_eq!(outcome, FireOutcome::Deleted(fx.path.clone()));
        assert!(handle.is_closed());
        assert_eq!(*host.reloads.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_file_is_not_reported_deleted() {
        let mut fx = fixture();
        let sub = fx._dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let path = sub.join("b.txt");
        fs::write(&path, "one").unwrap();
        let mut handle = WatchHandle::new(ResourceId(1), path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher);
        // A regular file now sits where the parent directory was, so the
        // stat fails with something other than NotFound
        fs::remove_dir_all(&sub).unwrap();
        fs::write(&sub, "not a directory").unwrap();
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };

        let host = CountingHost::default();
        let outcome = handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);
        assert!(
            matches!(&outcome, FireOutcome::Unreadable { path: p, .. } if *p == path),
            "{outcome:?}"
        );
        assert!(handle.is_closed());
        assert_eq!(*host.reloads.lock(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_resource_is_not_reloaded() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher);
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };

        let host = CountingHost {
            closed: true,
            ..Default::default()
        };
        let outcome = handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);
        assert_eq!(outcome, FireOutcome::ResourceClosed);
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_then_rearm_compares_markers() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let first_epoch = fx.source.sinks.lock()[0].token();
        let host = CountingHost::default();

        handle.on_raw_event(first_epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher);
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };
        handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);
        assert_eq!(handle.state(), HandleState::Idle);
        assert_eq!(handle.last_marker(), Some(ContentMarker(0)));

        // Events from the released subscription are late and ignored
        assert!(!handle.on_raw_event(
            first_epoch,
            RawEventKind::Content,
            DELAY,
            &mut fx.dispatcher,
        ));

        *host.marker.lock() = 1;
        let Some(Inbound::Rearm { token, .. }) = fx.rx.recv().await else {
            panic!("expected a re-arm message");
        };
        let outcome = handle.on_rearm(token, &host, &mut fx.source, &mut fx.dispatcher);
        assert_eq!(outcome, RearmOutcome::Armed { changed: true });
        assert_eq!(handle.state(), HandleState::Armed);
        assert_eq!(fx.source.sinks.lock().len(), 2);

        // The new subscription has a fresh token
        let second_epoch = fx.source.sinks.lock()[1].token();
        assert_ne!(first_epoch, second_epoch);
        assert!(handle.on_raw_event(
            second_epoch,
            RawEventKind::Content,
            DELAY,
            &mut fx.dispatcher,
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_failure_closes_handle() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();
        let host = CountingHost::default();

        handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher);
        let Some(Inbound::DebounceFired { token, .. }) = fx.rx.recv().await else {
            panic!("expected a debounce message");
        };
        handle.on_debounce_fire(token, &host, GRACE, &mut fx.dispatcher);

        fx.source.fail = true;
        let Some(Inbound::Rearm { token, .. }) = fx.rx.recv().await else {
            panic!("expected a re-arm message");
        };
        let outcome = handle.on_rearm(token, &host, &mut fx.source, &mut fx.dispatcher);
        assert_eq!(outcome, RearmOutcome::Failed);
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_cancels_timers() {
        let mut fx = fixture();
        let mut handle = WatchHandle::new(ResourceId(1), fx.path.clone());
        handle.arm(&mut fx.source, &mut fx.dispatcher).unwrap();
        let epoch = fx.source.sinks.lock()[0].token();

        handle.on_raw_event(epoch, RawEventKind::Content, DELAY, &mut fx.dispatcher);
        assert!(handle.has_pending_debounce());

        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert!(!handle.has_pending_debounce());

        let waited = tokio::time::timeout(Duration::from_secs(1), fx.rx.recv()).await;
        assert!(waited.is_err(), "closed handle still fired");
        assert!(handle.arm(&mut fx.source, &mut fx.dispatcher).is_err());
    }
}

//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autoreload::watcher::{
    ChangeSource, ContentMarker, EventSink, Host, NotifyLevel, RawEventKind, ResourceId,
    Subscription, WatchError,
};
use indexmap::IndexMap;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct Doc {
    path: Option<PathBuf>,
    marker: u64,
    bump_on_reload: bool,
}

#[derive(Default)]
struct HostState {
    docs: IndexMap<ResourceId, Doc>,
    reloads: Vec<ResourceId>,
    notifications: Vec<(NotifyLevel, String)>,
}

/// Host with scriptable documents that records reloads and notifications.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a document backed by `path`. Reloads change its content marker.
    pub fn open(&self, id: u64, path: impl Into<PathBuf>) -> ResourceId {
        let id = ResourceId(id);
        self.state.lock().docs.insert(
            id,
            Doc {
                path: Some(path.into()),
                marker: 0,
                bump_on_reload: true,
            },
        );
        id
    }

    /// Open an unsaved document with no path.
    pub fn open_scratch(&self, id: u64) -> ResourceId {
        let id = ResourceId(id);
        self.state.lock().docs.insert(
            id,
            Doc {
                path: None,
                marker: 0,
                bump_on_reload: true,
            },
        );
        id
    }

    pub fn close(&self, id: ResourceId) {
        self.state.lock().docs.shift_remove(&id);
    }

    pub fn set_path(&self, id: ResourceId, path: impl Into<PathBuf>) {
        if let Some(doc) = self.state.lock().docs.get_mut(&id) {
            doc.path = Some(path.into());
        }
    }

    /// Make reloads of `id` leave the content marker untouched.
    pub fn reload_unchanged(&self, id: ResourceId) {
        if let Some(doc) = self.state.lock().docs.get_mut(&id) {
            doc.bump_on_reload = false;
        }
    }

    pub fn reloads(&self, id: ResourceId) -> usize {
        self.state.lock().reloads.iter().filter(|r| **r == id).count()
    }

    pub fn total_reloads(&self) -> usize {
        self.state.lock().reloads.len()
    }

    pub fn notifications(&self) -> Vec<(NotifyLevel, String)> {
        self.state.lock().notifications.clone()
    }

    pub fn notifications_at(&self, level: NotifyLevel) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }
}

impl Host for FakeHost {
    fn open_resources(&self) -> Vec<ResourceId> {
        self.state.lock().docs.keys().copied().collect()
    }

    fn is_valid(&self, id: ResourceId) -> bool {
        self.state.lock().docs.contains_key(&id)
    }

    fn resolve_path(&self, id: ResourceId) -> Option<PathBuf> {
        self.state.lock().docs.get(&id).and_then(|d| d.path.clone())
    }

    fn reload(&self, id: ResourceId) {
        let mut state = self.state.lock();
        state.reloads.push(id);
        if let Some(doc) = state.docs.get_mut(&id) {
            if doc.bump_on_reload {
                doc.marker += 1;
            }
        }
    }

    fn content_marker(&self, id: ResourceId) -> Option<ContentMarker> {
        self.state.lock().docs.get(&id).map(|d| ContentMarker(d.marker))
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        self.state
            .lock()
            .notifications
            .push((level, message.to_string()));
    }
}

#[derive(Default)]
struct SourceState {
    live: HashMap<PathBuf, (u64, EventSink)>,
    retired: Vec<EventSink>,
    failing: HashSet<PathBuf>,
    subscribes: usize,
    next_key: u64,
}

/// Change source driven by hand. Clones share state, so a test keeps one
/// copy and hands the other to the watcher.
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
}

struct Unsubscribe {
    state: Arc<Mutex<SourceState>>,
    path: PathBuf,
    key: u64,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let current = state.live.get(&self.path).map(|(key, _)| *key);
        if current == Some(self.key) {
            if let Some((_, sink)) = state.live.remove(&self.path) {
                state.retired.push(sink);
            }
        }
    }
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a raw event to the live subscription on `path`.
    /// Returns false if nothing is subscribed.
    pub fn emit(&self, path: &Path, kind: RawEventKind) -> bool {
        let path = canonical(path);
        let state = self.state.lock();
        match state.live.get(&path) {
            Some((_, sink)) => {
                sink.emit(kind);
                true
            }
            None => false,
        }
    }

    /// Deliver a late event through every subscription already cancelled.
    pub fn emit_retired(&self, kind: RawEventKind) -> usize {
        let state = self.state.lock();
        for sink in &state.retired {
            sink.emit(kind);
        }
        state.retired.len()
    }

    pub fn is_subscribed(&self, path: &Path) -> bool {
        self.state.lock().live.contains_key(&canonical(path))
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().subscribes
    }

    /// Make future subscriptions on `path` fail.
    pub fn fail(&self, path: &Path) {
        self.state.lock().failing.insert(canonical(path));
    }
}

impl ChangeSource for FakeSource {
    fn subscribe(&mut self, path: &Path, sink: EventSink) -> Result<Subscription, WatchError> {
        let mut state = self.state.lock();
        if state.failing.contains(path) {
            return Err(WatchError::SubscribeFailed {
                path: path.to_path_buf(),
                reason: "refused by test".to_string(),
            });
        }

        state.subscribes += 1;
        state.next_key += 1;
        let key = state.next_key;
        if let Some((_, old)) = state.live.insert(path.to_path_buf(), (key, sink)) {
            state.retired.push(old);
        }

        Ok(Subscription::new(Unsubscribe {
            state: self.state.clone(),
            path: path.to_path_buf(),
            key,
        }))
    }
}

/// Registered paths are canonical; tempdirs may sit behind a symlink.
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Create `name` with `content` inside `dir` and return its canonical path.
pub fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    canonical(&path)
}

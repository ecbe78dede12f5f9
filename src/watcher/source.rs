//! OS-level change subscriptions.
//!
//! [`ChangeSource`] is the seam between the controller and whatever delivers
//! file change notifications. [`NotifySource`] is the production
//! implementation backed by a single shared `notify::RecommendedWatcher`.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::dispatch::{EventSink, RawEventKind};
use super::error::WatchError;

/// An active subscription. Dropping it cancels the subscription.
pub struct Subscription {
    _guard: Box<dyn Any + Send>,
}

impl Subscription {
    /// Wrap whatever keeps the subscription alive.
    pub fn new<G: Send + 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }

    /// Stop delivering events.
    pub fn cancel(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}

/// Delivers change notifications for individual files.
pub trait ChangeSource: Send {
    /// Start delivering raw events for `path` to `sink`.
    ///
    /// Must return without waiting for any event. Late events after the
    /// returned [`Subscription`] is dropped are tolerated.
    fn subscribe(&mut self, path: &Path, sink: EventSink) -> Result<Subscription, WatchError>;
}

type Routes = Arc<Mutex<HashMap<PathBuf, Vec<EventSink>>>>;

/// `notify`-backed source: one OS watcher, one non-recursive watch per file.
///
/// Several subscriptions may share a path (two buffers on the same file);
/// the OS watch is added for the first and removed with the last.
pub struct NotifySource {
    watcher: Arc<Mutex<notify::RecommendedWatcher>>,
    routes: Routes,
}

impl NotifySource {
    pub fn new() -> Result<Self, WatchError> {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let handler_routes = routes.clone();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => route_event(&handler_routes, &event),
            Err(e) => tracing::debug!("[source] watch error: {e}"),
        })?;

        Ok(Self {
            watcher: Arc::new(Mutex::new(watcher)),
            routes,
        })
    }

    /// Number of paths with an OS watch.
    pub fn watched_paths(&self) -> usize {
        self.routes.lock().len()
    }
}

fn route_event(routes: &Routes, event: &Event) {
    let kind = RawEventKind::from(&event.kind);
    let routes = routes.lock();
    for path in &event.paths {
        if let Some(sinks) = routes.get(path) {
            for sink in sinks {
                sink.emit(kind);
            }
        }
    }
}

impl ChangeSource for NotifySource {
    fn subscribe(&mut self, path: &Path, sink: EventSink) -> Result<Subscription, WatchError> {
        let first = {
            let mut routes = self.routes.lock();
            let sinks = routes.entry(path.to_path_buf()).or_default();
            sinks.push(sink.clone());
            sinks.len() == 1
        };

        if first {
            // Routes lock is released: notify's event thread takes it
            if let Err(e) = self
                .watcher
                .lock()
                .watch(path, RecursiveMode::NonRecursive)
            {
                remove_route(&self.routes, path, sink.token());
                return Err(WatchError::subscribe(path, e));
            }
        }

        Ok(Subscription::new(NotifyGuard {
            path: path.to_path_buf(),
            token: sink.token(),
            routes: self.routes.clone(),
            watcher: self.watcher.clone(),
        }))
    }
}

/// Returns true if the path has no subscribers left.
fn remove_route(routes: &Routes, path: &Path, token: u64) -> bool {
    let mut routes = routes.lock();
    let Some(sinks) = routes.get_mut(path) else {
        return false;
    };
    sinks.retain(|s| s.token() != token);
    if sinks.is_empty() {
        routes.remove(path);
        true
    } else {
        false
    }
}

struct NotifyGuard {
    path: PathBuf,
    token: u64,
    routes: Routes,
    watcher: Arc<Mutex<notify::RecommendedWatcher>>,
}

impl Drop for NotifyGuard {
    fn drop(&mut self) {
        if remove_route(&self.routes, &self.path, self.token) {
            // The file may already be gone, which removes the OS watch by itself
            if let Err(e) = self.watcher.lock().unwatch(&self.path) {
                crate::debug_event!("source", "unwatch", "{}: {e}", self.path.display());
            }
        }
    }
}

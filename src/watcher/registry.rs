//! Resource → watch handle map.
//!
//! Holds at most one [`WatchHandle`] per [`ResourceId`]. Every mutation
//! happens inside a single synchronous call, so a status snapshot never sees
//! a half-registered entry.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;

use super::dispatch::Dispatcher;
use super::eligibility::check_eligible;
use super::error::Ineligible;
use super::filter::PathFilter;
use super::handle::WatchHandle;
use super::host::{Host, ResourceId};
use super::source::ChangeSource;

/// One row of a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchedFile {
    pub id: ResourceId,
    pub path: PathBuf,
}

/// Result of [`WatchRegistry::register`].
#[derive(Debug)]
pub enum Registration {
    Watching(PathBuf),
    Ineligible(Ineligible),
    /// Eligible, but the OS subscription could not be opened.
    SubscribeFailed,
}

impl Registration {
    pub fn is_watching(&self) -> bool {
        matches!(self, Registration::Watching(_))
    }
}

/// Registry of active watches, in registration order.
pub struct WatchRegistry {
    entries: IndexMap<ResourceId, WatchHandle>,
    source: Box<dyn ChangeSource>,
    dispatcher: Dispatcher,
}

impl WatchRegistry {
    pub(crate) fn new(source: Box<dyn ChangeSource>, dispatcher: Dispatcher) -> Self {
        Self {
            entries: IndexMap::new(),
            source,
            dispatcher,
        }
    }

    /// Watch `id` from scratch.
    ///
    /// Any existing entry is torn down first, so re-registering is how a
    /// rename or a changed ignore list is picked up.
    pub fn register(
        &mut self,
        id: ResourceId,
        host: &dyn Host,
        filter: &PathFilter,
    ) -> Registration {
        self.unregister(id);

        let path = match check_eligible(id, host, filter) {
            Ok(path) => path,
            Err(reason) => {
                crate::debug_event!("registry", "skipped", "{id} {reason}");
                return Registration::Ineligible(reason);
            }
        };

        let mut handle = WatchHandle::new(id, path.clone());
        match handle.arm(self.source.as_mut(), &mut self.dispatcher) {
            Ok(()) => {
                crate::debug_event!("registry", "watching", "{id} {}", path.display());
                self.entries.insert(id, handle);
                Registration::Watching(path)
            }
            Err(e) => {
                crate::debug_event!("registry", "not watched", "{id} {e}");
                Registration::SubscribeFailed
            }
        }
    }

    /// Tear down and remove the entry for `id`. Returns whether one existed.
    pub fn unregister(&mut self, id: ResourceId) -> bool {
        match self.entries.shift_remove(&id) {
            Some(mut handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    /// Tear down every entry. Returns how many there were.
    pub fn unregister_all(&mut self) -> usize {
        let count = self.entries.len();
        for (_, mut handle) in self.entries.drain(..) {
            handle.close();
        }
        count
    }

    /// Remove every entry whose path `filter` now excludes.
    pub fn unregister_ignored(&mut self, filter: &PathFilter) -> Vec<ResourceId> {
        let ignored: Vec<ResourceId> = self
            .entries
            .values()
            .filter(|h| filter.should_ignore(h.path()))
            .map(WatchHandle::id)
            .collect();
        for id in &ignored {
            self.unregister(*id);
        }
        ignored
    }

    /// Point-in-time copy of the active entries, in registration order.
    pub fn list_active(&self) -> Vec<WatchedFile> {
        self.entries
            .values()
            .map(|h| WatchedFile {
                id: h.id(),
                path: h.path().to_path_buf(),
            })
            .collect()
    }

    pub fn get(&self, id: ResourceId) -> Option<&WatchHandle> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handle plus the pieces its transitions need.
    pub(crate) fn entry_mut(
        &mut self,
        id: ResourceId,
    ) -> Option<(&mut WatchHandle, &mut dyn ChangeSource, &mut Dispatcher)> {
        let handle = self.entries.get_mut(&id)?;
        Some((handle, self.source.as_mut(), &mut self.dispatcher))
    }
}

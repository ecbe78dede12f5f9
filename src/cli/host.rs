//! In-memory buffers backing the `watch` command.
//!
//! Each opened file becomes a buffer holding its last loaded content. A
//! reload re-reads the file and bumps the buffer's tick only when the text
//! actually differs, so the tick doubles as the content marker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use owo_colors::OwoColorize;
use parking_lot::RwLock;

use crate::watcher::{ContentMarker, Host, NotifyLevel, ResourceId};

#[derive(Debug, Clone)]
struct Buffer {
    path: PathBuf,
    content: String,
    tick: u64,
}

/// Summary of one open buffer, for `list`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BufferInfo {
    pub id: ResourceId,
    pub path: PathBuf,
    pub bytes: usize,
    pub tick: u64,
}

pub struct BufferHost {
    buffers: RwLock<IndexMap<ResourceId, Buffer>>,
    next_id: AtomicU64,
    colors: bool,
}

impl BufferHost {
    pub fn new(colors: bool) -> Self {
        Self {
            buffers: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
            colors,
        }
    }

    /// Open `path` as a new buffer. Unreadable files open empty; the
    /// watcher decides separately whether they are eligible.
    pub fn open(&self, path: impl AsRef<Path>) -> ResourceId {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let content = std::fs::read_to_string(&path).unwrap_or_else(|e| {
            tracing::debug!("[buffers] {} opened empty: {e}", path.display());
            String::new()
        });

        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.buffers.write().insert(
            id,
            Buffer {
                path,
                content,
                tick: 0,
            },
        );
        id
    }

    pub fn close(&self, id: ResourceId) -> bool {
        self.buffers.write().shift_remove(&id).is_some()
    }

    /// Point an open buffer at a new path. Returns the old path.
    pub fn rename(&self, id: ResourceId, new_path: impl AsRef<Path>) -> Option<PathBuf> {
        let mut buffers = self.buffers.write();
        let buffer = buffers.get_mut(&id)?;
        let new_path = new_path.as_ref();
        let new_path = std::path::absolute(new_path).unwrap_or_else(|_| new_path.to_path_buf());
        Some(std::mem::replace(&mut buffer.path, new_path))
    }

    pub fn content(&self, id: ResourceId) -> Option<String> {
        self.buffers.read().get(&id).map(|b| b.content.clone())
    }

    pub fn list(&self) -> Vec<BufferInfo> {
        self.buffers
            .read()
            .iter()
            .map(|(id, buffer)| BufferInfo {
                id: *id,
                path: buffer.path.clone(),
                bytes: buffer.content.len(),
                tick: buffer.tick,
            })
            .collect()
    }
}

impl Host for BufferHost {
    fn open_resources(&self) -> Vec<ResourceId> {
        self.buffers.read().keys().copied().collect()
    }

    fn is_valid(&self, id: ResourceId) -> bool {
        self.buffers.read().contains_key(&id)
    }

    fn resolve_path(&self, id: ResourceId) -> Option<PathBuf> {
        self.buffers.read().get(&id).map(|b| b.path.clone())
    }

    fn reload(&self, id: ResourceId) {
        let Some(path) = self.resolve_path(id) else {
            return;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("[buffers] failed to reload {}: {e}", path.display());
                return;
            }
        };

        let mut buffers = self.buffers.write();
        if let Some(buffer) = buffers.get_mut(&id) {
            if buffer.content != content {
                buffer.content = content;
                buffer.tick += 1;
            }
        }
    }

    fn content_marker(&self, id: ResourceId) -> Option<ContentMarker> {
        self.buffers.read().get(&id).map(|b| ContentMarker(b.tick))
    }

    fn notify(&self, level: NotifyLevel, message: &str) {
        if !self.colors {
            eprintln!("{level}: {message}");
            return;
        }
        match level {
            NotifyLevel::Debug => eprintln!("{} {message}", level.dimmed()),
            NotifyLevel::Info => eprintln!("{} {message}", level.green().bold()),
            NotifyLevel::Warn => eprintln!("{} {message}", level.yellow().bold()),
            NotifyLevel::Error => eprintln!("{} {message}", level.red().bold()),
        }
    }
}

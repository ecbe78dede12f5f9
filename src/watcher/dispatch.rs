//! Inbound event queue, timers and raw event sinks.
//!
//! Everything that can happen to the controller (an OS change notification,
//! a debounce expiry, a re-arm, a host lifecycle event, a command) becomes an
//! [`Inbound`] message on one unbounded channel. The controller consumes the
//! channel from a single task and handles each message with one synchronous
//! transition.
//!
//! Timers are tokio tasks that sleep and then post a message. Dropping the
//! [`TimerHandle`] aborts the task; a message that was already posted is
//! caught later by the token check in the handle.

use std::fmt;
use std::time::Duration;

use notify::EventKind;
use notify::event::ModifyKind;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::controller::Command;
use super::host::{HostEvent, ResourceId};

/// Classification of a raw OS notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    /// File content was written.
    Content,
    /// File was renamed, replaced or removed (atomic saves land here).
    Rename,
    /// Anything else (access, metadata). Never triggers a reload.
    Other,
}

impl RawEventKind {
    /// Whether this kind starts or restarts the debounce timer.
    pub fn qualifies(self) -> bool {
        matches!(self, RawEventKind::Content | RawEventKind::Rename)
    }
}

impl From<&EventKind> for RawEventKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                RawEventKind::Content
            }
            EventKind::Create(_) => RawEventKind::Content,
            EventKind::Modify(ModifyKind::Name(_)) | EventKind::Remove(_) => RawEventKind::Rename,
            // Metadata-only changes, access events and unknowns
            _ => RawEventKind::Other,
        }
    }
}

/// One message on the controller's queue.
#[derive(Debug)]
pub(crate) enum Inbound {
    Raw {
        id: ResourceId,
        token: u64,
        kind: RawEventKind,
    },
    DebounceFired {
        id: ResourceId,
        token: u64,
    },
    Rearm {
        id: ResourceId,
        token: u64,
    },
    Lifecycle(HostEvent),
    Command(Command),
}

/// Where a subscription delivers its raw events.
///
/// Cheap to clone, `Send + Sync`, safe to call from any thread (notify
/// invokes it from its own event thread).
#[derive(Clone)]
pub struct EventSink {
    id: ResourceId,
    token: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EventSink {
    /// Deliver one raw event. Silently dropped once the controller is gone.
    pub fn emit(&self, kind: RawEventKind) {
        let _ = self.tx.send(Inbound::Raw {
            id: self.id,
            token: self.token,
            kind,
        });
    }

    /// The resource this sink reports for.
    pub fn resource(&self) -> ResourceId {
        self.id
    }

    /// Unique token of the subscription this sink belongs to.
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("id", &self.id)
            .field("token", &self.token)
            .finish()
    }
}

/// A scheduled message. Dropping or cancelling it aborts the timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn cancel(self) {
        // Drop does the work
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Producer side of the controller queue, plus the token counter.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    tx: mpsc::UnboundedSender<Inbound>,
    next_token: u64,
}

impl Dispatcher {
    pub fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx, next_token: 0 }
    }

    /// Fresh token, never reused within this dispatcher.
    pub fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub fn sink(&self, id: ResourceId, token: u64) -> EventSink {
        EventSink {
            id,
            token,
            tx: self.tx.clone(),
        }
    }

    /// Post `message` after `delay`. Must be called inside a tokio runtime.
    fn schedule(&self, token: u64, delay: Duration, message: Inbound) -> TimerHandle {
        let tx = self.tx.clone();
        // The deadline is fixed here, not when the task first runs
        let sleep = tokio::time::sleep(delay);
        let task = tokio::spawn(async move {
            sleep.await;
            let _ = tx.send(message);
        });
        TimerHandle {
            token,
            abort: task.abort_handle(),
        }
    }

    pub fn debounce(&mut self, id: ResourceId, delay: Duration) -> TimerHandle {
        let token = self.next_token();
        self.schedule(token, delay, Inbound::DebounceFired { id, token })
    }

    pub fn rearm(&mut self, id: ResourceId, delay: Duration) -> TimerHandle {
        let token = self.next_token();
        self.schedule(token, delay, Inbound::Rearm { id, token })
    }
}

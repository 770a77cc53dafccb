//! Lifecycle event notification
//!
//! Every transition publishes two events: one after the phase is set and
//! before the hook runs, one after the hook succeeds and before the phase is
//! cleared. Events are delivered synchronously to listeners registered with
//! `on_event` and fanned out to `tokio::sync::broadcast` subscribers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::phase::{Liveness, Phase};

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// `start` is about to run its hook
    Start,
    /// `start` completed
    Started,
    /// `stop` is about to run its hook
    Stop,
    /// `stop` completed
    Stopped,
    /// `destroy` is about to run its hook
    Destroy,
    /// `destroy` completed
    Destroyed,
}

impl LifecycleEvent {
    /// Event published before the hook of `phase` runs
    pub const fn announce(phase: Phase) -> Self {
        match phase {
            Phase::Starting => Self::Start,
            Phase::Stopping => Self::Stop,
            Phase::Destroying => Self::Destroy,
        }
    }

    /// Event published after the hook of `phase` succeeds
    pub const fn completed(phase: Phase) -> Self {
        match phase {
            Phase::Starting => Self::Started,
            Phase::Stopping => Self::Stopped,
            Phase::Destroying => Self::Destroyed,
        }
    }

    /// Phase this event belongs to
    pub const fn phase(self) -> Phase {
        match self {
            Self::Start | Self::Started => Phase::Starting,
            Self::Stop | Self::Stopped => Phase::Stopping,
            Self::Destroy | Self::Destroyed => Phase::Destroying,
        }
    }

    /// Whether this is a completion event
    pub const fn is_completion(self) -> bool {
        matches!(self, Self::Started | Self::Stopped | Self::Destroyed)
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Started => "started",
            Self::Stop => "stop",
            Self::Stopped => "stopped",
            Self::Destroy => "destroy",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Event plus the gate state observed when it was published
///
/// `phase` is always the event's phase, and `liveness` reflects the hook's
/// outcome for completion events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleNotice {
    /// Gate name from its configuration
    pub gate: String,
    /// Event kind
    pub event: LifecycleEvent,
    /// Liveness at publication time
    pub liveness: Liveness,
    /// Phase at publication time
    pub phase: Option<Phase>,
}

/// Synchronous event listener
pub type EventListener = Arc<dyn Fn(&LifecycleNotice) + Send + Sync>;

/// Handle returned by `on_event`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry plus broadcast channel
pub(crate) struct EventHub {
    listeners: RwLock<Vec<(ListenerId, EventListener)>>,
    sender: broadcast::Sender<LifecycleNotice>,
    next_id: AtomicU64,
}

impl EventHub {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { listeners: RwLock::new(Vec::new()), sender, next_id: AtomicU64::new(1) }
    }

    pub(crate) fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleNotice) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.sender.subscribe()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver to listeners, then to subscribers
    ///
    /// Listeners are snapshotted first so they may register or remove
    /// listeners themselves.
    pub(crate) fn emit(&self, notice: &LifecycleNotice) {
        let listeners: Vec<EventListener> =
            self.listeners.read().iter().map(|(_, listener)| Arc::clone(listener)).collect();
        for listener in listeners {
            listener(notice);
        }

        // No subscribers is not an error.
        let _ = self.sender.send(notice.clone());
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

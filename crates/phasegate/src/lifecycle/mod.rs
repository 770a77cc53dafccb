//! Lifecycle gating for async components
//!
//! This module provides the building blocks for objects whose methods must
//! only run while the object is in the right lifecycle state:
//! - **[`lock`]**: write-preferring, read-reentrant reader/writer lock
//! - **[`variants`]**: destroy-only, start/stop and full lifecycle gates
//! - **[`guard`]**: readiness-guarded calls, streams and iterators
//! - **[`events`]**: lifecycle event listeners and broadcast subscriptions
//! - **[`phase`]**: liveness states, transition phases and phase sets
//!
//! Transitions (`start`, `stop`, `destroy`) take the write half of the
//! gate's lock; blocking guarded calls take the read half. Because the lock
//! prefers writers, a transition waits only for the calls that were already
//! running when it was requested.

pub mod error;
pub mod events;
pub mod gate;
pub mod guard;
pub mod lock;
pub mod phase;
pub mod variants;

// Re-export commonly used types and traits for convenience
pub use error::{LifecycleError, LifecycleResult};
pub use events::{EventListener, LifecycleEvent, LifecycleNotice, ListenerId};
pub use gate::{noop_hook, LifecycleSnapshot};
pub use guard::{Guard, GuardedIter, ReadyOptions, Step};
pub use lock::{LockMode, ReadGuard, ReaderWriterLock, WriteGuard};
pub use phase::{Liveness, Phase, PhaseSet};
pub use variants::{DestroyGate, LifecycleGate, StartStopGate};

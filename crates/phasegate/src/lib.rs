//! Lifecycle-guarded concurrency primitives for async components.
//!
//! `phasegate` coordinates an object's lifecycle transitions (`start`,
//! `stop`, `destroy`) with the ordinary methods that must only run while the
//! object is live. Transitions are serialized against each other and against
//! blocking guarded calls through a write-preferring reader/writer lock.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors and gate configuration
//! - `observability`: `tracing` instrumentation (pulled in by `runtime`)
//! - `runtime`: the lock, gates, guards and events (tokio based)
//! - `test-utils`: test helpers plus a `tracing` subscriber for tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod config;
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod lifecycle;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use config::{GateConfig, GateConfigBuilder};
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "runtime")]
pub use lifecycle::{
    DestroyGate, Guard, LifecycleError, LifecycleEvent, LifecycleGate, LifecycleNotice,
    LifecycleResult, LifecycleSnapshot, Liveness, LockMode, Phase, PhaseSet, ReaderWriterLock,
    ReadyOptions, StartStopGate, Step,
};

//! Testing utilities and helpers
//!
//! This module provides helpers for testing code built on lifecycle gates:
//! - **[`async_utils`]**: timeouts, polling and lock/phase waiters
//! - **[`hooks`]**: [`HookProbe`], controllable hooks and guarded bodies
//!
//! ## Usage
//!
//! ```rust
//! # #[cfg(feature = "runtime")]
//! # {
//! use phasegate::lifecycle::{LifecycleError, LifecycleGate};
//! use phasegate::testing::HookProbe;
//!
//! async fn start_with_probe() -> Result<(), LifecycleError> {
//!     let gate = LifecycleGate::new();
//!     let probe = HookProbe::new();
//!     gate.start(probe.hook::<LifecycleError>()).await?;
//!     assert_eq!(probe.finished(), 1);
//!     Ok(())
//! }
//! # }
//! ```

pub mod async_utils;
pub mod hooks;

pub use async_utils::{join_lifecycle, poll_until, timeout_ok, wait_for_phase, wait_until_locked};
pub use hooks::HookProbe;

/// Install a `tracing` subscriber for tests, honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs anything.
#[cfg(feature = "test-utils")]
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

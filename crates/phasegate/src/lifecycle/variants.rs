//! Gate variants
//!
//! - [`DestroyGate`]: `destroy` only; guarded calls need "not destroyed"
//! - [`StartStopGate`]: `start`/`stop`; guarded calls need "running"
//! - [`LifecycleGate`]: `start`/`stop`/`destroy`; guarded calls need
//!   "running", and `destroy` requires the object to be stopped
//!
//! Transitions take a hook, an async closure returning `Result<T, E>` where
//! `E: From<LifecycleError>`. They return `Ok(Some(value))` when the hook
//! ran and succeeded, `Ok(None)` when the object was already in the target
//! state and the hook was skipped, and `Err` when a precondition failed or
//! the hook failed. A failed hook leaves liveness unchanged.
//!
//! # Example
//!
//! ```rust,ignore
//! use phasegate::lifecycle::{LifecycleError, LifecycleGate};
//!
//! let gate = LifecycleGate::new();
//! gate.start(|| async { Ok::<_, LifecycleError>(()) }).await?;
//!
//! let value = gate.guarded().run(|| async { Ok::<_, LifecycleError>(42) }).await?;
//!
//! gate.stop(|| async { Ok::<_, LifecycleError>(()) }).await?;
//! gate.destroy(|| async { Ok::<_, LifecycleError>(()) }).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;

use super::error::{LifecycleError, LifecycleResult};
use super::events::{LifecycleNotice, ListenerId};
use super::gate::{GateCore, GateModel, LifecycleSnapshot};
use super::guard::{Guard, ReadyOptions};
use super::lock::ReaderWriterLock;
use super::phase::{Liveness, Phase};
use crate::config::GateConfig;

/// Accessors shared by every gate variant
macro_rules! impl_gate_common {
    ($gate:ident, $model:expr) => {
        impl $gate {
            /// Create a gate with the default configuration
            pub fn new() -> Self {
                Self { core: Arc::new(GateCore::default_for($model)) }
            }

            /// Create a gate from a validated configuration
            pub fn with_config(config: GateConfig) -> LifecycleResult<Self> {
                Ok(Self { core: Arc::new(GateCore::new($model, config)?) })
            }

            /// Gate name from its configuration
            pub fn name(&self) -> &str {
                self.core.name()
            }

            /// Steady-state liveness
            pub fn liveness(&self) -> Liveness {
                self.core.liveness()
            }

            /// Transition in progress, if any
            pub fn phase(&self) -> Option<Phase> {
                self.core.phase()
            }

            /// Whether guarded calls are currently admitted without waiting
            pub fn is_ready(&self) -> bool {
                self.core.is_ready()
            }

            /// Point-in-time view for diagnostics
            pub fn snapshot(&self) -> LifecycleSnapshot {
                self.core.snapshot()
            }

            /// Lock serializing transitions against blocking guarded calls
            pub fn lock(&self) -> &ReaderWriterLock {
                self.core.lock()
            }

            /// Default guard options: the variant's error plus the
            /// configured blocking mode
            pub fn ready_options(&self) -> ReadyOptions<LifecycleError> {
                self.core.default_options()
            }

            /// Guard bound to the given options
            pub fn guard<E>(&self, options: ReadyOptions<E>) -> Guard<'_, E> {
                Guard::new(&self.core, options)
            }

            /// Guard bound to [`Self::ready_options`]
            pub fn guarded(&self) -> Guard<'_, LifecycleError> {
                Guard::new(&self.core, self.core.default_options())
            }

            /// Register a synchronous event listener
            ///
            /// Listeners run inline on the transitioning task and must not
            /// block or call transitions on the same gate.
            pub fn on_event<F>(&self, listener: F) -> ListenerId
            where
                F: Fn(&LifecycleNotice) + Send + Sync + 'static,
            {
                self.core.on_event(listener)
            }

            /// Remove a listener; returns whether it was registered
            pub fn remove_listener(&self, id: ListenerId) -> bool {
                self.core.remove_listener(id)
            }

            /// Subscribe to events through a broadcast channel
            pub fn subscribe(&self) -> broadcast::Receiver<LifecycleNotice> {
                self.core.subscribe()
            }

            /// Resolve on the next phase change or end of a transition
            pub async fn phase_changed(&self) {
                self.core.phase_changed().await;
            }
        }

        impl Default for $gate {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// Gate for objects that can only be destroyed
#[derive(Debug, Clone)]
pub struct DestroyGate {
    core: Arc<GateCore>,
}

impl_gate_common!(DestroyGate, GateModel::DestroyOnly);

impl DestroyGate {
    /// Whether `destroy` has completed
    pub fn is_destroyed(&self) -> bool {
        self.core.liveness() == Liveness::Destroyed
    }

    /// Destroy the object; idempotent
    pub async fn destroy<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Destroying, hook).await
    }
}

/// Gate for objects that can be started and stopped
#[derive(Debug, Clone)]
pub struct StartStopGate {
    core: Arc<GateCore>,
}

impl_gate_common!(StartStopGate, GateModel::StartStop);

impl StartStopGate {
    /// Whether `start` has completed and `stop` has not
    pub fn is_running(&self) -> bool {
        self.core.liveness() == Liveness::Running
    }

    /// Start the object; no-op when already running
    pub async fn start<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Starting, hook).await
    }

    /// Stop the object; no-op when not running
    pub async fn stop<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Stopping, hook).await
    }
}

/// Gate for objects that are started, stopped and finally destroyed
#[derive(Debug, Clone)]
pub struct LifecycleGate {
    core: Arc<GateCore>,
}

impl_gate_common!(LifecycleGate, GateModel::Full);

impl LifecycleGate {
    /// Whether `start` has completed and `stop` has not
    pub fn is_running(&self) -> bool {
        self.core.liveness() == Liveness::Running
    }

    /// Whether `destroy` has completed
    pub fn is_destroyed(&self) -> bool {
        self.core.liveness() == Liveness::Destroyed
    }

    /// Start the object
    ///
    /// No-op when already running; fails with [`LifecycleError::Destroyed`]
    /// after `destroy`.
    pub async fn start<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Starting, hook).await
    }

    /// Stop the object; no-op when not running
    pub async fn stop<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Stopping, hook).await
    }

    /// Destroy the object
    ///
    /// No-op when already destroyed; fails with [`LifecycleError::Running`]
    /// while running.
    pub async fn destroy<F, Fut, T, E>(&self, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        self.core.transition(Phase::Destroying, hook).await
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for gate variants
    //!
    //! Concurrency scenarios live in `tests/lifecycle_integration.rs` and
    //! `tests/guard_integration.rs`.

    use super::*;
    use crate::lifecycle::gate::noop_hook;

    /// Validates a full `LifecycleGate` lifecycle.
    ///
    /// Assertions:
    /// - Confirms hook values surface as `Ok(Some(_))`.
    /// - Confirms repeated transitions surface as `Ok(None)`.
    /// - Ensures `start` after `destroy` fails with `Destroyed`.
    #[tokio::test]
    async fn test_lifecycle_gate_full_cycle() {
        let gate = LifecycleGate::new();
        assert_eq!(gate.liveness(), Liveness::Idle);
        assert!(!gate.is_ready());

        let started = gate.start(|| async { Ok::<_, LifecycleError>("up") }).await;
        assert_eq!(started, Ok(Some("up")));
        assert!(gate.is_running());
        assert!(gate.is_ready());

        let again = gate.start(|| async { Ok::<_, LifecycleError>("twice") }).await;
        assert_eq!(again, Ok(None));

        let destroy_running = gate.destroy(noop_hook::<LifecycleError>()).await;
        assert_eq!(destroy_running, Err(LifecycleError::Running));

        assert_eq!(gate.stop(noop_hook::<LifecycleError>()).await, Ok(Some(())));
        assert_eq!(gate.stop(noop_hook::<LifecycleError>()).await, Ok(None));

        assert_eq!(gate.destroy(noop_hook::<LifecycleError>()).await, Ok(Some(())));
        assert!(gate.is_destroyed());
        assert_eq!(gate.destroy(noop_hook::<LifecycleError>()).await, Ok(None));

        let restart = gate.start(noop_hook::<LifecycleError>()).await;
        assert_eq!(restart, Err(LifecycleError::Destroyed));
        assert_eq!(gate.stop(noop_hook::<LifecycleError>()).await, Ok(None));
    }

    /// Validates `StartStopGate` restart support.
    ///
    /// Assertions:
    /// - Ensures the gate can be started again after a stop.
    #[tokio::test]
    async fn test_start_stop_gate_restarts() {
        let gate = StartStopGate::default();
        for _ in 0..3 {
            assert_eq!(gate.start(noop_hook::<LifecycleError>()).await, Ok(Some(())));
            assert!(gate.is_running());
            assert_eq!(gate.stop(noop_hook::<LifecycleError>()).await, Ok(Some(())));
            assert!(!gate.is_running());
        }
    }

    #[tokio::test]
    async fn test_destroy_gate_ready_until_destroyed() {
        let gate = DestroyGate::new();
        assert!(gate.is_ready());
        assert_eq!(gate.ready_options().error(), &LifecycleError::Destroyed);

        let value = gate.guarded().call(|| Ok::<_, LifecycleError>(5));
        assert_eq!(value, Ok(5));

        gate.destroy(noop_hook::<LifecycleError>()).await.unwrap();
        assert!(gate.is_destroyed());
        assert_eq!(gate.guarded().call(|| Ok(5)), Err(LifecycleError::Destroyed));
    }

    /// Validates hook error types other than `LifecycleError`.
    ///
    /// Assertions:
    /// - Confirms a custom error from the hook is returned unchanged.
    /// - Confirms precondition failures convert into the custom error.
    #[tokio::test]
    async fn test_custom_hook_error_type() {
        #[derive(Debug, PartialEq)]
        enum ServiceError {
            Lifecycle(LifecycleError),
            Bind,
        }

        impl From<LifecycleError> for ServiceError {
            fn from(err: LifecycleError) -> Self {
                Self::Lifecycle(err)
            }
        }

        let gate = LifecycleGate::new();
        let failed = gate.start(|| async { Err::<(), _>(ServiceError::Bind) }).await;
        assert_eq!(failed, Err(ServiceError::Bind));
        assert!(!gate.is_running());

        gate.start(|| async { Ok::<_, ServiceError>(()) }).await.unwrap();
        let refused = gate.destroy(|| async { Ok::<_, ServiceError>(()) }).await;
        assert_eq!(refused, Err(ServiceError::Lifecycle(LifecycleError::Running)));
    }

    #[test]
    fn test_with_config() {
        let config = GateConfig::builder().name("worker").block_by_default(true).build().unwrap();
        let gate = StartStopGate::with_config(config).unwrap();
        assert_eq!(gate.name(), "worker");
        assert_eq!(gate.lock().name(), "worker");
        assert!(gate.ready_options().is_blocking());

        let invalid = GateConfig { name: String::new(), ..GateConfig::default() };
        assert!(matches!(LifecycleGate::with_config(invalid), Err(LifecycleError::Common(_))));
    }
}

//! Shared gate state and the transition template
//!
//! All three gate variants delegate to [`GateCore`]. A transition runs under
//! the write half of the gate's [`ReaderWriterLock`]:
//!
//! 1. acquire the write lock
//! 2. return `Ok(None)` if the object is already in the target state
//! 3. check preconditions (`destroy` while running, `start` after destroy)
//! 4. set the phase, wake phase waiters, publish the announce event
//! 5. run the hook
//! 6. on success update liveness and publish the completion event
//! 7. clear the phase, release the lock, wake phase waiters
//!
//! Step 7 runs from a drop guard, so it also happens when the hook fails or
//! the transition future is dropped mid-hook. A failed hook leaves liveness
//! untouched.

use std::future::{ready, Future, Ready};
use std::pin::pin;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, trace, warn};

use super::error::LifecycleError;
use super::events::{EventHub, LifecycleEvent, LifecycleNotice, ListenerId};
use super::guard::ReadyOptions;
use super::lock::{ReadGuard, ReaderWriterLock, WriteGuard};
use super::phase::{Liveness, Phase, PhaseSet};
use crate::config::GateConfig;
use crate::error::CommonResult;

/// Hook that does nothing and succeeds
///
/// ```rust,ignore
/// gate.start(noop_hook::<LifecycleError>()).await?;
/// ```
pub fn noop_hook<E>() -> impl FnOnce() -> Ready<Result<(), E>> {
    || ready(Ok(()))
}

/// Which transitions a gate supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GateModel {
    /// `destroy` only; ready means "not destroyed"
    DestroyOnly,
    /// `start`/`stop`; ready means "running"
    StartStop,
    /// `start`/`stop`/`destroy`; ready means "running"
    Full,
}

/// Point-in-time view of a gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    /// Gate name
    pub name: String,
    /// Steady-state liveness
    pub liveness: Liveness,
    /// Transition in progress, if any
    pub phase: Option<Phase>,
    /// Read guards held on the gate lock
    pub readers: u32,
    /// Write guards held on the gate lock
    pub writers: u32,
}

/// Outcome of probing the gate for a guarded call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Current phase is allowed; skip the readiness check
    Bypass,
    /// Ready and not write-locked
    Proceed,
    /// Not ready, or a transition is running
    Reject,
    /// A transition owns or awaits the write lock but has not set its
    /// phase yet
    Wait,
}

#[derive(Debug, Clone, Copy)]
enum Plan {
    Run,
    Skip,
}

pub(crate) struct GateCore {
    name: String,
    model: GateModel,
    liveness: AtomicU8,
    phase: AtomicU8,
    transitions: AtomicUsize,
    lock: ReaderWriterLock,
    signal: Notify,
    events: EventHub,
    block_by_default: bool,
}

impl GateCore {
    pub(crate) fn new(model: GateModel, config: GateConfig) -> CommonResult<Self> {
        if let Err(err) = config.validate() {
            warn!(
                gate = %config.name,
                error = ?err.as_tracing_fields(),
                "rejected gate configuration"
            );
            return Err(err);
        }
        Ok(Self::build(model, config))
    }

    pub(crate) fn default_for(model: GateModel) -> Self {
        Self::build(model, GateConfig::default())
    }

    fn build(model: GateModel, config: GateConfig) -> Self {
        Self {
            lock: ReaderWriterLock::new(config.name.as_str()),
            events: EventHub::new(config.event_capacity),
            name: config.name,
            model,
            liveness: AtomicU8::new(Liveness::Idle.to_u8()),
            phase: AtomicU8::new(Phase::to_u8(None)),
            transitions: AtomicUsize::new(0),
            signal: Notify::new(),
            block_by_default: config.block_by_default,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Acquire))
    }

    pub(crate) fn phase(&self) -> Option<Phase> {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) const fn lock(&self) -> &ReaderWriterLock {
        &self.lock
    }

    pub(crate) fn is_ready(&self) -> bool {
        match self.model {
            GateModel::DestroyOnly => self.liveness() != Liveness::Destroyed,
            GateModel::StartStop | GateModel::Full => self.liveness() == Liveness::Running,
        }
    }

    pub(crate) fn default_error(&self) -> LifecycleError {
        match self.model {
            GateModel::DestroyOnly => LifecycleError::Destroyed,
            GateModel::StartStop | GateModel::Full => LifecycleError::NotRunning,
        }
    }

    pub(crate) fn default_options(&self) -> ReadyOptions<LifecycleError> {
        ReadyOptions::new(self.default_error()).blocking(self.block_by_default)
    }

    pub(crate) fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            name: self.name.clone(),
            liveness: self.liveness(),
            phase: self.phase(),
            readers: self.lock.reader_count(),
            writers: self.lock.writer_count(),
        }
    }

    pub(crate) fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleNotice) + Send + Sync + 'static,
    {
        self.events.on_event(listener)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LifecycleNotice> {
        self.events.subscribe()
    }

    /// Resolve on the next phase change or end of a write section
    pub(crate) async fn phase_changed(&self) {
        self.signal.notified().await;
    }

    /// Run one lifecycle transition
    pub(crate) async fn transition<F, Fut, T, E>(&self, phase: Phase, hook: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LifecycleError>,
    {
        let mut section = WriteSection::enter(self);
        section.write = Some(self.lock.write().await);

        match self.plan(phase) {
            Ok(Plan::Skip) => {
                trace!(gate = %self.name, phase = %phase, "transition skipped; already in target state");
                return Ok(None);
            }
            Ok(Plan::Run) => {}
            Err(err) => {
                warn!(gate = %self.name, phase = %phase, error = %err, "transition rejected");
                return Err(err.into());
            }
        }

        self.set_phase(Some(phase));
        self.emit(LifecycleEvent::announce(phase));
        debug!(gate = %self.name, phase = %phase, "running lifecycle hook");

        let outcome = hook().await;
        match outcome {
            Ok(value) => {
                self.liveness.store(phase.target().to_u8(), Ordering::Release);
                self.emit(LifecycleEvent::completed(phase));
                info!(gate = %self.name, liveness = %phase.target(), "lifecycle transition complete");
                drop(section);
                Ok(Some(value))
            }
            Err(err) => {
                warn!(
                    gate = %self.name,
                    phase = %phase,
                    liveness = %self.liveness(),
                    "lifecycle hook failed; liveness unchanged"
                );
                drop(section);
                Err(err)
            }
        }
    }

    /// Classify a guarded call against the current state
    pub(crate) fn probe(&self, allowed: PhaseSet) -> Admission {
        let phase = self.phase();
        if phase.is_some_and(|phase| allowed.contains(phase)) {
            return Admission::Bypass;
        }
        if self.lock.is_write_locked() {
            let pending = self.transitions.load(Ordering::Acquire) > 0;
            return if phase.is_none() && pending { Admission::Wait } else { Admission::Reject };
        }
        if self.is_ready() {
            Admission::Proceed
        } else {
            Admission::Reject
        }
    }

    /// Probe until the answer no longer depends on a phase about to be set
    pub(crate) async fn settle(&self, allowed: PhaseSet) -> Admission {
        loop {
            let mut changed = pin!(self.signal.notified());
            changed.as_mut().enable();
            match self.probe(allowed) {
                Admission::Wait => changed.await,
                decided => return decided,
            }
        }
    }

    /// Admission for async guarded calls and sequences
    ///
    /// Blocking callers get a read guard to hold for the duration of the
    /// call; every other admitted caller gets `None`.
    pub(crate) async fn admit<E: Clone>(
        &self,
        options: &ReadyOptions<E>,
    ) -> Result<Option<ReadGuard>, E> {
        match self.settle(options.allowed()).await {
            Admission::Bypass => Ok(None),
            _ if options.is_blocking() => {
                let read = self.lock.read().await;
                if self.is_ready() {
                    Ok(Some(read))
                } else {
                    Err(self.reject(options))
                }
            }
            Admission::Proceed => Ok(None),
            Admission::Reject | Admission::Wait => Err(self.reject(options)),
        }
    }

    /// Admission for synchronous guarded calls; never waits
    pub(crate) fn admit_now<E: Clone>(&self, options: &ReadyOptions<E>) -> Result<(), E> {
        match self.probe(options.allowed()) {
            Admission::Bypass | Admission::Proceed => Ok(()),
            Admission::Reject | Admission::Wait => Err(self.reject(options)),
        }
    }

    fn reject<E: Clone>(&self, options: &ReadyOptions<E>) -> E {
        trace!(
            gate = %self.name,
            liveness = %self.liveness(),
            phase = ?self.phase(),
            "guarded call rejected"
        );
        options.error().clone()
    }

    fn plan(&self, phase: Phase) -> Result<Plan, LifecycleError> {
        match (phase, self.liveness()) {
            (Phase::Starting, Liveness::Idle)
            | (Phase::Stopping, Liveness::Running)
            | (Phase::Destroying, Liveness::Idle) => Ok(Plan::Run),
            (Phase::Starting, Liveness::Running)
            | (Phase::Stopping, Liveness::Idle | Liveness::Destroyed)
            | (Phase::Destroying, Liveness::Destroyed) => Ok(Plan::Skip),
            (Phase::Starting, Liveness::Destroyed) => Err(LifecycleError::Destroyed),
            (Phase::Destroying, Liveness::Running) => Err(LifecycleError::Running),
        }
    }

    fn set_phase(&self, phase: Option<Phase>) {
        self.phase.store(Phase::to_u8(phase), Ordering::Release);
        self.signal.notify_waiters();
    }

    fn emit(&self, event: LifecycleEvent) {
        let notice = LifecycleNotice {
            gate: self.name.clone(),
            event,
            liveness: self.liveness(),
            phase: self.phase(),
        };
        self.events.emit(&notice);
    }
}

impl std::fmt::Debug for GateCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateCore")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("liveness", &self.liveness())
            .field("phase", &self.phase())
            .field("lock", &self.lock)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// One transition from the write request until the end of its section
///
/// Counted in `transitions` while alive, so the probe can tell a
/// transition's write lock from one taken through the public lock handle.
/// On drop it clears the phase (if the lock was acquired), releases the
/// lock and then wakes waiters, which must see the lock released.
struct WriteSection<'a> {
    core: &'a GateCore,
    write: Option<WriteGuard>,
}

impl<'a> WriteSection<'a> {
    fn enter(core: &'a GateCore) -> Self {
        core.transitions.fetch_add(1, Ordering::AcqRel);
        Self { core, write: None }
    }
}

impl Drop for WriteSection<'_> {
    fn drop(&mut self) {
        if self.write.is_some() {
            self.core.phase.store(Phase::to_u8(None), Ordering::Release);
        }
        self.core.transitions.fetch_sub(1, Ordering::AcqRel);
        drop(self.write.take());
        self.core.signal.notify_waiters();
    }
}

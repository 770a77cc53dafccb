//! Controllable lifecycle hooks
//!
//! [`HookProbe`] hands out hooks and guarded bodies that record how often and
//! how concurrently they ran, and that can be held open until the test
//! releases them. That makes "a stop arrives while three calls are in
//! flight" scenarios deterministic without sleeps.

#![allow(clippy::missing_panics_doc)]

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{watch, Notify};

#[derive(Debug)]
struct ProbeState {
    entered: AtomicUsize,
    finished: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    changed: Notify,
    gate: watch::Sender<bool>,
}

/// Records hook invocations and optionally holds them until released
///
/// Cloning yields a handle to the same probe.
#[derive(Debug, Clone)]
pub struct HookProbe {
    state: Arc<ProbeState>,
}

impl Default for HookProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HookProbe {
    /// Probe whose hooks complete immediately
    pub fn new() -> Self {
        Self::with_gate(true)
    }

    /// Probe whose hooks wait for [`Self::release`] before completing
    pub fn held() -> Self {
        Self::with_gate(false)
    }

    fn with_gate(open: bool) -> Self {
        let (gate, _) = watch::channel(open);
        Self {
            state: Arc::new(ProbeState {
                entered: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                changed: Notify::new(),
                gate,
            }),
        }
    }

    /// Hook that succeeds with `()`
    pub fn hook<E: Send + 'static>(&self) -> impl FnOnce() -> BoxFuture<'static, Result<(), E>> {
        self.hook_returning(Ok(()))
    }

    /// Hook that resolves to `outcome`
    pub fn hook_returning<T, E>(
        &self,
        outcome: Result<T, E>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<T, E>>
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        let probe = self.clone();
        move || {
            async move {
                probe.enter();
                probe.wait_released().await;
                probe.leave();
                outcome
            }
            .boxed()
        }
    }

    /// Let held hooks complete, including ones that have not started yet
    pub fn release(&self) {
        self.state.gate.send_replace(true);
    }

    /// Hold hooks that start from now on
    pub fn hold(&self) {
        self.state.gate.send_replace(false);
    }

    /// Number of hooks that have started
    pub fn entered(&self) -> usize {
        self.state.entered.load(Ordering::SeqCst)
    }

    /// Number of hooks that have completed
    pub fn finished(&self) -> usize {
        self.state.finished.load(Ordering::SeqCst)
    }

    /// Number of hooks currently between start and completion
    pub fn active(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Highest number of hooks observed running at the same time
    pub fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    /// Resolve once at least `count` hooks have started
    pub async fn wait_entered(&self, count: usize) {
        self.wait_for(|probe| probe.entered() >= count).await;
    }

    /// Resolve once at least `count` hooks have completed
    pub async fn wait_finished(&self, count: usize) {
        self.wait_for(|probe| probe.finished() >= count).await;
    }

    async fn wait_for<F>(&self, condition: F)
    where
        F: Fn(&Self) -> bool,
    {
        loop {
            let mut changed = pin!(self.state.changed.notified());
            changed.as_mut().enable();
            if condition(self) {
                return;
            }
            changed.await;
        }
    }

    async fn wait_released(&self) {
        let mut gate = self.state.gate.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = gate.wait_for(|open| *open).await;
    }

    fn enter(&self) {
        self.state.entered.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        self.state.changed.notify_waiters();
    }

    fn leave(&self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.finished.fetch_add(1, Ordering::SeqCst);
        self.state.changed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::lifecycle::LifecycleError;

    /// Validates `HookProbe::hook` with an open probe.
    ///
    /// Assertions:
    /// - Confirms the hook completes and is counted.
    #[tokio::test]
    async fn test_open_probe_completes() {
        let probe = HookProbe::new();
        let result = (probe.hook::<LifecycleError>())().await;
        assert_eq!(result, Ok(()));
        assert_eq!(probe.entered(), 1);
        assert_eq!(probe.finished(), 1);
        assert_eq!(probe.active(), 0);
    }

    /// Validates `HookProbe::held` and `release`.
    ///
    /// Assertions:
    /// - Ensures held hooks do not finish before release.
    /// - Confirms concurrency is tracked.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_held_probe_waits_for_release() {
        let probe = HookProbe::held();
        let first = tokio::spawn((probe.hook_returning::<u8, LifecycleError>(Ok(1)))());
        let second = tokio::spawn((probe.hook_returning::<u8, LifecycleError>(Ok(2)))());

        tokio::time::timeout(Duration::from_secs(1), probe.wait_entered(2)).await.unwrap();
        assert_eq!(probe.active(), 2);
        assert_eq!(probe.finished(), 0);

        probe.release();
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(second.await.unwrap(), Ok(2));
        probe.wait_finished(2).await;
        assert_eq!(probe.max_active(), 2);
    }
}

//! Async testing utilities
//!
//! Helpers for tests that race guarded calls against lifecycle transitions.

// Allow missing error/panic docs for test utilities - they are designed to be self-explanatory
// and are used in test contexts where comprehensive documentation is less critical
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::CommonError;
use crate::lifecycle::{LifecycleError, LifecycleResult, LockMode, Phase, ReaderWriterLock};

/// Assert that an async condition eventually becomes true within a timeout
///
/// # Examples
///
/// ```no_run
/// # #[cfg(feature = "runtime")]
/// # {
/// use std::time::Duration;
///
/// use phasegate::lifecycle::{LifecycleError, LifecycleGate};
///
/// #[tokio::test(flavor = "multi_thread")]
/// async fn test_eventually_running() {
///     let gate = LifecycleGate::new();
///     let starter = gate.clone();
///     tokio::spawn(async move {
///         starter.start(|| async { Ok::<_, LifecycleError>(()) }).await
///     });
///
///     phasegate::assert_eventually_async!(Duration::from_secs(1), async { gate.is_running() });
/// }
/// # }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Wait for a future to complete with a timeout, returning a Result
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}

/// Poll an async condition until it returns true or times out
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}

/// Wait until `lock` is held in `mode`; returns false on timeout
///
/// Used to make sure a spawned transition or guarded call has actually
/// reached the lock before the test continues.
pub async fn wait_until_locked(lock: &ReaderWriterLock, mode: LockMode, timeout: Duration) -> bool {
    poll_until(timeout, Duration::from_millis(1), || async move { lock.is_locked(mode) }).await
}

/// Wait until `current()` reports `phase`; returns false on timeout
pub async fn wait_for_phase<F>(phase: Phase, timeout: Duration, current: F) -> bool
where
    F: Fn() -> Option<Phase>,
{
    poll_until(timeout, Duration::from_millis(1), || {
        let now = current();
        async move { now == Some(phase) }
    })
    .await
}

/// Await a spawned lifecycle task
///
/// A panicked or aborted task becomes `CommonError::TaskCancelled`.
pub async fn join_lifecycle<T>(
    name: &str,
    handle: JoinHandle<LifecycleResult<T>>,
) -> LifecycleResult<T> {
    match handle.await {
        Ok(result) => result,
        Err(err) => {
            let reason = if err.is_panic() { "panicked" } else { "aborted" };
            Err(LifecycleError::from(CommonError::task_cancelled_with_reason(name, reason)))
        }
    }
}

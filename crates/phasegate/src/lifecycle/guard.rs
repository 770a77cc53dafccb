//! Readiness-guarded calls
//!
//! A [`Guard`] wraps an operation so that it only runs while the gate is
//! ready (running, or for destroy-only gates not destroyed). Four shapes of
//! operation are supported:
//!
//! | entry point      | body                                   | checked        |
//! |------------------|----------------------------------------|----------------|
//! | [`Guard::call`]  | synchronous closure                    | on call        |
//! | [`Guard::run`]   | async closure                          | on call        |
//! | [`Guard::stream`]| `Stream` of [`Step`]s                  | on first poll  |
//! | [`Guard::iter`]  | `Iterator` of [`Step`]s                | on first `next`|
//!
//! Sequences are checked once, at their start. A sequence that was admitted
//! keeps producing items even if the gate stops afterwards, unless it runs
//! in blocking mode, in which case it holds the gate's read lock until it
//! completes and the stop waits for it.
//!
//! ## Blocking
//!
//! Non-blocking calls fail fast while a transition holds the write lock.
//! Blocking calls (`ReadyOptions::blocking(true)`) wait for the transition
//! to finish, then check readiness and hold the read lock for the duration
//! of the body. Synchronous calls cannot wait and ignore the flag.
//!
//! A blocking body that makes another blocking call on the same gate while a
//! transition is queued deadlocks: the inner call waits for the transition,
//! which waits for the outer call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use super::error::LifecycleError;
use super::gate::GateCore;
use super::lock::ReadGuard;
use super::phase::{Phase, PhaseSet};

/// Options for a guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyOptions<E = LifecycleError> {
    error: E,
    block: bool,
    allowed: PhaseSet,
}

impl<E> ReadyOptions<E> {
    /// Non-blocking options that fail with `error` and allow no phases
    pub const fn new(error: E) -> Self {
        Self { error, block: false, allowed: PhaseSet::empty() }
    }

    /// Wait on in-flight transitions instead of failing fast
    #[must_use]
    pub fn blocking(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Bypass the readiness check while `phase` is in progress
    #[must_use]
    pub fn allow(mut self, phase: Phase) -> Self {
        self.allowed = self.allowed.with(phase);
        self
    }

    /// Replace the set of bypass phases
    #[must_use]
    pub fn allow_phases(mut self, phases: PhaseSet) -> Self {
        self.allowed = phases;
        self
    }

    /// Same options with a different rejection error
    pub fn with_error<F>(self, error: F) -> ReadyOptions<F> {
        ReadyOptions { error, block: self.block, allowed: self.allowed }
    }

    /// Error returned on rejection
    pub const fn error(&self) -> &E {
        &self.error
    }

    /// Whether the call waits on in-flight transitions
    pub const fn is_blocking(&self) -> bool {
        self.block
    }

    /// Phases that bypass the readiness check
    pub const fn allowed(&self) -> PhaseSet {
        self.allowed
    }
}

impl Default for ReadyOptions<LifecycleError> {
    fn default() -> Self {
        Self::new(LifecycleError::NotRunning)
    }
}

/// One item of a guarded sequence
///
/// A sequence is a run of `Yielded` values optionally terminated by a single
/// `Complete` carrying the sequence's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step<Y, R = ()> {
    /// Intermediate value
    Yielded(Y),
    /// Final value; nothing follows it
    Complete(R),
}

impl<Y, R> Step<Y, R> {
    /// Whether this is the final step
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Yielded value, if any
    pub fn yielded(self) -> Option<Y> {
        match self {
            Self::Yielded(value) => Some(value),
            Self::Complete(_) => None,
        }
    }

    /// Completion value, if any
    pub fn completed(self) -> Option<R> {
        match self {
            Self::Yielded(_) => None,
            Self::Complete(value) => Some(value),
        }
    }
}

impl<T> Step<T, T> {
    /// Value regardless of position
    pub fn into_value(self) -> T {
        match self {
            Self::Yielded(value) | Self::Complete(value) => value,
        }
    }
}

/// Readiness guard bound to a gate and a set of options
///
/// Obtained from a gate's `guard` or `guarded` method.
pub struct Guard<'a, E = LifecycleError> {
    core: &'a Arc<GateCore>,
    options: ReadyOptions<E>,
}

impl<'a, E> Guard<'a, E> {
    pub(crate) const fn new(core: &'a Arc<GateCore>, options: ReadyOptions<E>) -> Self {
        Self { core, options }
    }

    /// Options this guard applies
    pub const fn options(&self) -> &ReadyOptions<E> {
        &self.options
    }
}

impl<E: Clone> Guard<'_, E> {
    /// Run a synchronous body if the gate is ready
    ///
    /// Fails with the configured error while any transition holds the write
    /// lock, unless its phase is allowed.
    pub fn call<T, F>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.core.admit_now(&self.options)?;
        body()
    }

    /// Run an async body if the gate is ready
    ///
    /// In blocking mode the gate's read lock is held until the body
    /// resolves, so transitions wait for it.
    pub async fn run<T, F, Fut>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _hold = self.core.admit(&self.options).await?;
        body().await
    }

    /// Guard a synchronous sequence; checked on the first `next`
    ///
    /// A rejected sequence yields the error once and then ends.
    pub fn iter<I, Y, R>(&self, inner: I) -> GuardedIter<I, E>
    where
        I: Iterator<Item = Result<Step<Y, R>, E>>,
    {
        GuardedIter {
            state: IterState::Pending {
                core: Arc::clone(self.core),
                options: self.options.clone(),
                inner,
            },
        }
    }
}

impl<E> Guard<'_, E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Guard an async sequence; checked on the first poll
    ///
    /// Items after a `Step::Complete` or an error are never polled. A
    /// rejected sequence yields the error once and then ends.
    pub fn stream<S, Y, R>(&self, inner: S) -> BoxStream<'static, Result<Step<Y, R>, E>>
    where
        S: Stream<Item = Result<Step<Y, R>, E>> + Send + 'static,
        Y: Send + 'static,
        R: Send + 'static,
    {
        let core = Arc::clone(self.core);
        let options = self.options.clone();
        let inner = inner.boxed();

        let admitted = async move {
            let hold = core.admit(&options).await?;
            Ok::<_, E>(Sequence { inner, hold, done: false })
        };
        stream::once(admitted).try_flatten().boxed()
    }
}

impl<E: fmt::Debug> fmt::Debug for Guard<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("gate", &self.core.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Admitted async sequence; owns the read guard in blocking mode
struct Sequence<Y, R, E> {
    inner: BoxStream<'static, Result<Step<Y, R>, E>>,
    hold: Option<ReadGuard>,
    done: bool,
}

impl<Y, R, E> Sequence<Y, R, E> {
    fn finish(&mut self) {
        self.done = true;
        self.hold = None;
    }
}

impl<Y, R, E> Stream for Sequence<Y, R, E> {
    type Item = Result<Step<Y, R>, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        let item = ready!(self.inner.poll_next_unpin(cx));
        match &item {
            Some(Ok(Step::Yielded(_))) => {}
            Some(Ok(Step::Complete(_)) | Err(_)) | None => self.finish(),
        }
        Poll::Ready(item)
    }
}

/// Synchronous guarded sequence returned by [`Guard::iter`]
pub struct GuardedIter<I, E> {
    state: IterState<I, E>,
}

enum IterState<I, E> {
    Pending { core: Arc<GateCore>, options: ReadyOptions<E>, inner: I },
    Admitted(I),
    Done,
}

impl<I, Y, R, E> Iterator for GuardedIter<I, E>
where
    I: Iterator<Item = Result<Step<Y, R>, E>>,
    E: Clone,
{
    type Item = Result<Step<Y, R>, E>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, IterState::Done) {
            IterState::Pending { core, options, inner } => match core.admit_now(&options) {
                Ok(()) => {
                    self.state = IterState::Admitted(inner);
                    self.next()
                }
                Err(err) => Some(Err(err)),
            },
            IterState::Admitted(mut inner) => {
                let item = inner.next();
                if let Some(Ok(Step::Yielded(_))) = &item {
                    self.state = IterState::Admitted(inner);
                }
                item
            }
            IterState::Done => None,
        }
    }
}

impl<I, E> fmt::Debug for GuardedIter<I, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            IterState::Pending { .. } => "pending",
            IterState::Admitted(_) => "admitted",
            IterState::Done => "done",
        };
        f.debug_struct("GuardedIter").field("state", &state).finish()
    }
}

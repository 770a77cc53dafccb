//! Write-preferring reader/writer lock
//!
//! [`ReaderWriterLock`] admits any number of concurrent readers or a single
//! writer. Once a writer is queued, readers that arrive after it wait until
//! that writer has finished, so a steady stream of readers cannot starve
//! lifecycle transitions.
//!
//! # Algorithm
//!
//! Every acquisition passes through a FIFO `turnstile`. Holding the
//! turnstile, a reader either joins the currently active read group or, when
//! no group is active, claims the `exclusive` mutex on behalf of a new group.
//! A writer keeps the turnstile until it owns `exclusive`, which blocks every
//! later arrival behind it. The last reader of a group releases `exclusive`.
//!
//! # Reentrancy
//!
//! A holder of a read guard may take another read guard while no writer is
//! queued; it simply joins its own group. Acquiring a read guard while
//! holding one **and** a writer is queued deadlocks, as does any nested
//! write acquisition.

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tokio::time::timeout;

use crate::error::{CommonError, CommonResult};

const DEFAULT_LOCK_NAME: &str = "init_lock";

/// Lock mode used by [`ReaderWriterLock::is_locked`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared access
    Read,
    /// Exclusive access
    Write,
}

#[derive(Debug, Default)]
struct ReadGroup {
    readers: u32,
    hold: Option<OwnedMutexGuard<()>>,
}

#[derive(Debug)]
struct LockInner {
    name: Arc<str>,
    turnstile: Mutex<()>,
    exclusive: Arc<Mutex<()>>,
    group: SyncMutex<ReadGroup>,
    writers: AtomicU32,
    queued_writers: AtomicU32,
    released: Notify,
}

/// Write-preferring, read-reentrant reader/writer lock
///
/// Cloning the lock is cheap and yields a handle to the same lock.
#[derive(Debug, Clone)]
pub struct ReaderWriterLock {
    inner: Arc<LockInner>,
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_NAME)
    }
}

impl ReaderWriterLock {
    /// Create a new lock; the name only shows up in timeout errors and logs
    pub fn new<S: Into<Arc<str>>>(name: S) -> Self {
        Self {
            inner: Arc::new(LockInner {
                name: name.into(),
                turnstile: Mutex::new(()),
                exclusive: Arc::new(Mutex::new(())),
                group: SyncMutex::new(ReadGroup::default()),
                writers: AtomicU32::new(0),
                queued_writers: AtomicU32::new(0),
                released: Notify::new(),
            }),
        }
    }

    /// Lock name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Acquire shared access
    ///
    /// Resolves once no writer holds the lock and no writer that arrived
    /// earlier is still waiting.
    pub async fn read(&self) -> ReadGuard {
        let _turn = self.inner.turnstile.lock().await;
        if self.join_group() {
            return self.read_guard();
        }

        let hold = Arc::clone(&self.inner.exclusive).lock_owned().await;
        self.open_group(hold);
        self.read_guard()
    }

    /// Acquire exclusive access
    pub async fn write(&self) -> WriteGuard {
        let queued = QueuedWriter::enter(&self.inner.queued_writers);
        let turn = self.inner.turnstile.lock().await;
        let hold = Arc::clone(&self.inner.exclusive).lock_owned().await;
        drop(turn);

        self.inner.writers.store(1, Ordering::Release);
        drop(queued);
        WriteGuard { inner: Arc::clone(&self.inner), hold: Some(hold) }
    }

    /// Try to acquire shared access without waiting
    ///
    /// Joins an active read group directly while no writer is queued, so a
    /// reader passing through the turnstile does not cause a spurious
    /// `None`.
    pub fn try_read(&self) -> Option<ReadGuard> {
        if self.queued_writers() == 0 && self.join_group() {
            return Some(self.read_guard());
        }

        let _turn = self.inner.turnstile.try_lock().ok()?;
        if self.join_group() {
            return Some(self.read_guard());
        }

        let hold = Arc::clone(&self.inner.exclusive).try_lock_owned().ok()?;
        self.open_group(hold);
        Some(self.read_guard())
    }

    /// Try to acquire exclusive access without waiting
    pub fn try_write(&self) -> Option<WriteGuard> {
        let _turn = self.inner.turnstile.try_lock().ok()?;
        let hold = Arc::clone(&self.inner.exclusive).try_lock_owned().ok()?;

        self.inner.writers.store(1, Ordering::Release);
        Some(WriteGuard { inner: Arc::clone(&self.inner), hold: Some(hold) })
    }

    /// Acquire shared access, giving up after `duration`
    pub async fn read_timeout(&self, duration: Duration) -> CommonResult<ReadGuard> {
        timeout(duration, self.read())
            .await
            .map_err(|_| CommonError::timeout(format!("read_lock_{}", self.name()), duration))
    }

    /// Acquire exclusive access, giving up after `duration`
    pub async fn write_timeout(&self, duration: Duration) -> CommonResult<WriteGuard> {
        timeout(duration, self.write())
            .await
            .map_err(|_| CommonError::timeout(format!("write_lock_{}", self.name()), duration))
    }

    /// Run `f` while holding shared access
    ///
    /// The lock is released when the returned future completes or is
    /// dropped, whatever `f` resolves to.
    pub async fn with_read<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.read().await;
        f().await
    }

    /// Run `f` while holding exclusive access
    pub async fn with_write<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.write().await;
        f().await
    }

    /// Number of read guards currently held
    pub fn reader_count(&self) -> u32 {
        self.inner.group.lock().readers
    }

    /// Number of write guards currently held (0 or 1)
    pub fn writer_count(&self) -> u32 {
        self.inner.writers.load(Ordering::Acquire)
    }

    /// Number of `write` calls waiting for the lock
    pub fn queued_writers(&self) -> u32 {
        self.inner.queued_writers.load(Ordering::Acquire)
    }

    /// Whether the lock is held in the given mode
    pub fn is_locked(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.reader_count() > 0,
            LockMode::Write => self.writer_count() > 0,
        }
    }

    /// Whether the lock is held in any mode
    pub fn is_held(&self) -> bool {
        self.is_locked(LockMode::Read) || self.is_locked(LockMode::Write)
    }

    /// Whether a writer currently holds the lock
    pub fn is_write_locked(&self) -> bool {
        self.is_locked(LockMode::Write)
    }

    /// Whether at least one reader currently holds the lock
    pub fn is_read_locked(&self) -> bool {
        self.is_locked(LockMode::Read)
    }

    /// Resolve once no writer holds the lock
    ///
    /// Does not acquire anything, so a new writer may take the lock right
    /// after this resolves.
    pub async fn wait_for_unlock(&self) {
        loop {
            let mut notified = pin!(self.inner.released.notified());
            notified.as_mut().enable();
            if !self.is_write_locked() {
                return;
            }
            notified.await;
        }
    }

    fn join_group(&self) -> bool {
        let mut group = self.inner.group.lock();
        if group.hold.is_some() {
            group.readers += 1;
            true
        } else {
            false
        }
    }

    fn open_group(&self, hold: OwnedMutexGuard<()>) {
        let mut group = self.inner.group.lock();
        group.hold = Some(hold);
        group.readers = 1;
    }

    fn read_guard(&self) -> ReadGuard {
        ReadGuard { inner: Arc::clone(&self.inner) }
    }
}

/// Counts a pending `write` call until it owns the lock or is dropped
struct QueuedWriter<'a>(&'a AtomicU32);

impl<'a> QueuedWriter<'a> {
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for QueuedWriter<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Shared access to a [`ReaderWriterLock`]; released on drop
#[derive(Debug)]
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard {
    inner: Arc<LockInner>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let released = {
            let mut group = self.inner.group.lock();
            group.readers = group.readers.saturating_sub(1);
            if group.readers == 0 {
                group.hold.take()
            } else {
                None
            }
        };
        drop(released);
    }
}

/// Exclusive access to a [`ReaderWriterLock`]; released on drop
#[derive(Debug)]
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard {
    inner: Arc<LockInner>,
    hold: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.inner.writers.store(0, Ordering::Release);
        drop(self.hold.take());
        self.inner.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the reader/writer lock
    //!
    //! Ordering guarantees under contention are covered by
    //! `tests/lock_integration.rs`.

    use super::*;

    /// Validates `ReaderWriterLock::read` behavior for concurrent readers.
    ///
    /// Assertions:
    /// - Confirms both guards are counted.
    /// - Confirms the count returns to zero after release.
    #[tokio::test]
    async fn test_multiple_readers_share_lock() {
        let lock = ReaderWriterLock::default();

        let first = lock.read().await;
        let second = lock.read().await;
        assert_eq!(lock.reader_count(), 2);
        assert!(lock.is_read_locked());
        assert!(!lock.is_write_locked());

        drop(first);
        assert_eq!(lock.reader_count(), 1);
        drop(second);
        assert_eq!(lock.reader_count(), 0);
        assert!(!lock.is_held());
    }

    /// Validates `ReaderWriterLock::write` exclusivity.
    ///
    /// Assertions:
    /// - Ensures `try_read` and `try_write` fail while a writer holds the lock.
    /// - Ensures both succeed once the writer is released.
    #[tokio::test]
    async fn test_writer_is_exclusive() {
        let lock = ReaderWriterLock::default();

        let writer = lock.write().await;
        assert_eq!(lock.writer_count(), 1);
        assert!(lock.is_locked(LockMode::Write));
        assert!(lock.try_read().is_none());
        assert!(lock.try_write().is_none());

        drop(writer);
        assert_eq!(lock.writer_count(), 0);
        assert!(lock.try_write().is_some());
        assert!(lock.try_read().is_some());
    }

    #[tokio::test]
    async fn test_try_write_fails_while_reading() {
        let lock = ReaderWriterLock::default();
        let _reader = lock.read().await;
        assert!(lock.try_write().is_none());
        assert!(lock.try_read().is_some());
    }

    /// Validates `with_read`/`with_write` propagate the body's result.
    ///
    /// Assertions:
    /// - Confirms the value and the error reach the caller unchanged.
    /// - Ensures the lock is free afterwards in both cases.
    #[tokio::test]
    async fn test_with_helpers_release_on_error() {
        let lock = ReaderWriterLock::default();

        let value = lock.with_read(|| async { 7 }).await;
        assert_eq!(value, 7);

        let failed: Result<(), &str> = lock.with_write(|| async { Err("boom") }).await;
        assert_eq!(failed, Err("boom"));

        assert!(!lock.is_held());
    }

    /// Validates that a reader queued behind a writer waits.
    ///
    /// Assertions:
    /// - Ensures a reader arriving after a queued writer cannot join the
    ///   active read group.
    #[tokio::test]
    async fn test_queued_writer_blocks_new_readers() {
        let lock = ReaderWriterLock::default();
        let reader = lock.read().await;

        let writer_lock = lock.clone();
        let writer = tokio::spawn(async move {
            let _guard = writer_lock.write().await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(lock.try_read().is_none(), "writer is queued");
        let late = lock.read_timeout(Duration::from_millis(20)).await;
        assert!(matches!(late, Err(CommonError::Timeout { .. })));

        drop(reader);
        writer.await.unwrap();
        assert!(lock.try_read().is_some());
    }

    /// Validates cancellation safety of a pending acquisition.
    ///
    /// Assertions:
    /// - Ensures a timed out write leaves no residue behind.
    #[tokio::test]
    async fn test_write_timeout_leaves_lock_usable() {
        let lock = ReaderWriterLock::new("db");
        let reader = lock.read().await;

        let err = lock.write_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err.to_string(), "Operation 'write_lock_db' timed out after 10ms");

        let second = lock.read().await;
        assert_eq!(lock.reader_count(), 2);
        drop(second);
        drop(reader);
        assert!(lock.try_write().is_some());
    }

    /// Validates `wait_for_unlock` resolution.
    ///
    /// Assertions:
    /// - Ensures it resolves immediately when unlocked.
    /// - Ensures it resolves after the writer releases.
    #[tokio::test]
    async fn test_wait_for_unlock() {
        let lock = ReaderWriterLock::default();
        lock.wait_for_unlock().await;

        let writer = lock.write().await;
        let waiter_lock = lock.clone();
        let waiter = tokio::spawn(async move { waiter_lock.wait_for_unlock().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(writer);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_nested_read_without_queued_writer() {
        let lock = ReaderWriterLock::default();
        let outer = lock.read().await;
        let inner = lock.read().await;
        assert_eq!(lock.reader_count(), 2);
        drop(inner);
        drop(outer);
    }

    /// Validates that a queued reader is woken when the writer releases.
    ///
    /// Assertions:
    /// - Confirms the read future is pending while the write guard lives.
    /// - Confirms dropping the writer wakes and completes the reader.
    #[test]
    fn test_reader_woken_on_write_release() {
        let lock = ReaderWriterLock::default();
        let writer = lock.try_write().unwrap();

        let mut read = tokio_test::task::spawn(lock.read());
        tokio_test::assert_pending!(read.poll());
        assert_eq!(lock.reader_count(), 0);

        drop(writer);
        assert!(read.is_woken());
        let guard = tokio_test::assert_ready!(read.poll());
        assert_eq!(lock.reader_count(), 1);
        drop(guard);
        assert!(!lock.is_held());
    }

    /// Validates `try_read` while another acquisition holds the turnstile.
    ///
    /// Assertions:
    /// - Confirms a reader joins the active group with no writer queued.
    /// - Confirms a queued writer still turns `try_read` away.
    #[test]
    fn test_try_read_joins_group_past_busy_turnstile() {
        let lock = ReaderWriterLock::default();
        let first = lock.try_read().unwrap();

        {
            let _turn = lock.inner.turnstile.try_lock().unwrap();
            let second = lock.try_read();
            assert!(second.is_some());
            assert_eq!(lock.reader_count(), 2);
        }

        let mut write = tokio_test::task::spawn(lock.write());
        tokio_test::assert_pending!(write.poll());
        assert_eq!(lock.queued_writers(), 1);
        assert!(lock.try_read().is_none());

        drop(first);
        assert!(write.is_woken());
        let writer = tokio_test::assert_ready!(write.poll());
        assert_eq!(lock.queued_writers(), 0);
        assert_eq!(lock.writer_count(), 1);
        drop(writer);
    }

    /// Validates that a cancelled `write` stops counting as queued.
    #[test]
    fn test_cancelled_writer_leaves_queue() {
        let lock = ReaderWriterLock::default();
        let reader = lock.try_read().unwrap();

        let mut write = tokio_test::task::spawn(lock.write());
        tokio_test::assert_pending!(write.poll());
        assert_eq!(lock.queued_writers(), 1);

        drop(write);
        assert_eq!(lock.queued_writers(), 0);
        drop(reader);
        assert!(!lock.is_held());
    }
}

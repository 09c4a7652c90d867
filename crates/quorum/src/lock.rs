//! Per-file locking primitives.
//!
//! The coordinator serializes access to each file through one of two
//! lock flavours, chosen by configuration at startup. Both are modeled
//! on semaphores rather than OS mutexes: an acquire and its matching
//! release happen at different points of an async request and must not
//! assume a single owning thread.

use async_trait::async_trait;
use corelib::LockingScheme;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

/// Capability set every per-file lock provides.
///
/// `release_*` is always called by whoever completed the matching
/// `acquire_*`; the trait does not verify it.
#[async_trait]
pub trait FileLock: Send + Sync {
    async fn acquire_read(&self);
    fn release_read(&self);
    async fn acquire_write(&self);
    fn release_write(&self);
}

/// Create the lock flavour selected by the configuration.
pub fn new_file_lock(scheme: LockingScheme) -> Arc<dyn FileLock> {
    match scheme {
        LockingScheme::Standard => Arc::new(StandardLock::new()),
        LockingScheme::ReadWrite => Arc::new(ReadWriteLock::new()),
    }
}

/// Exclusive lock: reads and writes contend for the same single slot.
pub struct StandardLock {
    slot: Semaphore,
}

impl StandardLock {
    pub fn new() -> Self {
        Self {
            slot: Semaphore::new(1),
        }
    }

    async fn acquire(&self) {
        self.slot
            .acquire()
            .await
            .expect("lock semaphore is never closed")
            .forget();
    }

    fn release(&self) {
        self.slot.add_permits(1);
    }
}

impl Default for StandardLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileLock for StandardLock {
    async fn acquire_read(&self) {
        self.acquire().await;
    }

    fn release_read(&self) {
        self.release();
    }

    async fn acquire_write(&self) {
        self.acquire().await;
    }

    fn release_write(&self) {
        self.release();
    }
}

/// Reader/writer lock.
///
/// Readers pass through a one-slot entry gate just long enough to bump
/// the reader count, so they never block each other. A writer seizes
/// the gate for its whole critical section and then waits for the
/// reader count to drain to zero; the gate keeps new readers out until
/// the writer releases.
pub struct ReadWriteLock {
    gate: Semaphore,
    readers: Mutex<u64>,
    drained: Notify,
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(1),
            readers: Mutex::new(0),
            drained: Notify::new(),
        }
    }
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileLock for ReadWriteLock {
    async fn acquire_read(&self) {
        let _gate = self
            .gate
            .acquire()
            .await
            .expect("lock semaphore is never closed");
        *self.readers.lock() += 1;
        // Dropping the permit reopens the gate immediately.
    }

    fn release_read(&self) {
        let mut readers = self.readers.lock();
        *readers -= 1;
        if *readers == 0 {
            self.drained.notify_waiters();
        }
    }

    async fn acquire_write(&self) {
        self.gate
            .acquire()
            .await
            .expect("lock semaphore is never closed")
            .forget();
        loop {
            // Register before checking so a release between the check
            // and the await cannot be missed.
            let drained = self.drained.notified();
            if *self.readers.lock() == 0 {
                break;
            }
            drained.await;
        }
    }

    fn release_write(&self) {
        self.gate.add_permits(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout, Instant};

    #[tokio::test]
    async fn standard_lock_is_exclusive_across_read_and_write() {
        let lock = Arc::new(StandardLock::new());
        lock.acquire_read().await;
        assert!(
            timeout(Duration::from_millis(50), lock.acquire_write())
                .await
                .is_err(),
            "write must wait for the read slot"
        );
        lock.release_read();
        lock.acquire_write().await;
        lock.release_write();
    }

    #[tokio::test]
    async fn readers_overlap_and_writer_excludes_them() {
        let lock: Arc<dyn FileLock> = Arc::new(ReadWriteLock::new());

        // Two read sections held simultaneously: the second acquire must
        // not block while the first is held.
        lock.acquire_read().await;
        timeout(Duration::from_millis(50), lock.acquire_read())
            .await
            .expect("a second reader must enter while the first holds the lock");

        // A writer started now must not enter until both reads end.
        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire_write().await;
                let start = Instant::now();
                sleep(Duration::from_millis(20)).await;
                lock.release_write();
                start
            })
        };

        sleep(Duration::from_millis(50)).await;
        lock.release_read();
        sleep(Duration::from_millis(50)).await;
        let reads_ended = Instant::now();
        lock.release_read();

        let write_started = writer.await.unwrap();
        assert!(
            write_started >= reads_ended,
            "the write section must begin only after both read sections ended"
        );
    }

    #[tokio::test]
    async fn writer_waits_for_reader_drain_then_blocks_new_readers() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.acquire_read().await;

        let writer = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire_write().await;
            })
        };
        sleep(Duration::from_millis(30)).await;
        assert!(!writer.is_finished(), "writer must wait for the reader");

        lock.release_read();
        timeout(Duration::from_millis(200), writer)
            .await
            .expect("writer must proceed once readers drain")
            .unwrap();

        // With the write held, a new reader is kept out at the gate.
        assert!(
            timeout(Duration::from_millis(50), lock.acquire_read())
                .await
                .is_err(),
            "reader must wait for the writer"
        );
        lock.release_write();
        lock.acquire_read().await;
        lock.release_read();
    }

    #[tokio::test]
    async fn release_write_reopens_for_both_flavours() {
        for scheme in [LockingScheme::Standard, LockingScheme::ReadWrite] {
            let lock = new_file_lock(scheme);
            lock.acquire_write().await;
            lock.release_write();
            lock.acquire_read().await;
            lock.release_read();
            lock.acquire_write().await;
            lock.release_write();
        }
    }
}

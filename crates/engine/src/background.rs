//! Worker pool processing runs off the caller's thread.
//!
//! Every unit of work is "process this run": a fresh upload, an untrash or
//! one run of a recalculation. Units wait in a priority queue and are picked
//! up by a fixed set of worker threads. Fresh uploads go before
//! recalculation work so that a large recalculation does not starve
//! ingestion; within a priority, units run in submission order.

use datamill_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::error;

/// Priority of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkPriority {
    /// Recalculation of existing runs
    Recalculation = 0,
    /// Uploads and untrashed runs
    Ingest = 1,
}

/// Pool metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Units waiting in the queue.
    pub queue_depth: usize,
    /// Units currently being executed.
    pub active: usize,
    /// Units completed since the pool was created, including panicked ones.
    pub completed: u64,
    /// Number of worker threads.
    pub workers: usize,
}

struct WorkUnit {
    priority: WorkPriority,
    sequence: u64,
    label: String,
    work: Box<dyn FnOnce() + Send>,
}

impl Eq for WorkUnit {}

impl PartialEq for WorkUnit {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

// Higher priority first, then older first
impl Ord for WorkUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for WorkUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct PoolInner {
    queue: Mutex<BinaryHeap<WorkUnit>>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
    sequence: AtomicU64,
    queue_depth: AtomicUsize,
    active: AtomicUsize,
    max_queue_depth: usize,
    completed: AtomicU64,
}

/// Fixed pool of worker threads fed by a bounded priority queue.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl WorkerPool {
    /// Start `num_threads` workers named `datamill-worker-0`, `datamill-worker-1`, ...
    pub fn new(num_threads: usize, max_queue_depth: usize) -> Result<Self> {
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(BinaryHeap::new()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_queue_depth,
            completed: AtomicU64::new(0),
        });

        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let inner = Arc::clone(&pool.inner);
            let handle = std::thread::Builder::new()
                .name(format!("datamill-worker-{}", i))
                .spawn(move || worker_loop(&inner))
                .map_err(|e| Error::internal(format!("failed to spawn worker thread: {}", e)))?;
            pool.workers.lock().push(handle);
        }
        Ok(pool)
    }

    /// Queue a unit of work.
    ///
    /// Returns [`Error::Backpressure`] if the queue is at capacity or the
    /// pool has been shut down. `label` names the unit in diagnostics.
    pub fn submit(
        &self,
        priority: WorkPriority,
        label: impl Into<String>,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        if self.inner.shutdown.load(AtomicOrdering::Acquire) {
            return Err(Error::Backpressure);
        }
        if self.inner.queue_depth.load(AtomicOrdering::Acquire) >= self.inner.max_queue_depth {
            return Err(Error::Backpressure);
        }

        let unit = WorkUnit {
            priority,
            sequence: self.inner.sequence.fetch_add(1, AtomicOrdering::Relaxed),
            label: label.into(),
            work: Box::new(work),
        };
        {
            let mut queue = self.inner.queue.lock();
            queue.push(unit);
            self.inner.queue_depth.fetch_add(1, AtomicOrdering::Release);
        }
        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until every queued and in-flight unit has completed.
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(AtomicOrdering::Acquire) > 0
            || self.inner.active.load(AtomicOrdering::Acquire) > 0
        {
            self.inner.idle.wait(&mut queue);
        }
    }

    /// Stop accepting work, let workers finish the queue, and join them.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, AtomicOrdering::Release);
        {
            // Holding the lock while notifying rules out a lost wakeup.
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Return a snapshot of pool metrics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(AtomicOrdering::Relaxed),
            active: self.inner.active.load(AtomicOrdering::Relaxed),
            completed: self.inner.completed.load(AtomicOrdering::Relaxed),
            workers: self.num_threads,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active` and wakes drain waiters on drop, also when a unit panics.
struct ActiveGuard<'a> {
    inner: &'a PoolInner,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let prev = self.inner.active.fetch_sub(1, AtomicOrdering::Release);
        self.inner.completed.fetch_add(1, AtomicOrdering::Relaxed);
        if prev == 1 && self.inner.queue_depth.load(AtomicOrdering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.idle.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let unit = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(unit) = queue.pop() {
                    inner.queue_depth.fetch_sub(1, AtomicOrdering::Release);
                    inner.active.fetch_add(1, AtomicOrdering::Release);
                    break unit;
                }
                if inner.shutdown.load(AtomicOrdering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveGuard { inner };
        let label = unit.label;
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(unit.work)) {
            let msg = e
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| e.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            error!(target: "datamill::ingest", unit = %label, panic = %msg, "Work unit panicked");
        }
    }
}

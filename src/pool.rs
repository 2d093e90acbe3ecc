//! WorkerPool - Bounded Background Executor
//!
//! TigerStyle: bounded queues, explicit backpressure, bounded shutdown.
//!
//! # Architecture
//!
//! ```text
//!   foreground                 dedicated tokio runtime
//!  ┌──────────┐  try_send   ┌──────────────┐   ┌──────────┐
//!  │ submit() │ ──────────▶ │ queue[route] │──▶│ worker i │──▶ provider
//!  └────┬─────┘             └──────────────┘   └──────────┘
//!       │ Full / Closed
//!       ▼
//!  run on caller (block_on inside the runtime context)
//! ```
//!
//! Jobs carry a route; equal routes always land on the same worker, so
//! writes for one key run in submission order. A full queue never blocks
//! and never drops: the submitting thread runs the job itself.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::constants::{ASYNC_THREADS_MAX, WORKER_QUEUE_CAPACITY, WORKER_THREAD_NAME_PREFIX};
use crate::error::{StorageError, StorageResult};

/// Unit of background work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Where a submitted job ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// Accepted by a worker queue
    Queued,
    /// Queue full or closed; ran to completion on the submitting thread
    CallerRan,
}

// =============================================================================
// WorkerPool
// =============================================================================

/// Fixed-size pool of async workers on a runtime it owns.
pub struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    senders: RwLock<Vec<mpsc::Sender<Job>>>,
    /// Disconnects once every worker loop has exited
    done_rx: Mutex<std_mpsc::Receiver<()>>,
    threads: usize,
    queue_capacity: usize,
    caller_runs: AtomicU64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("queue_capacity", &self.queue_capacity)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl WorkerPool {
    /// Pool of `threads` workers with the default queue capacity.
    ///
    /// # Errors
    /// Returns [`StorageError::Internal`] if the runtime cannot be built.
    pub fn new(threads: usize) -> StorageResult<Self> {
        Self::with_queue_capacity(threads, WORKER_QUEUE_CAPACITY)
    }

    /// Pool of `threads` workers, each with a queue of `queue_capacity` jobs.
    ///
    /// # Errors
    /// Returns [`StorageError::Internal`] if the runtime cannot be built.
    pub fn with_queue_capacity(threads: usize, queue_capacity: usize) -> StorageResult<Self> {
        // Preconditions
        assert!(threads > 0, "pool needs at least one worker");
        assert!(threads <= ASYNC_THREADS_MAX, "pool size exceeds maximum");
        assert!(queue_capacity > 0, "queue capacity must be positive");

        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name(WORKER_THREAD_NAME_PREFIX)
            .enable_all()
            .build()
            .map_err(|e| StorageError::internal(format!("failed to build worker runtime: {e}")))?;
        let handle = runtime.handle().clone();

        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        let mut senders = Vec::with_capacity(threads);
        for worker in 0..threads {
            let (tx, rx) = mpsc::channel::<Job>(queue_capacity);
            runtime.spawn(worker_loop(worker, rx, done_tx.clone()));
            senders.push(tx);
        }
        drop(done_tx);

        tracing::debug!(threads, queue_capacity, "Worker pool started");

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            senders: RwLock::new(senders),
            done_rx: Mutex::new(done_rx),
            threads,
            queue_capacity,
            caller_runs: AtomicU64::new(0),
        })
    }

    /// Number of workers.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Per-worker queue bound.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Jobs that ran on the submitting thread.
    #[must_use]
    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    /// Whether queues still accept jobs.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        !self.senders.read().is_empty()
    }

    /// Queue `job` on the worker chosen by `route`, or run it here if that
    /// queue is full or the pool is draining.
    pub fn submit<F>(&self, route: u64, job: F) -> Submitted
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job: Job = Box::pin(job);
        let job = {
            let senders = self.senders.read();
            if senders.is_empty() {
                job
            } else {
                let index = (route % senders.len() as u64) as usize;
                match senders[index].try_send(job) {
                    Ok(()) => return Submitted::Queued,
                    Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => job,
                }
            }
        };

        self.caller_runs.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(route, "Worker queue full; running job on caller");
        self.run_blocking(run_job(job));
        Submitted::CallerRan
    }

    /// Run a future to completion on the calling thread with this pool's
    /// runtime as the ambient context (reactor, timers, spawn target).
    pub fn run_blocking<F: Future>(&self, fut: F) -> F::Output {
        let _guard = self.handle.enter();
        futures::executor::block_on(fut)
    }

    /// Stop accepting jobs and wait up to `timeout` for queued and running
    /// jobs to finish. Returns whether every worker finished in time.
    pub fn drain(&self, timeout: Duration) -> bool {
        let closed = std::mem::take(&mut *self.senders.write());
        drop(closed);

        let deadline = Instant::now() + timeout;
        let done_rx = self.done_rx.lock();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match done_rx.recv_timeout(remaining) {
                Ok(()) => continue,
                Err(std_mpsc::RecvTimeoutError::Disconnected) => return true,
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        timeout_ms = timeout.as_millis() as u64,
                        "Worker pool did not drain in time; remaining jobs discarded"
                    );
                    return false;
                }
            }
        }
    }

    /// Cancel whatever is still running and release the runtime threads.
    /// Safe to call from async context and more than once.
    pub fn terminate(&self) {
        self.senders.write().clear();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
            tracing::debug!(threads = self.threads, "Worker pool terminated");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

// =============================================================================
// Workers
// =============================================================================

async fn worker_loop(worker: usize, mut rx: mpsc::Receiver<Job>, _done: std_mpsc::Sender<()>) {
    while let Some(job) = rx.recv().await {
        run_job(job).await;
    }
    tracing::trace!(worker, "Worker exiting");
}

/// Panics stop at the job boundary.
async fn run_job(job: Job) {
    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(panic = %message, "Storage job panicked");
    }
}

//! Parallel task executor
//!
//! A fixed pool of named workers over an unbounded queue, plus a
//! per-task dedicated-thread variant. Used for parallel scanning and
//! construction helpers; tasks are independent and unordered. The
//! completion monitor wakes every waiter, and waiters recheck the pending
//! counter under the monitor so submissions that land while they are
//! parked extend the wait.

use crate::error::{DiError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{debug, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct ExecutorInner {
    queue: Mutex<VecDeque<Task>>,
    /// Workers park here waiting for work.
    queue_cv: Condvar,
    /// Completion waiters park here; the guarded state is the pending
    /// counter, re-read under the monitor.
    monitor: Mutex<()>,
    done_cv: Condvar,
    /// Queued plus running.
    pending: AtomicUsize,
    /// Currently running.
    active: AtomicUsize,
    shut_down: AtomicBool,
    failed: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl ExecutorInner {
    /// Run one task, absorbing panics so executor state stays consistent.
    fn run_task(&self, task: Task) {
        self.active.fetch_add(1, Ordering::AcqRel);
        let outcome = catch_unwind(AssertUnwindSafe(task));
        self.active.fetch_sub(1, Ordering::AcqRel);

        if let Err(panic) = outcome {
            self.failed.fetch_add(1, Ordering::AcqRel);
            let message = panic_message(&panic);

            #[cfg(feature = "logging")]
            warn!(target: "wirecore", error = message.as_str(), "Task panicked");

            *self.last_error.lock() = Some(message);
        }

        self.finish_one();
    }

    /// Decrement pending and wake all completion waiters.
    fn finish_one(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        let _monitor = self.monitor.lock();
        self.done_cv.notify_all();
    }

    fn worker_loop(&self) {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(task) = queue.pop_front() {
                        break Some(task);
                    }
                    // Graceful shutdown: drain the queue, then exit.
                    if self.shut_down.load(Ordering::Acquire) {
                        break None;
                    }
                    self.queue_cv.wait(&mut queue);
                }
            };
            match task {
                Some(task) => self.run_task(task),
                None => break,
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Fixed worker pool with an unbounded queue and atomic progress counters.
///
/// # Examples
///
/// ```rust
/// use wirecore::executor::TaskExecutor;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let executor = TaskExecutor::new(4).unwrap();
/// let counter = Arc::new(AtomicU32::new(0));
///
/// for _ in 0..16 {
///     let counter = Arc::clone(&counter);
///     executor.submit(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }).unwrap();
/// }
///
/// executor.await_completion();
/// assert_eq!(counter.load(Ordering::SeqCst), 16);
/// assert_eq!(executor.pending_tasks(), 0);
/// ```
pub struct TaskExecutor {
    inner: Arc<ExecutorInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    dedicated_seq: AtomicU64,
}

impl TaskExecutor {
    /// Create a pool with `pool_size` named workers.
    pub fn new(pool_size: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(DiError::domain("pool-size must be positive"));
        }

        let inner = Arc::new(ExecutorInner {
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            monitor: Mutex::new(()),
            done_cv: Condvar::new(),
            pending: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            failed: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        });

        let mut workers = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            let worker = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("wirecore-worker-{i}"))
                .spawn(move || worker.worker_loop())
                .map_err(|err| {
                    DiError::ResolutionFailure(format!("failed to spawn worker: {err}"))
                })?;
            workers.push(handle);
        }

        #[cfg(feature = "logging")]
        debug!(target: "wirecore", pool_size, "Started task executor");

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            dedicated_seq: AtomicU64::new(0),
        })
    }

    /// Queue a task on the pool. Rejected after shutdown with counters
    /// untouched.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(DiError::illegal_state("executor has been shut down"));
        }

        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        self.inner.queue.lock().push_back(Box::new(task));
        self.inner.queue_cv.notify_one();
        Ok(())
    }

    /// Run a task on its own named thread instead of the pool; falls back
    /// to the pool when the thread cannot be spawned.
    pub fn submit_dedicated<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(DiError::illegal_state("executor has been shut down"));
        }

        let seq = self.dedicated_seq.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        self.inner.pending.fetch_add(1, Ordering::AcqRel);

        // Parked in a slot so a failed spawn can reroute the task to the
        // pool instead of losing it.
        let slot: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(Some(Box::new(task))));
        let thread_slot = Arc::clone(&slot);

        let spawned = std::thread::Builder::new()
            .name(format!("wirecore-task-{seq}"))
            .spawn(move || {
                if let Some(task) = thread_slot.lock().take() {
                    inner.run_task(task);
                }
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(_err) => {
                #[cfg(feature = "logging")]
                warn!(
                    target: "wirecore",
                    error = %_err,
                    "Dedicated spawn failed, falling back to pool"
                );

                // The pending increment above still covers the task.
                if let Some(task) = slot.lock().take() {
                    self.inner.queue.lock().push_back(task);
                    self.inner.queue_cv.notify_one();
                }
                Ok(())
            }
        }
    }

    /// Block until every submitted task has terminated.
    pub fn await_completion(&self) {
        let mut monitor = self.inner.monitor.lock();
        while self.inner.pending.load(Ordering::Acquire) > 0 {
            self.inner.done_cv.wait(&mut monitor);
        }
    }

    /// Timed [`TaskExecutor::await_completion`]; true when all tasks
    /// terminated within the timeout.
    pub fn await_completion_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut monitor = self.inner.monitor.lock();
        while self.inner.pending.load(Ordering::Acquire) > 0 {
            if self
                .inner
                .done_cv
                .wait_until(&mut monitor, deadline)
                .timed_out()
            {
                return self.inner.pending.load(Ordering::Acquire) == 0;
            }
        }
        true
    }

    /// Queued plus running tasks.
    #[inline]
    pub fn pending_tasks(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Currently running tasks.
    #[inline]
    pub fn active_tasks(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Tasks that terminated by panicking.
    #[inline]
    pub fn failed_tasks(&self) -> usize {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Message of the most recent task failure.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Forbid new submissions; queued and running tasks finish.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.queue_cv.notify_all();
    }

    /// Forbid new submissions and drop every queued task. Running tasks
    /// cannot be interrupted and are left to finish.
    pub fn shutdown_now(&self) {
        self.inner.shut_down.store(true, Ordering::Release);

        let dropped = {
            let mut queue = self.inner.queue.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        if dropped > 0 {
            self.inner.pending.fetch_sub(dropped, Ordering::AcqRel);

            #[cfg(feature = "logging")]
            debug!(target: "wirecore", dropped, "Dropped queued tasks");
        }

        self.inner.queue_cv.notify_all();
        let _monitor = self.inner.monitor.lock();
        self.inner.done_cv.notify_all();
    }

    /// Graceful shutdown followed by a bounded await; joins the workers
    /// when the await succeeds. Returns whether quiescence was reached.
    pub fn close(&self, timeout: Duration) -> bool {
        self.shutdown();
        let quiesced = self.await_completion_timeout(timeout);
        if quiesced {
            for handle in self.workers.lock().drain(..) {
                let _ = handle.join();
            }
        }
        quiesced
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("pending", &self.pending_tasks())
            .field("active", &self.active_tasks())
            .field("failed", &self.failed_tasks())
            .finish()
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

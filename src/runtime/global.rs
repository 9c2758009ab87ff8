//! Process-wide runtime facade.
//!
//! One runtime is active per process at a time. `initialize_runtime` wins
//! the activation compare-and-swap, builds the pool, and publishes it in a
//! module-scoped cell; `submit`/`spawn` dispatch through the cell, and
//! `finalize_*` tears it down so a fresh runtime may be initialized again.
//!
//! The runtime is designed for one external submitter thread at a time
//! (typically the application's main thread). Task bodies running on worker
//! threads may also call [`submit`]/[`spawn`], because the external
//! submitter role stays exclusive; concurrent submission from several
//! non-worker threads is not supported.

use super::config::RuntimeConfig;
use super::{Builder, RuntimeError, Shutdown, ThreadPool};
use crate::future::{Future, Promise, TaskError};
use crate::task::{self, Task};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Transitions false -> true exactly once per runtime generation; the CAS
/// in `initialize` is the activation point, the release store in `finalize`
/// the deactivation point.
static RUNNING: AtomicBool = AtomicBool::new(false);

/// Written only by `initialize` and `finalize`; read on every dispatch.
static ACTIVE_POOL: Mutex<Option<Arc<dyn ThreadPool>>> = Mutex::new(None);

/// Starts the process-wide runtime with `workers` worker threads and
/// per-worker queue capacity `queue_capacity`, using the default
/// work-stealing pool.
///
/// Fails with [`RuntimeError::AlreadyRunning`] if a runtime is active. Use
/// [`Builder`] for the remaining knobs (thread names, stack size, pinning)
/// or for the platform-default worker count.
pub fn initialize_runtime(workers: usize, queue_capacity: usize) -> Result<(), RuntimeError> {
    Builder::new()
        .worker_threads(workers)
        .queue_capacity(queue_capacity)
        .try_init()
}

pub(crate) fn initialize<P: ThreadPool>(cfg: RuntimeConfig) -> Result<(), RuntimeError> {
    if RUNNING
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Err(RuntimeError::AlreadyRunning);
    }

    tracing::debug!(
        workers = cfg.worker_threads,
        queue_capacity = cfg.queue_capacity,
        "runtime starting"
    );

    let pool = Arc::new(P::new(&cfg));
    pool.start();
    *ACTIVE_POOL.lock() = Some(pool);

    Ok(())
}

pub(crate) fn is_running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

#[track_caller]
fn active_pool() -> Arc<dyn ThreadPool> {
    assert!(is_running(), "runtime is not initialized");
    ACTIVE_POOL
        .lock()
        .clone()
        .expect("runtime is not initialized")
}

/// Fire-and-forget submission to the active pool.
///
/// # Panics
///
/// Panics if the runtime is not initialized.
#[track_caller]
pub fn submit(task: Task) {
    active_pool().submit(task);
}

/// Runs `f` on the pool and returns a future for its result. A panic inside
/// `f` is captured and becomes the future's failure.
///
/// # Panics
///
/// Panics if the runtime is not initialized.
#[track_caller]
pub fn spawn<F, R>(f: F) -> Future<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let promise = Promise::new();
    let future = promise.get_future();

    submit(Task::new(move || {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => promise.set_value(value),
            Err(payload) => promise.set_error(TaskError::from_panic(payload)),
        }
    }));

    future
}

/// Waits for all outstanding work to drain, then joins the workers and
/// deactivates the runtime.
///
/// # Panics
///
/// Panics if the runtime is not initialized.
#[track_caller]
pub fn finalize_soft() {
    finalize(Shutdown::Soft);
}

/// Requests immediate termination and joins the workers; queued tasks are
/// dropped unexecuted.
///
/// # Panics
///
/// Panics if the runtime is not initialized.
#[track_caller]
pub fn finalize_hard() {
    finalize(Shutdown::Hard);
}

#[track_caller]
fn finalize(mode: Shutdown) {
    let pool = ACTIVE_POOL
        .lock()
        .take()
        .expect("runtime is not initialized");

    if let Err(error) = pool.finalize(mode) {
        tracing::error!("worker join failure during shutdown: {error:#}");
    }
    drop(pool);

    RUNNING.store(false, Ordering::Release);
}

/// Mean fill ratio of the workers' deques, between 0.0 and 1.0. A load
/// hint, not a linearisable measurement.
///
/// # Panics
///
/// Panics if the runtime is not initialized.
#[track_caller]
pub fn saturation() -> f64 {
    active_pool().saturation()
}

/// Dispatch path for continuations that must not be lost: the pool if one
/// is active, inline on the caller otherwise (e.g. a `then` on an
/// already-ready future after the runtime wound down).
pub(crate) fn submit_or_inline(task: Task) {
    if is_running() {
        if let Some(pool) = ACTIVE_POOL.lock().clone() {
            pool.submit(task);
            return;
        }
    }
    task::execute(task);
}

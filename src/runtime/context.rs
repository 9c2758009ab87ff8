use super::worker::Worker;
use crate::utils::ScopeGuard;
use std::cell::Cell;
use std::ptr;

thread_local! {
    /// Points at the worker whose loop is running on this thread; null on
    /// non-worker threads. Source of the local-first dispatch rule for
    /// promise continuations.
    static CURRENT_WORKER: Cell<*const Worker> = const { Cell::new(ptr::null()) };
}

/// Binds `worker` as the current worker for the calling thread; the binding
/// is cleared when the returned guard drops.
///
/// Safety: the pointer is only dereferenced through [`with_current`] on this
/// same thread, and the pool joins every worker thread before the workers
/// are dropped, so the referent outlives the binding.
pub(crate) fn enter(worker: &Worker) -> ScopeGuard<impl FnOnce()> {
    CURRENT_WORKER.with(|cell| cell.set(worker as *const Worker));
    ScopeGuard::new(|| CURRENT_WORKER.with(|cell| cell.set(ptr::null())))
}

/// Runs `f` with the current worker, if the calling thread is one.
pub(crate) fn with_current<R>(f: impl FnOnce(Option<&Worker>) -> R) -> R {
    CURRENT_WORKER.with(|cell| {
        let worker = cell.get();
        // Safety: see `enter`; non-null only while the worker's loop frame
        // is live on this very thread.
        f(unsafe { worker.as_ref() })
    })
}

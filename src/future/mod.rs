//! Eager future/promise layer over the task runtime.
//!
//! A [`Promise`] is the exclusive producer handle, a [`Future`] the consumer
//! handle, of a shared state carrying a value or a failure. Continuations
//! registered through [`Future::then`] run on the pool once the state is
//! published; publication from a worker thread prefers that worker's own
//! deque so chained continuations stay cache-hot.

use crate::runtime::{context, global};
use crate::task::{self, Task};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod join;
pub use join::{when_all, Join};

mod select;
pub use select::{
    when_any, AnyOf1, AnyOf2, AnyOf3, AnyOf4, AnyOf5, AnyOf6, AnyOf7, AnyOf8, Select,
};

/// Most futures carry zero or one continuation; spill to the heap past this.
const INLINE_CONTINUATIONS: usize = 4;

type Continuations = SmallVec<[Task; INLINE_CONTINUATIONS]>;

/// Failure token captured from a panicking task body.
///
/// Panic payloads (`Box<dyn Any + Send>`) are neither cloneable nor
/// shareable across threads, so the payload is normalized to its message;
/// forwarding continuations, `try_get`, and every clone of the future all
/// observe the same token.
#[derive(Debug, Clone, thiserror::Error)]
#[error("task failed: {message}")]
pub struct TaskError {
    message: Arc<str>,
}

impl TaskError {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message: Arc<str> = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).into()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str().into()
        } else {
            "task panicked".into()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Re-raises the failure on the calling thread, with the original
    /// message as the panic payload.
    pub(crate) fn resume(self) -> ! {
        panic::panic_any(self.message.to_string())
    }
}

struct Inner<T> {
    value: Option<T>,
    error: Option<TaskError>,
    continuations: Continuations,
}

/// Synchronization record jointly owned by a promise and its futures.
///
/// Readiness is published with a release store and observed with acquire
/// loads; value, error, and the continuation list are guarded by the mutex.
/// Publication happens at most once (value xor error).
pub(crate) struct SharedState<T> {
    ready: AtomicBool,
    cv: Condvar,
    inner: Mutex<Inner<T>>,
}

impl<T> SharedState<T> {
    fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            cv: Condvar::new(),
            inner: Mutex::new(Inner {
                value: None,
                error: None,
                continuations: SmallVec::new(),
            }),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Publishes the outcome and wakes waiters. Returns the continuations
    /// registered before publication, in registration order, for the caller
    /// to dispatch outside the lock.
    fn publish(&self, outcome: Result<T, TaskError>) -> Continuations {
        let mut inner = self.inner.lock();
        debug_assert!(!self.is_ready(), "shared state published twice");

        match outcome {
            Ok(value) => inner.value = Some(value),
            Err(error) => inner.error = Some(error),
        }
        self.ready.store(true, Ordering::Release);
        self.cv.notify_all();

        std::mem::take(&mut inner.continuations)
    }

    /// Registers a continuation, or hands it back if the state is already
    /// published so the registerer dispatches it immediately.
    pub(crate) fn register(&self, task: Task) -> Option<Task> {
        let mut inner = self.inner.lock();
        if self.is_ready() {
            return Some(task);
        }
        inner.continuations.push(task);
        None
    }

    fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut inner = self.inner.lock();
        while !self.is_ready() {
            self.cv.wait(&mut inner);
        }
    }

    /// Moves the value out, or clones the error. Second extraction of the
    /// value is a precondition violation.
    fn take(&self) -> Result<T, TaskError> {
        let mut inner = self.inner.lock();
        if let Some(error) = inner.error.clone() {
            return Err(error);
        }
        Ok(inner.value.take().expect("future value already consumed"))
    }
}

impl<T: Clone> SharedState<T> {
    /// Continuation-side read: clones the published outcome, leaving it in
    /// place for sibling continuations and the future's own `get`.
    pub(crate) fn peek(&self) -> Result<T, TaskError> {
        let inner = self.inner.lock();
        if let Some(error) = inner.error.clone() {
            return Err(error);
        }
        Ok(inner
            .value
            .clone()
            .expect("continuation ran before publication"))
    }
}

/// Exclusive producer handle of a [`Future`]'s shared state.
///
/// Yields exactly one future via [`get_future`](Promise::get_future) and is
/// consumed by exactly one of [`set_value`](Promise::set_value) /
/// [`set_error`](Promise::set_error).
pub struct Promise<T> {
    state: Arc<SharedState<T>>,
    future_taken: std::cell::Cell<bool>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState::new()),
            future_taken: std::cell::Cell::new(false),
        }
    }

    /// # Panics
    ///
    /// Panics when called twice on the same promise.
    #[track_caller]
    pub fn get_future(&self) -> Future<T> {
        assert!(
            !self.future_taken.replace(true),
            "get_future() may only be called once per promise"
        );
        Future {
            state: Arc::clone(&self.state),
        }
    }

    /// Publishes the value and dispatches registered continuations with the
    /// local-first policy: onto the current worker's deque when publishing
    /// from a worker thread, inline otherwise or on overflow.
    pub fn set_value(self, value: T) {
        let continuations = self.state.publish(Ok(value));
        dispatch_local_first(continuations);
    }

    /// Publishes a failure. Continuations still run (to forward the failure
    /// downstream) but are routed through the global submission path.
    pub fn set_error(self, error: TaskError) {
        let continuations = self.state.publish(Err(error));
        for task in continuations {
            global::submit_or_inline(task);
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.state.is_ready())
            .finish()
    }
}

/// Local-first continuation dispatch (value publication path).
///
/// Installed in reverse registration order: the owner pops its deque LIFO,
/// so pushing the newest registration first makes execution come back in
/// registration order. A full deque or a non-worker publisher degrades to
/// running the continuation inline.
fn dispatch_local_first(continuations: Continuations) {
    context::with_current(|worker| match worker {
        Some(worker) => {
            for cont in continuations.into_iter().rev() {
                if let Err(cont) = worker.enqueue_local(cont) {
                    task::execute(cont);
                }
            }
        }
        None => {
            for cont in continuations {
                task::execute(cont);
            }
        }
    })
}

/// Consumer handle to an asynchronously produced value.
///
/// Cloneable; every clone observes the same shared state. The value itself
/// is moved out by the first successful [`get`](Future::get) /
/// [`try_get`](Future::try_get).
pub struct Future<T> {
    state: Arc<SharedState<T>>,
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("ready", &self.state.is_ready())
            .finish()
    }
}

impl<T: Send + 'static> Future<T> {
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Blocks until the state is published.
    pub fn wait(&self) {
        self.state.wait();
    }

    /// Blocks until published, then moves the value out, re-raising a
    /// captured failure on the calling thread.
    ///
    /// # Panics
    ///
    /// Re-raises the task's failure, or panics if the value was already
    /// consumed by another handle.
    #[track_caller]
    pub fn get(self) -> T {
        self.try_get().unwrap_or_else(|error| error.resume())
    }

    /// Blocks until published, then moves the value out.
    #[track_caller]
    pub fn try_get(self) -> Result<T, TaskError> {
        self.state.wait();
        self.state.take()
    }

    /// Drops the handle without waiting. Registered continuations still run.
    pub fn detach(self) {}

    /// Registers `f` to run with this future's value once it is published,
    /// and returns a future for `f`'s result.
    ///
    /// If this future fails, `f` is never invoked and the failure is
    /// forwarded to the returned future. May be called multiple times; each
    /// continuation observes its own clone of the value, in registration
    /// order.
    pub fn then<U, F>(&self, f: F) -> Future<U>
    where
        T: Clone,
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let promise = Promise::new();
        let next = promise.get_future();

        let upstream = Arc::clone(&self.state);
        let cont = Task::new(move || match upstream.peek() {
            Ok(value) => match panic::catch_unwind(AssertUnwindSafe(move || f(value))) {
                Ok(out) => promise.set_value(out),
                Err(payload) => promise.set_error(TaskError::from_panic(payload)),
            },
            // Failed upstream: forward without invoking the continuation.
            Err(error) => promise.set_error(error),
        });

        if let Some(cont) = self.state.register(cont) {
            global::submit_or_inline(cont);
        }
        next
    }

    pub(crate) fn state(&self) -> &Arc<SharedState<T>> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::panic::catch_unwind;
    use std::sync::atomic::AtomicUsize;

    assert_impl_all!(Future<i32>: Send, Sync, Clone);
    assert_impl_all!(Promise<i32>: Send);
    assert_impl_all!(TaskError: Send, Sync, Clone);

    #[test]
    fn test_set_value_publishes() {
        let promise = Promise::new();
        let future = promise.get_future();
        assert!(!future.is_ready());

        promise.set_value(7);
        assert!(future.is_ready());
        assert_eq!(future.get(), 7);
    }

    #[test]
    fn test_set_error_observable_through_try_get() {
        let promise = Promise::<i32>::new();
        let future = promise.get_future();

        promise.set_error(TaskError::from_panic(Box::new("boom")));
        let error = future.try_get().unwrap_err();
        assert_eq!(error.message(), "boom");
        assert_eq!(error.to_string(), "task failed: boom");
    }

    #[test]
    fn test_get_reraises_with_original_payload() {
        let promise = Promise::<i32>::new();
        let future = promise.get_future();
        promise.set_error(TaskError::from_panic(Box::new("boom")));

        let payload = catch_unwind(AssertUnwindSafe(move || future.get())).unwrap_err();
        assert_eq!(payload.downcast_ref::<String>().unwrap(), "boom");
    }

    #[test]
    fn test_then_without_runtime_runs_inline() {
        // No runtime and no worker context: dispatch degrades to inline.
        let promise = Promise::new();
        let future = promise.get_future();
        let doubled = future.then(|v: i32| v * 2);

        promise.set_value(21);
        assert_eq!(doubled.get(), 42);
    }

    #[test]
    fn test_then_on_ready_future_runs_inline() {
        let promise = Promise::new();
        let future = promise.get_future();
        promise.set_value(9);

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        future
            .then(move |v| {
                assert_eq!(v, 9);
                hits_clone.fetch_add(1, Ordering::Relaxed);
            })
            .detach();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_continuations_run_in_registration_order() {
        let promise = Promise::new();
        let future = promise.get_future();

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..4 {
            let order = Arc::clone(&order);
            future.then(move |_: i32| order.lock().push(tag)).detach();
        }

        promise.set_value(0);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_failure_skips_continuation_body() {
        let promise = Promise::<i32>::new();
        let future = promise.get_future();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);
        let downstream = future.then(move |_| {
            ran_clone.store(true, Ordering::Relaxed);
            99
        });

        promise.set_error(TaskError::from_panic(Box::new("boom")));
        assert_eq!(downstream.try_get().unwrap_err().message(), "boom");
        assert!(!ran.load(Ordering::Relaxed));
    }

    #[test]
    fn test_multiple_then_each_observe_value() {
        let promise = Promise::new();
        let future = promise.get_future();

        let a = future.then(|v: i32| v);
        let b = future.then(|v: i32| v * 2);
        promise.set_value(10);

        assert_eq!(a.get(), 10);
        assert_eq!(b.get(), 20);
    }

    #[test]
    fn test_get_future_twice_panics() {
        let promise = Promise::<i32>::new();
        let _future = promise.get_future();
        assert!(catch_unwind(AssertUnwindSafe(|| promise.get_future())).is_err());
    }

    #[test]
    fn test_wait_blocks_until_cross_thread_publication() {
        let promise = Promise::new();
        let future = promise.get_future();

        let publisher = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            promise.set_value("done");
        });

        future.wait();
        assert_eq!(future.get(), "done");
        publisher.join().unwrap();
    }
}

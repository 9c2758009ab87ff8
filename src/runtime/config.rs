use super::{global, RuntimeError, ThreadPool, WorkStealingPool};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Default capacity of both per-worker queues.
pub(crate) const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Name fn used for threads spawned by the runtime.
#[derive(Clone)]
pub struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let prev = counter.fetch_add(1, Ordering::Relaxed);
        format!("presto-worker-{}", prev)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The closure itself isn't printable.
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Configures and starts the process-wide runtime.
///
/// ```no_run
/// presto::Builder::new()
///     .worker_threads(4)
///     .queue_capacity(256)
///     .try_init()
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct Builder {
    /// The number of worker threads.
    ///
    /// Defaults to 1 worker per logical core.
    worker_threads: Option<usize>,

    /// Capacity of both the submission queue and the work-stealing deque of
    /// every worker.
    queue_capacity: usize,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    /// Pin each worker to a distinct logical core (Linux only; no-op
    /// elsewhere).
    pin_worker_threads: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            pin_worker_threads: false,
        }
    }

    pub fn worker_threads(mut self, val: usize) -> Self {
        self.worker_threads = Some(val);
        self
    }

    pub fn queue_capacity(mut self, val: usize) -> Self {
        self.queue_capacity = val;
        self
    }

    /// Sets the name of threads spawned by the runtime's thread pool.
    ///
    /// The default name is "presto-worker-{N}".
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// runtime's thread pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Pins worker `i` to logical core `i`. Only effective on Linux.
    pub fn pin_worker_threads(mut self, val: bool) -> Self {
        self.pin_worker_threads = val;
        self
    }

    /// Starts the process-wide runtime with the default work-stealing pool.
    pub fn try_init(self) -> Result<(), RuntimeError> {
        self.try_init_with::<WorkStealingPool>()
    }

    /// Starts the process-wide runtime with a custom pool kind.
    pub fn try_init_with<P: ThreadPool>(self) -> Result<(), RuntimeError> {
        global::initialize::<P>(self.try_into()?)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated runtime configuration, consumed by the pool.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) pin_worker_threads: bool,
}

impl RuntimeConfig {
    fn validate(&self) -> Result<(), RuntimeError> {
        if self.worker_threads == 0 {
            return Err(RuntimeError::InvalidConfig(
                "worker_threads must be greater than 0",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(RuntimeError::InvalidConfig(
                "queue_capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = RuntimeError;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = builder.worker_threads.unwrap_or_else(|| {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        });

        let cfg = RuntimeConfig {
            worker_threads,
            queue_capacity: builder.queue_capacity,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            pin_worker_threads: builder.pin_worker_threads,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    // The config is cloned and sent into each spawned worker thread.
    assert_impl_all!(RuntimeConfig: Send, Sync, Clone);

    #[test]
    fn test_defaults() {
        let cfg = RuntimeConfig::try_from(Builder::new()).unwrap();
        assert!(cfg.worker_threads >= 1);
        assert_eq!(cfg.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!cfg.pin_worker_threads);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = RuntimeConfig::try_from(Builder::new().worker_threads(0));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = RuntimeConfig::try_from(Builder::new().queue_capacity(0));
        assert!(matches!(result, Err(RuntimeError::InvalidConfig(_))));
    }

    #[test]
    fn test_thread_name_fn_counts_up() {
        let cfg = RuntimeConfig::try_from(Builder::new()).unwrap();
        assert_eq!((cfg.thread_name.0)(), "presto-worker-0");
        assert_eq!((cfg.thread_name.0)(), "presto-worker-1");
    }
}

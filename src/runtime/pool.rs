use super::config::RuntimeConfig;
use super::worker::Worker;
use super::{Shutdown, ThreadPool};
use crate::task::Task;
use crate::utils;
use anyhow::{anyhow, Result};
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const RUNNING: u8 = 0;
const SOFT: u8 = 1;
const HARD: u8 = 2;

/// State shared by every worker: the three-valued shutdown flag and the
/// active-worker counter driving the soft-drain exit protocol.
pub(crate) struct Shared {
    shutdown: AtomicU8,
    active_workers: AtomicUsize,
}

impl Shared {
    fn new() -> Self {
        Self {
            shutdown: AtomicU8::new(RUNNING),
            active_workers: AtomicUsize::new(0),
        }
    }

    pub(crate) fn shutdown_state(&self) -> Option<Shutdown> {
        match self.shutdown.load(Ordering::Acquire) {
            RUNNING => None,
            SOFT => Some(Shutdown::Soft),
            _ => Some(Shutdown::Hard),
        }
    }

    fn request_shutdown(&self, mode: Shutdown) {
        let flag = match mode {
            Shutdown::Soft => SOFT,
            Shutdown::Hard => HARD,
        };
        self.shutdown.store(flag, Ordering::Release);
    }

    fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn worker_inactive(&self) {
        self.active_workers.fetch_sub(1, Ordering::Release);
    }

    pub(crate) fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }
}

/// The default pool: N workers with per-worker bounded queues, round-robin
/// external submission, and work stealing between workers.
pub struct WorkStealingPool {
    workers: Arc<Vec<Worker>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    shared: Arc<Shared>,

    /// Round-robin submission cursor. There is one external submitter at a
    /// time, so relaxed ordering suffices.
    cursor: AtomicUsize,

    cfg: RuntimeConfig,
}

impl ThreadPool for WorkStealingPool {
    fn new(cfg: &RuntimeConfig) -> Self {
        let shared = Arc::new(Shared::new());
        let workers = (0..cfg.worker_threads)
            .map(|index| Worker::new(index, cfg.queue_capacity, Arc::clone(&shared)))
            .collect::<Vec<_>>();

        Self {
            workers: Arc::new(workers),
            handles: Mutex::new(Vec::new()),
            shared,
            cursor: AtomicUsize::new(0),
            cfg: cfg.clone(),
        }
    }

    fn start(&self) {
        let mut handles = self.handles.lock();
        assert!(handles.is_empty(), "pool started twice");

        // Thread spawning is asynchronous; hold every worker at a barrier so
        // the pool is fully stealable the moment start() returns.
        let barrier = Arc::new(Barrier::new(self.workers.len() + 1));

        for index in 0..self.workers.len() {
            self.shared.worker_started();

            let workers = Arc::clone(&self.workers);
            let barrier = Arc::clone(&barrier);
            let pin = self.cfg.pin_worker_threads;

            let mut builder = thread::Builder::new().name((self.cfg.thread_name.0)());
            if let Some(stack_size) = self.cfg.thread_stack_size {
                builder = builder.stack_size(stack_size);
            }

            let handle = builder
                .spawn(move || {
                    if pin {
                        utils::thread::pin_to_core(index);
                    }
                    barrier.wait();
                    workers[index].run(&workers);
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        barrier.wait();
    }

    fn submit(&self, mut task: Task) {
        debug_assert!(task.is_engaged(), "submitting an empty task");

        let cursor = self.cursor.load(Ordering::Relaxed);
        self.cursor
            .store((cursor + 1) % self.workers.len(), Ordering::Relaxed);
        let worker = &self.workers[cursor];

        // Backpressure: never drop. Spin with a pause hint, escalating to
        // yielding the OS thread, until the submission queue has room.
        let backoff = Backoff::new();
        loop {
            match worker.submit(task) {
                Ok(()) => return,
                Err(returned) => {
                    task = returned;
                    backoff.snooze();
                }
            }
        }
    }

    fn finalize(&self, mode: Shutdown) -> Result<()> {
        let mut handles = self.handles.lock();
        self.shared.request_shutdown(mode);
        tracing::debug!(?mode, "pool shutting down");

        let panicked = handles
            .drain(..)
            .filter_map(|handle| handle.join().err())
            .count();

        if panicked > 0 {
            Err(anyhow!("{} worker thread(s) panicked", panicked))
        } else {
            Ok(())
        }
    }

    fn saturation(&self) -> f64 {
        let backlog: usize = self.workers.iter().map(Worker::wsq_len).sum();
        let total = (self.workers.len() * self.cfg.queue_capacity) as f64;
        backlog as f64 / total
    }
}

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        // A pool dropped without finalize still joins its threads.
        let mut handles = self.handles.lock();
        if handles.is_empty() {
            return;
        }
        self.shared.request_shutdown(Shutdown::Hard);
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

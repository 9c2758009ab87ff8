//! The scheduling engine: worker threads, per-worker bounded queues, the
//! work-stealing pool, and the process-wide runtime facade.

use crate::task::Task;
use anyhow::Result;

pub mod config;
pub use config::{Builder, RuntimeConfig};

pub(crate) mod context;

pub mod global;
pub use global::{finalize_hard, finalize_soft, initialize_runtime, saturation, spawn, submit};

pub(crate) mod pool;
pub use pool::WorkStealingPool;

pub(crate) mod worker;


/// How the pool winds down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Drain every queue, then join the workers.
    Soft,
    /// Join immediately; queued tasks are dropped unexecuted.
    Hard,
}

/// Pool-kind extension seam.
///
/// Anything that can execute submitted tasks and wind down on request can be
/// installed process-wide through [`Builder::try_init_with`]; the default is
/// [`WorkStealingPool`].
pub trait ThreadPool: Send + Sync + 'static {
    /// Builds a stopped pool from a validated configuration.
    fn new(cfg: &RuntimeConfig) -> Self
    where
        Self: Sized;

    /// Spawns the worker threads.
    fn start(&self);

    /// Fire-and-forget submission. Must never drop the task; may block the
    /// caller for backpressure.
    fn submit(&self, task: Task);

    /// Signals `mode` and joins every worker thread.
    fn finalize(&self, mode: Shutdown) -> Result<()>;

    /// Mean fill ratio of the workers' deques. Heuristic only.
    fn saturation(&self) -> f64;
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("a runtime is already active in this process")]
    AlreadyRunning,

    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(&'static str),
}

pub mod future;
pub use future::{
    when_all, when_any, AnyOf1, AnyOf2, AnyOf3, AnyOf4, AnyOf5, AnyOf6, AnyOf7, AnyOf8, Future,
    Join, Promise, Select, TaskError,
};

pub(crate) mod queue;

pub mod runtime;
pub use runtime::{
    finalize_hard, finalize_soft, initialize_runtime, saturation, spawn, submit, Builder,
    RuntimeConfig, RuntimeError, Shutdown, ThreadPool, WorkStealingPool,
};

pub mod task;
pub use task::Task;

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

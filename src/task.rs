use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// A unit of executable work: a type-erased, heap-owned nullary callable.
///
/// `Task` is the currency of every queue in the runtime. It is either
/// "engaged" (owns a callable) or empty; moving it through a queue transfers
/// sole ownership of the allocation. Running a task consumes the callable
/// and resets the slot to empty, so invoke and destroy are a single step; a
/// task dropped without running releases its callable through `Drop`.
pub struct Task {
    callable: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callable: Some(Box::new(f)),
        }
    }

    /// True if the task still owns its callable.
    pub fn is_engaged(&self) -> bool {
        self.callable.is_some()
    }

    /// Invokes and releases the stored callable, leaving the task empty.
    ///
    /// # Panics
    ///
    /// Panics if the task is empty (already run, or moved out).
    pub fn run(&mut self) {
        let callable = self.callable.take().expect("running an empty task");
        callable();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("engaged", &self.is_engaged())
            .finish()
    }
}

/// Runs a task, containing any unwind.
///
/// Raw submitted tasks carry no failure envelope; a panic here must not tear
/// down the worker loop or a publisher running a continuation inline.
pub(crate) fn execute(mut task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        let err = crate::future::TaskError::from_panic(payload);
        tracing::error!("task panicked: {}", err.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    assert_impl_all!(Task: Send);

    #[test]
    fn test_run_consumes_callable() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        let mut task = Task::new(move || {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });
        assert!(task.is_engaged());

        task.run();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(!task.is_engaged());
    }

    #[test]
    fn test_drop_without_run_releases_captures() {
        let witness = Arc::new(());
        let captured = Arc::clone(&witness);

        let task = Task::new(move || {
            let _ = &captured;
        });
        assert_eq!(Arc::strong_count(&witness), 2);

        drop(task);
        assert_eq!(Arc::strong_count(&witness), 1);
    }

    #[test]
    fn test_execute_contains_panic() {
        execute(Task::new(|| panic!("contained")));
    }
}

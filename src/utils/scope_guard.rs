/// A guard that executes a closure when it goes out of scope.
///
/// Ensures cleanup runs on every exit path, including unwinds. The closure
/// is wrapped in an `Option` so it is taken exactly once on drop.
pub(crate) struct ScopeGuard<F: FnOnce()> {
    closure: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
        }
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_guard_runs_on_drop() {
        let fired = Cell::new(false);
        {
            let _guard = ScopeGuard::new(|| fired.set(true));
            assert!(!fired.get());
        }
        assert!(fired.get());
    }
}

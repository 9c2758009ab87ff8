use parking_lot::{Mutex, MutexGuard};

static RUNTIME_LOCK: Mutex<()> = Mutex::new(());

/// Tests that drive the process-wide runtime must hold this lock so
/// parallel test threads never race initialize/finalize.
pub(crate) fn runtime_lock() -> MutexGuard<'static, ()> {
    RUNTIME_LOCK.lock()
}

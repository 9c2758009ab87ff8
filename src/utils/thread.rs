/// Pins the calling thread to a logical core.
///
/// Only effective on Linux; other platforms have no portable affinity API
/// and the call is a no-op there.
#[cfg(target_os = "linux")]
pub(crate) fn pin_to_core(core_id: usize) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core_id % libc::CPU_SETSIZE as usize, &mut set);

        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            tracing::debug!(core_id, "sched_setaffinity failed; running unpinned");
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn pin_to_core(_core_id: usize) {}

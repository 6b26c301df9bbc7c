//! Thin wrappers over the libc calls the pipeline timestamps with.

/// Monotonic clock reading in microseconds.
///
/// Timeline events and periodic captures are stamped against the same epoch
/// the stream-metadata packet publishes, so the monitor can align them.
pub fn monotonic_micros() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // Cannot fail for CLOCK_MONOTONIC with a valid timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000 + ts.tv_nsec as u64 / 1_000
}

/// Kernel id of the calling thread, as recorded in timeline event packets.
pub fn current_thread_id() -> u64 {
    unsafe { libc::gettid() as u64 }
}

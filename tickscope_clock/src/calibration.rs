use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use crate::cycles::read_cycles;

// 0 means "no override"; conversions then use the measured hardware rate.
static OVERRIDE_CYCLES_PER_SEC: AtomicU64 = AtomicU64::new(0);
static MEASURED_CYCLES_PER_SEC: OnceLock<u64> = OnceLock::new();
static UNAVAILABLE_WARNED: AtomicBool = AtomicBool::new(false);

const PROBE_PERIOD: Duration = Duration::from_millis(10);

/// Overrides the process-wide cycles-per-second rate used by every
/// conversion, effective immediately.
///
/// Meant to be called once during process initialization, before any timer
/// is constructed. Writers are not synchronized against readers; a late
/// write gives other threads stale conversions, nothing worse.
pub fn set_cycles_per_second(rate: u64) {
    OVERRIDE_CYCLES_PER_SEC.store(rate, Ordering::Relaxed);
}

/// Effective cycles-per-second rate: the override if one is set, else the
/// rate measured against the realtime clock on first use and memoized for
/// the process lifetime.
pub fn cycles_per_second() -> u64 {
    let forced = OVERRIDE_CYCLES_PER_SEC.load(Ordering::Relaxed);
    if forced != 0 {
        return forced;
    }
    *MEASURED_CYCLES_PER_SEC.get_or_init(measure_clock_rate)
}

/// `cycles_per_second() / 1000`. Returns 0 when the effective rate is below
/// 1000 cycles/s; formatting treats that as calibration being unavailable
/// rather than dividing by it.
pub fn cycles_per_millisecond() -> u64 {
    cycles_per_second() / 1000
}

// Counts counter ticks across a short sleep on the realtime clock. Runs at
// most once per process. A counter that does not move yields 0, and every
// consumer that divides guards against it.
fn measure_clock_rate() -> u64 {
    let start_cycles = read_cycles();
    let start = Instant::now();

    thread::sleep(PROBE_PERIOD);

    let cycle_diff = read_cycles().saturating_sub(start_cycles);
    let elapsed_ns = start.elapsed().as_nanos();
    if cycle_diff == 0 || elapsed_ns == 0 {
        return 0;
    }
    let rate = (u128::from(cycle_diff) * 1_000_000_000) / elapsed_ns;
    u64::try_from(rate).unwrap_or(u64::MAX)
}

pub(crate) fn warn_calibration_unavailable() {
    if !UNAVAILABLE_WARNED.swap(true, Ordering::Relaxed) {
        log::warn!("effective clock rate is below 1000 cycles/s; reporting durations as unknown");
    }
}

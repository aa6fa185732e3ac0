#[cfg(test)]
#[macro_use]
extern crate approx;

mod calibration;
mod cycles;

pub use calibration::{cycles_per_millisecond, cycles_per_second, set_cycles_per_second};
pub use cycles::read_cycles;
pub use quanta::Instant;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::time::Duration;

/// A measured span of wall time. The underlying type is a u64 representing
/// nanoseconds; it is always positive to simplify reasoning on the user side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct TickDuration(pub u64);

impl TickDuration {
    pub fn as_nanos(&self) -> u64 {
        let Self(nanos) = self;
        *nanos
    }

    pub fn as_micros(&self) -> u64 {
        let Self(nanos) = self;
        *nanos / 1000
    }
}

/// bridge the API with standard Durations.
impl From<Duration> for TickDuration {
    fn from(duration: Duration) -> Self {
        TickDuration(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<TickDuration> for Duration {
    fn from(val: TickDuration) -> Self {
        let TickDuration(nanos) = val;
        Duration::from_nanos(nanos)
    }
}

impl From<u64> for TickDuration {
    fn from(nanos: u64) -> Self {
        TickDuration(nanos)
    }
}

impl From<TickDuration> for u64 {
    fn from(val: TickDuration) -> Self {
        let TickDuration(nanos) = val;
        nanos
    }
}

impl Add for TickDuration {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let TickDuration(lhs) = self;
        let TickDuration(rhs) = rhs;
        TickDuration(lhs + rhs)
    }
}

impl Sub for TickDuration {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        let TickDuration(lhs) = self;
        let TickDuration(rhs) = rhs;
        TickDuration(lhs - rhs)
    }
}

impl AddAssign for TickDuration {
    fn add_assign(&mut self, rhs: Self) {
        let TickDuration(lhs) = self;
        let TickDuration(rhs) = rhs;
        *lhs += rhs;
    }
}

impl SubAssign for TickDuration {
    fn sub_assign(&mut self, rhs: Self) {
        let TickDuration(lhs) = self;
        let TickDuration(rhs) = rhs;
        *lhs -= rhs;
    }
}

// a way to divide a duration by a scalar.
// useful to compute averages for example.
impl<T> Div<T> for TickDuration
where
    T: Into<u64>,
{
    type Output = Self;
    fn div(self, rhs: T) -> Self {
        let TickDuration(lhs) = self;
        TickDuration(lhs / rhs.into())
    }
}

// a way to multiply a duration by a scalar.
impl<T> Mul<T> for TickDuration
where
    T: Into<u64>,
{
    type Output = Self;
    fn mul(self, rhs: T) -> Self {
        let TickDuration(lhs) = self;
        TickDuration(lhs * rhs.into())
    }
}

impl Display for TickDuration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let Self(nanos) = *self;
        if nanos >= 86_400_000_000_000 {
            write!(f, "{:.3} d", nanos as f64 / 86_400_000_000_000.0)
        } else if nanos >= 3_600_000_000_000 {
            write!(f, "{:.3} h", nanos as f64 / 3_600_000_000_000.0)
        } else if nanos >= 60_000_000_000 {
            write!(f, "{:.3} m", nanos as f64 / 60_000_000_000.0)
        } else if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1_000_000_000.0)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1_000_000.0)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1_000.0)
        } else {
            write!(f, "{nanos} ns")
        }
    }
}

/// Sentinel rendered when the effective clock rate is too low to size a
/// millisecond.
pub const UNKNOWN_DURATION: &str = "unknown duration";

/// Converts a cycle count to wall time at the current calibration.
///
/// Computed at microsecond resolution with a 128-bit intermediate, so
/// `cycles * 1_000_000` stays exact over the full u64 range. The nanosecond
/// storage saturates at u64::MAX ns (~584 years). A zero effective rate is
/// reported as a zero duration with a one-time warning, never a division by
/// zero.
pub fn cycles_to_duration(cycles: u64) -> TickDuration {
    let rate = cycles_per_second();
    if rate == 0 {
        calibration::warn_calibration_unavailable();
        return TickDuration::default();
    }
    let micros = u128::from(cycles) * 1_000_000 / u128::from(rate);
    TickDuration(u64::try_from(micros * 1000).unwrap_or(u64::MAX))
}

/// Converts wall time back to a cycle count at the current calibration.
///
/// Inverse of [`cycles_to_duration`] up to one microsecond of rounding for a
/// fixed calibration value. Both directions re-read the calibration, so the
/// results change after [`set_cycles_per_second`].
pub fn duration_to_cycles(duration: TickDuration) -> u64 {
    let rate = cycles_per_second();
    let cycles = u128::from(duration.as_micros()) * u128::from(rate) / 1_000_000;
    u64::try_from(cycles).unwrap_or(u64::MAX)
}

/// Renders a cycle count as `"<minutes> m <seconds> s <milliseconds> ms"`,
/// e.g. 125.456 s of cycles as `"2 m 05 s 456 ms"`.
///
/// When the effective rate is below 1000 cycles/s there is no millisecond to
/// divide by; the call then returns [`UNKNOWN_DURATION`] and warns once.
pub fn format_cycles(cycles: u64) -> String {
    let per_ms = cycles_per_millisecond();
    if per_ms == 0 {
        calibration::warn_calibration_unavailable();
        return UNKNOWN_DURATION.to_string();
    }
    let mut total_ms = cycles / per_ms;
    let ms = total_ms % 1000;
    total_ms /= 1000;
    let secs = total_ms % 60;
    let mins = total_ms / 60;
    format!("{mins} m {secs:02} s {ms:03} ms")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard};

    // Calibration is process-wide; tests that touch it serialize here.
    static CALIBRATION: Mutex<()> = Mutex::new(());

    fn calibration_guard() -> MutexGuard<'static, ()> {
        CALIBRATION.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn override_wins_over_measured_rate() {
        let _g = calibration_guard();
        set_cycles_per_second(12_345_678);
        assert_eq!(cycles_per_second(), 12_345_678);
        assert_eq!(cycles_per_millisecond(), 12_345);
    }

    #[test]
    fn measured_rate_is_plausible() {
        let _g = calibration_guard();
        set_cycles_per_second(0);
        // First call probes the hardware (10ms sleep), later calls are memoized.
        let measured = cycles_per_second();
        assert!(measured > 0);
        assert_eq!(cycles_per_second(), measured);
    }

    #[test]
    fn format_cycles_exact_cases() {
        let _g = calibration_guard();
        set_cycles_per_second(1_000_000);
        assert_eq!(format_cycles(125_456_000), "2 m 05 s 456 ms");
        assert_eq!(format_cycles(0), "0 m 00 s 000 ms");
        // Sub-millisecond counts truncate to zero.
        assert_eq!(format_cycles(999), "0 m 00 s 000 ms");
        assert_eq!(format_cycles(61_000_000), "1 m 01 s 000 ms");
    }

    #[test]
    fn low_rate_reports_unknown_instead_of_dividing() {
        let _g = calibration_guard();
        set_cycles_per_second(999);
        assert_eq!(cycles_per_millisecond(), 0);
        assert_eq!(format_cycles(42), UNKNOWN_DURATION);
    }

    #[test]
    fn conversion_round_trip() {
        let _g = calibration_guard();
        set_cycles_per_second(3_000_000);
        let original = TickDuration::from(Duration::from_micros(1_234_567));
        let cycles = duration_to_cycles(original);
        let back = cycles_to_duration(cycles);
        assert_relative_eq!(
            back.as_micros() as f64,
            original.as_micros() as f64,
            epsilon = 1.0
        );
    }

    #[test]
    fn conversion_is_exact_at_one_mhz() {
        let _g = calibration_guard();
        set_cycles_per_second(1_000_000);
        assert_eq!(
            cycles_to_duration(125_456_000),
            Duration::from_micros(125_456_000).into()
        );
        assert_eq!(
            duration_to_cycles(TickDuration::from(Duration::from_secs(2))),
            2_000_000
        );
    }

    #[test]
    fn huge_cycle_counts_saturate_instead_of_wrapping() {
        let _g = calibration_guard();
        set_cycles_per_second(1_000_000);
        // u64::MAX cycles at 1 MHz is u64::MAX microseconds, past the
        // nanosecond ceiling of the storage.
        assert_eq!(cycles_to_duration(u64::MAX), TickDuration(u64::MAX));
    }

    #[test]
    fn read_cycles_is_monotonic() {
        let a = read_cycles();
        let b = read_cycles();
        assert!(b >= a);
    }

    #[test]
    fn tick_duration_arithmetic() {
        let a = TickDuration(100);
        let b = TickDuration(50);

        assert_eq!(a + b, TickDuration(150));
        assert_eq!(a - b, TickDuration(50));
        assert_eq!(a * 2u32, TickDuration(200));
        assert_eq!(a / 2u32, TickDuration(50));

        let mut c = a;
        c += b;
        assert_eq!(c, TickDuration(150));
        c -= b;
        assert_eq!(c, a);
    }

    #[test]
    fn tick_duration_display() {
        assert_eq!(TickDuration(42).to_string(), "42 ns");
        assert_eq!(TickDuration(42_000).to_string(), "42.000 µs");
        assert_eq!(TickDuration(42_000_000).to_string(), "42.000 ms");
        assert_eq!(TickDuration(1_500_000_000).to_string(), "1.500 s");
        assert_eq!(TickDuration(90_000_000_000).to_string(), "1.500 m");
        assert_eq!(TickDuration(3_600_000_000_000).to_string(), "1.000 h");
        assert_eq!(TickDuration(86_400_000_000_000).to_string(), "1.000 d");
    }

    #[test]
    fn longest_duration() {
        let max: Duration = TickDuration(u64::MAX).into();
        let years = max.as_secs() / 60 / 60 / 24 / 365;
        assert!(years >= 584);
    }
}

//! Stream reference clock
//!
//! All timestamps are counted in fixed 100ns reference units. The external
//! stream clock may read non-positive before the downstream graph starts.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Signed count of reference units.
pub type ClockTime = i64;

/// Reference units per second.
pub const UNITS: ClockTime = 10_000_000;

/// Reference units per millisecond.
pub const UNITS_PER_MS: ClockTime = UNITS / 1000;

/// Convert reference units to a wall-clock duration (negative clamps to zero).
pub fn to_duration(time: ClockTime) -> Duration {
    Duration::from_nanos(time.max(0) as u64 * 100)
}

/// Convert a wall-clock duration to reference units.
pub fn from_duration(duration: Duration) -> ClockTime {
    (duration.as_nanos() / 100) as ClockTime
}

/// Source of stream time and the only suspension primitive used by the pacer
pub trait ReferenceClock: Send + Sync {
    /// Current stream time
    fn now(&self) -> ClockTime;

    /// Suspend the calling thread for `duration` reference units
    fn sleep(&self, duration: ClockTime);
}

/// Wall-clock backed stream time
///
/// Stream time is measured from construction; with a start delay the clock
/// reads non-positive until the delay has elapsed.
pub struct SystemClock {
    origin: Instant,
    start_delay: ClockTime,
}

impl SystemClock {
    /// Create a clock that is running immediately
    pub fn new() -> Self {
        Self::with_start_delay(Duration::ZERO)
    }

    /// Create a clock that starts running after `delay`
    pub fn with_start_delay(delay: Duration) -> Self {
        Self {
            origin: Instant::now(),
            start_delay: from_duration(delay),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceClock for SystemClock {
    fn now(&self) -> ClockTime {
        from_duration(self.origin.elapsed()) - self.start_delay
    }

    fn sleep(&self, duration: ClockTime) {
        std::thread::sleep(to_duration(duration));
    }
}

/// Deterministic clock for simulations and tests
///
/// `sleep` advances the clock instead of blocking.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<ClockTime>,
    sleeps: Mutex<Vec<ClockTime>>,
}

impl ManualClock {
    pub fn new(start: ClockTime) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Jump to an absolute stream time
    pub fn set(&self, time: ClockTime) {
        *self.now.lock() = time;
    }

    /// Move the clock forward without recording a sleep
    pub fn advance(&self, delta: ClockTime) {
        *self.now.lock() += delta;
    }

    /// Sleeps requested so far, in call order
    pub fn sleeps(&self) -> Vec<ClockTime> {
        self.sleeps.lock().clone()
    }
}

impl ReferenceClock for ManualClock {
    fn now(&self) -> ClockTime {
        *self.now.lock()
    }

    fn sleep(&self, duration: ClockTime) {
        self.sleeps.lock().push(duration);
        *self.now.lock() += duration.max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_conversion() {
        assert_eq!(from_duration(Duration::from_millis(1)), UNITS_PER_MS);
        assert_eq!(to_duration(UNITS), Duration::from_secs(1));
        assert_eq!(to_duration(-5), Duration::ZERO);
    }

    #[test]
    fn manual_clock_sleep_advances() {
        let clock = ManualClock::new(100);
        clock.sleep(50);
        clock.advance(10);
        assert_eq!(clock.now(), 160);
        assert_eq!(clock.sleeps(), vec![50]);
    }

    #[test]
    fn delayed_system_clock_reads_non_positive() {
        let clock = SystemClock::with_start_delay(Duration::from_secs(60));
        assert!(clock.now() <= 0);
    }
}

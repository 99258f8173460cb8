// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::time::{Duration, Instant};

/// Monotonic microsecond time source.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;
}

pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

/// Spins until `interval` has elapsed on `clock`. The thread stays on its CPU.
pub fn busy_wait(clock: &dyn Clock, interval: Duration) {
    let start = clock.now_us();
    let wait = interval.as_micros() as u64;
    while clock.now_us().saturating_sub(start) < wait {
        std::hint::spin_loop();
    }
}

/// Rate of change per second of a monotonically increasing counter.
///
/// The counter is read, the thread spins for `interval`, and the counter is
/// read again. A second reading that is not strictly larger (wrap-around or a
/// stuck counter) or a non-positive elapsed time yields `None`.
pub fn measure_rate(
    clock: &dyn Clock,
    interval: Duration,
    mut read: impl FnMut() -> Option<f64>,
) -> Option<f64> {
    let first = read()?;
    let t0 = clock.now_us();
    busy_wait(clock, interval);
    let second = read()?;
    let t1 = clock.now_us();
    rate(first, t0, second, t1)
}

/// `(second - first)` per second between two timestamps in microseconds.
pub fn rate(first: f64, t0: u64, second: f64, t1: u64) -> Option<f64> {
    if second <= first || t1 <= t0 {
        return None;
    }
    Some((second - first) * 1_000_000.0 / (t1 - t0) as f64)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use proptest::prelude::*;

    use super::*;

    /// Advances by a fixed step on every read.
    pub(crate) struct SteppingClock {
        now: AtomicU64,
        step: u64,
    }

    impl SteppingClock {
        pub(crate) fn new(step: u64) -> Self {
            SteppingClock {
                now: AtomicU64::new(0),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now_us(&self) -> u64 {
            self.now.fetch_add(self.step, Ordering::SeqCst) + self.step
        }
    }

    #[test]
    fn busy_wait_covers_the_interval() {
        let clock = SteppingClock::new(100);
        busy_wait(&clock, Duration::from_millis(10));
        assert!(clock.now_us() >= 10_000);
    }

    #[test]
    fn increasing_counter_gives_positive_rate() {
        let clock = SteppingClock::new(1000);
        let mut values = [10.0, 30.0].into_iter();
        let rate = measure_rate(&clock, Duration::from_millis(10), || values.next()).unwrap();
        assert!(rate > 0.0);
    }

    #[test]
    fn flat_or_wrapped_counter_is_invalid() {
        let clock = SteppingClock::new(1000);
        for pair in [[30.0, 30.0], [30.0, 10.0]] {
            let mut values = pair.into_iter();
            assert_eq!(measure_rate(&clock, Duration::from_millis(10), || values.next()), None);
        }
    }

    #[test]
    fn stopped_clock_is_invalid() {
        let clock = SteppingClock::new(0);
        let mut values = [10.0, 30.0].into_iter();
        assert_eq!(measure_rate(&clock, Duration::ZERO, || values.next()), None);
    }

    #[test]
    fn failed_read_is_invalid() {
        let clock = SteppingClock::new(1000);
        let mut values = [Some(10.0), None].into_iter();
        assert_eq!(
            measure_rate(&clock, Duration::from_millis(1), || values.next().flatten()),
            None
        );
    }

    proptest! {
        #[test]
        fn rate_matches_definition(
            first in 0u32..1_000_000,
            delta in 1u32..1_000_000,
            t0 in 0u64..1_000_000,
            dt in 1u64..1_000_000,
        ) {
            let second = first as f64 + delta as f64;
            let expected = delta as f64 * 1_000_000.0 / dt as f64;
            let got = rate(first as f64, t0, second, t0 + dt).unwrap();
            prop_assert!((got - expected).abs() <= expected * 1e-9);
            prop_assert_eq!(rate(second, t0, first as f64, t0 + dt), None);
            prop_assert_eq!(rate(first as f64, t0 + dt, second, t0), None);
        }
    }
}

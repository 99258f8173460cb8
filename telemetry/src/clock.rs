// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::time::Duration;

use crate::sampling::Clock;

/// Source of time stamp counter values.
pub trait TimestampCounter: Send + Sync {
    fn read(&self) -> u64;
}

pub struct Rdtsc;

impl TimestampCounter for Rdtsc {
    fn read(&self) -> u64 {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                // SAFETY: RDTSC has no memory side effects and is available on every x86_64 CPU.
                unsafe { core::arch::x86_64::_rdtsc() }
            } else if #[cfg(target_arch = "x86")] {
                // SAFETY: as above.
                unsafe { core::arch::x86::_rdtsc() }
            } else {
                0
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    tsc: u64,
    us: u64,
}

impl Mark {
    fn take(tsc: &dyn TimestampCounter, clock: &dyn Clock) -> Self {
        Mark {
            tsc: tsc.read(),
            us: clock.now_us(),
        }
    }

    /// MHz between two marks.
    fn mhz_since(&self, begin: &Mark) -> Option<u32> {
        let ticks = self.tsc.checked_sub(begin.tsc)?;
        let us = self.us.checked_sub(begin.us)?;
        if us == 0 {
            return None;
        }
        u32::try_from(ticks / us).ok().filter(|mhz| *mhz <= 0x7fff_ffff)
    }
}

/// Core clock in MHz from the time stamp counter over `window`.
///
/// With `quad_check` the window is split into four measurements and the two
/// closest results are averaged, which filters out a preempted sample.
pub fn measure_cpu_clock(
    tsc: &dyn TimestampCounter,
    clock: &dyn Clock,
    window: Duration,
    quad_check: bool,
) -> Option<u32> {
    let mut slice = window.as_micros() as u64;
    if slice < 1000 {
        return None;
    }
    let runs = if quad_check {
        slice /= 4;
        4
    } else {
        1
    };

    let mut results = [None; 4];
    for result in results.iter_mut().take(runs) {
        let begin = Mark::take(tsc, clock);
        let mut end = begin;
        while end.us.saturating_sub(begin.us) < slice {
            std::hint::spin_loop();
            end = Mark::take(tsc, clock);
        }
        *result = end.mhz_since(&begin);
    }

    if runs == 1 {
        return results[0];
    }

    let mut best: Option<(u32, u32)> = None;
    for i in 0..4 {
        for j in i + 1..4 {
            if let (Some(a), Some(b)) = (results[i], results[j]) {
                let closer = match best {
                    Some((x, y)) => a.abs_diff(b) < x.abs_diff(y),
                    None => true,
                };
                if closer {
                    best = Some((a, b));
                }
            }
        }
    }
    best.map(|(a, b)| ((a as u64 + b as u64) / 2) as u32)
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Live processor telemetry
//!
//! Temperatures, energy, power limits, voltages and clock multipliers read
//! from model specific registers, PCI configuration space and the AMD SMU
//! power management table. Every accessor returns `None` when the hardware
//! does not expose the metric; absence is expected and never an error.
//!

#[macro_use]
extern crate log;

mod amd;
mod centaur;
pub mod clock;
mod context;
mod intel;
pub mod msr_definitions;
mod reader;
pub mod sampling;
mod snapshot;

use std::fmt;

use serde::Serialize;

pub use clock::{measure_cpu_clock, Rdtsc, TimestampCounter};
pub use msr_definitions::{FieldDump, RegisterDump};
pub use reader::{TelemetryConfig, TelemetryReader};
pub use sampling::{busy_wait, measure_rate, Clock, MonotonicClock};
pub use snapshot::TelemetrySnapshot;

/// Integer sentinel used by consumers that cannot represent an absent value.
pub const INVALID_VALUE: i32 = 0x3fff_ffff;

/// A metric that may be unavailable on this machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Reading(Option<f64>);

impl Reading {
    pub const UNAVAILABLE: Reading = Reading(None);

    pub fn get(&self) -> Option<f64> {
        self.0
    }

    pub fn is_available(&self) -> bool {
        self.0.is_some()
    }

    /// The value multiplied by `scale` and truncated, or [`INVALID_VALUE`].
    pub fn legacy(&self, scale: f64) -> i32 {
        match self.0 {
            Some(v) if v.is_finite() => (v * scale) as i32,
            _ => INVALID_VALUE,
        }
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        Reading(value)
    }
}

impl From<Option<u32>> for Reading {
    fn from(value: Option<u32>) -> Self {
        Reading(value.map(f64::from))
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.2}"),
            None => write!(f, "unavailable"),
        }
    }
}

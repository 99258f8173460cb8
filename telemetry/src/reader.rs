// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use cpuid::{ProcessorIdentity, Vendor};
use hwaccess::HardwareAccess;
use smu::SmuConfig;

use crate::amd::Amd;
use crate::centaur::Centaur;
use crate::clock::{Rdtsc, TimestampCounter};
use crate::context::{MsrContext, VendorMsr};
use crate::intel::Intel;
use crate::msr_definitions::{self, RegisterDump};
use crate::sampling::{measure_rate, rate, Clock, MonotonicClock};
use crate::snapshot::TelemetrySnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Busy wait between the two counter reads of a power measurement.
    pub sample_interval: Duration,
    /// Window of the core clock measurement.
    pub clock_window: Duration,
    pub quad_check: bool,
    pub smu: SmuConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            sample_interval: Duration::from_millis(10),
            clock_window: Duration::from_millis(250),
            quad_check: true,
            smu: SmuConfig::default(),
        }
    }
}

fn vendor_reader(vendor: Vendor) -> Option<Box<dyn VendorMsr>> {
    match vendor {
        Vendor::Intel => Some(Box::new(Intel)),
        Vendor::Amd | Vendor::Hygon => Some(Box::new(Amd)),
        Vendor::Centaur | Vendor::Via | Vendor::Zhaoxin => Some(Box::new(Centaur)),
        _ => None,
    }
}

/// Telemetry of one logical processor.
pub struct TelemetryReader {
    ctx: MsrContext,
    vendor: Box<dyn VendorMsr>,
    min_multiplier: Cell<Option<f64>>,
    max_multiplier: Cell<Option<f64>>,
    power_limit_1: Cell<Option<f64>>,
    power_limit_2: Cell<Option<f64>>,
    microcode: Cell<Option<u32>>,
    last_energy: Option<(f64, u64)>,
}

/// Returns the cached value, or reads it and caches a successful result.
fn memoized<T: Copy>(cell: &Cell<Option<T>>, read: impl FnOnce() -> Option<T>) -> Option<T> {
    if let Some(v) = cell.get() {
        return Some(v);
    }
    let v = read()?;
    cell.set(Some(v));
    Some(v)
}

impl TelemetryReader {
    /// Reader for the processor `id`, on its first logical CPU.
    ///
    /// Returns `None` for vendors without register knowledge.
    pub fn new(
        hw: Arc<dyn HardwareAccess>,
        id: &ProcessorIdentity,
        config: TelemetryConfig,
    ) -> Option<Self> {
        Self::with_time_sources(hw, id, config, Arc::new(MonotonicClock::new()), Arc::new(Rdtsc))
    }

    pub fn with_time_sources(
        hw: Arc<dyn HardwareAccess>,
        id: &ProcessorIdentity,
        config: TelemetryConfig,
        clock: Arc<dyn Clock>,
        tsc: Arc<dyn TimestampCounter>,
    ) -> Option<Self> {
        let vendor = match vendor_reader(id.vendor) {
            Some(v) => v,
            None => {
                debug!("No telemetry support for vendor {:?}", id.vendor);
                return None;
            }
        };
        Some(TelemetryReader {
            ctx: MsrContext::new(hw, id.clone(), config, clock, tsc),
            vendor,
            min_multiplier: Cell::new(None),
            max_multiplier: Cell::new(None),
            power_limit_1: Cell::new(None),
            power_limit_2: Cell::new(None),
            microcode: Cell::new(None),
            last_energy: None,
        })
    }

    /// Reads registers on logical CPU `cpu` instead of the first CPU of the cluster.
    pub fn on_cpu(mut self, cpu: u32) -> Self {
        self.ctx.cpu = cpu;
        self
    }

    /// Uses a known core clock instead of measuring it.
    pub fn with_cpu_clock(mut self, mhz: u32) -> Self {
        self.ctx.preset_cpu_clock(mhz);
        self
    }

    pub fn identity(&self) -> &ProcessorIdentity {
        &self.ctx.id
    }

    pub fn cpu(&self) -> u32 {
        self.ctx.cpu
    }

    pub fn label(&self) -> String {
        self.ctx.id.label()
    }

    /// Core temperature in °C.
    pub fn temperature(&self) -> Option<f64> {
        self.vendor.temperature(&self.ctx)
    }

    pub fn package_temperature(&self) -> Option<f64> {
        self.vendor.package_temperature(&self.ctx)
    }

    /// Package energy counter in joules.
    pub fn package_energy(&self) -> Option<f64> {
        self.vendor.package_energy(&self.ctx)
    }

    /// Package power in watts over one sampling interval.
    pub fn package_power_draw(&self) -> Option<f64> {
        measure_rate(&*self.ctx.clock, self.ctx.config.sample_interval, || {
            self.vendor.package_energy(&self.ctx)
        })
    }

    /// Package power in watts since the previous call.
    pub fn package_power_since_last(&mut self) -> Option<f64> {
        let energy = self.package_energy()?;
        let now = self.ctx.clock.now_us();
        let (previous, then) = self.last_energy.replace((energy, now))?;
        rate(previous, then, energy, now)
    }

    /// Sustained power limit in watts.
    pub fn power_limit_1(&self) -> Option<f64> {
        memoized(&self.power_limit_1, || self.vendor.power_limit_1(&self.ctx))
    }

    /// Short term power limit in watts.
    pub fn power_limit_2(&self) -> Option<f64> {
        memoized(&self.power_limit_2, || self.vendor.power_limit_2(&self.ctx))
    }

    /// Core voltage in volts.
    pub fn core_voltage(&self) -> Option<f64> {
        self.vendor.core_voltage(&self.ctx)
    }

    /// Bus clock in MHz.
    pub fn bus_clock(&self) -> Option<f64> {
        self.vendor.bus_clock(&self.ctx)
    }

    pub fn current_multiplier(&self) -> Option<f64> {
        self.vendor.current_multiplier(&self.ctx)
    }

    pub fn min_multiplier(&self) -> Option<f64> {
        memoized(&self.min_multiplier, || self.vendor.min_multiplier(&self.ctx))
    }

    pub fn max_multiplier(&self) -> Option<f64> {
        memoized(&self.max_multiplier, || self.vendor.max_multiplier(&self.ctx))
    }

    /// Integrated graphics energy counter in joules.
    pub fn igpu_energy(&self) -> Option<f64> {
        self.vendor.igpu_energy(&self.ctx)
    }

    pub fn igpu_temperature(&self) -> Option<f64> {
        self.vendor.igpu_temperature(&self.ctx)
    }

    pub fn core_temperature(&self, core: u32) -> Option<f64> {
        self.vendor.core_temperature(&self.ctx, core)
    }

    pub fn microcode_version(&self) -> Option<u32> {
        memoized(&self.microcode, || self.vendor.microcode_version(&self.ctx))
    }

    pub fn stapm_limit(&self) -> Option<f64> {
        self.ctx.smu_table_value(|s| s.stapm_limit())
    }

    pub fn stapm_value(&self) -> Option<f64> {
        self.ctx.smu_table_value(|s| s.stapm_value())
    }

    pub fn fast_value(&self) -> Option<f64> {
        self.ctx.smu_table_value(|s| s.fast_value())
    }

    pub fn slow_value(&self) -> Option<f64> {
        self.ctx.smu_table_value(|s| s.slow_value())
    }

    pub fn smu_version(&self) -> Option<u32> {
        self.ctx.with_smu(|s| Ok(s.smu_version()))
    }

    /// Every documented field of this vendor's registers.
    pub fn msr_dump(&self) -> Vec<RegisterDump> {
        msr_definitions::dump(&*self.ctx.hw, self.ctx.cpu, self.vendor.definitions())
    }

    /// Every metric at once. SMU-backed values all come from one table
    /// transfer.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.ctx.with_held_table(|| TelemetrySnapshot::collect(self))
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::cell::{Cell, OnceCell, RefCell};
use std::sync::Arc;

use cpuid::affinity::ScopedAffinity;
use cpuid::ProcessorIdentity;
use hwaccess::{HardwareAccess, PciAddress};
use smu::{SmuError, SmuSession};

use crate::clock::{measure_cpu_clock, TimestampCounter};
use crate::msr_definitions::{MsrDefinition, RegisterAddress};
use crate::reader::TelemetryConfig;
use crate::sampling::Clock;

/// Per-vendor register knowledge. Unimplemented metrics are unavailable.
pub(crate) trait VendorMsr: Send {
    fn definitions(&self) -> &'static [MsrDefinition];

    fn temperature(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn package_temperature(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    /// Package energy counter in joules.
    fn package_energy(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn power_limit_1(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn power_limit_2(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn core_voltage(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn bus_clock(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn current_multiplier(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn min_multiplier(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn max_multiplier(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    /// Integrated graphics energy counter in joules.
    fn igpu_energy(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn igpu_temperature(&self, _ctx: &MsrContext) -> Option<f64> {
        None
    }

    fn core_temperature(&self, _ctx: &MsrContext, _core: u32) -> Option<f64> {
        None
    }

    fn microcode_version(&self, _ctx: &MsrContext) -> Option<u32> {
        None
    }
}

/// Everything a vendor reader needs: the access handle, the processor it
/// describes and the lazily resolved clock and SMU state.
pub(crate) struct MsrContext {
    pub hw: Arc<dyn HardwareAccess>,
    pub id: ProcessorIdentity,
    pub cpu: u32,
    pub config: TelemetryConfig,
    pub clock: Arc<dyn Clock>,
    pub tsc: Arc<dyn TimestampCounter>,
    cpu_clock: OnceCell<Option<u32>>,
    pub last_pstate: Cell<Option<u32>>,
    smu: OnceCell<Option<RefCell<SmuSession>>>,
    /// Set while SMU reads share one transferred table.
    table_held: Cell<bool>,
}

impl MsrContext {
    pub fn new(
        hw: Arc<dyn HardwareAccess>,
        id: ProcessorIdentity,
        config: TelemetryConfig,
        clock: Arc<dyn Clock>,
        tsc: Arc<dyn TimestampCounter>,
    ) -> Self {
        MsrContext {
            hw,
            cpu: id.index as u32,
            id,
            config,
            clock,
            tsc,
            cpu_clock: OnceCell::new(),
            last_pstate: Cell::new(None),
            smu: OnceCell::new(),
            table_held: Cell::new(false),
        }
    }

    /// Bits `hi..=lo` of an MSR on the telemetry CPU.
    pub fn msr(&self, address: RegisterAddress, hi: u8, lo: u8) -> Option<u64> {
        self.hw.read_msr_range(self.cpu, address.0, hi, lo).ok()
    }

    pub fn msr_raw(&self, address: RegisterAddress) -> Option<u64> {
        self.hw.read_msr(self.cpu, address.0).ok()
    }

    pub fn write_msr(&self, address: RegisterAddress, value: u64) -> Option<()> {
        self.hw.write_msr(self.cpu, address.0, value).ok()
    }

    pub fn pci_read(&self, addr: PciAddress, offset: u16) -> Option<u32> {
        self.hw.read_pci_config32(addr, offset).ok()
    }

    pub fn pci_write(&self, addr: PciAddress, offset: u16, value: u32) -> Option<()> {
        self.hw.write_pci_config32(addr, offset, value).ok()
    }

    pub fn find_pci_device(&self, vendor: u16, device: u16) -> Option<PciAddress> {
        self.hw.find_pci_device(vendor, device, self.id.index as u32).ok()
    }

    pub fn preset_cpu_clock(&mut self, mhz: u32) {
        self.cpu_clock = OnceCell::from(Some(mhz));
    }

    /// Core clock in MHz, measured once with the thread pinned to the CPU.
    pub fn cpu_clock(&self) -> Option<u32> {
        *self.cpu_clock.get_or_init(|| {
            let _pinned = match ScopedAffinity::pin(self.cpu as usize) {
                Ok(guard) => guard,
                Err(e) => {
                    debug!("Not measuring the clock of CPU {}: {e}", self.cpu);
                    return None;
                }
            };
            let mhz = measure_cpu_clock(
                &*self.tsc,
                &*self.clock,
                self.config.clock_window,
                self.config.quad_check,
            );
            debug!("CPU {} clock: {mhz:?} MHz", self.cpu);
            mhz
        })
    }

    /// Runs `f` on the SMU session, opening it on first use.
    ///
    /// A session that cannot be opened stays unavailable for the lifetime of
    /// the context.
    pub fn with_smu<T>(
        &self,
        f: impl FnOnce(&mut SmuSession) -> Result<T, SmuError>,
    ) -> Option<T> {
        let session = self.smu.get_or_init(|| {
            let opened =
                SmuSession::new(self.hw.clone(), &self.id, self.config.smu).and_then(|mut s| {
                    s.init_pm_table()?;
                    Ok(s)
                });
            match opened {
                Ok(s) => Some(RefCell::new(s)),
                Err(e) => {
                    debug!("SMU unavailable: {e}");
                    None
                }
            }
        });
        let mut session = session.as_ref()?.borrow_mut();
        match f(&mut session) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!("SMU query failed: {e}");
                None
            }
        }
    }

    /// A float from a freshly transferred power management table, or from
    /// the held one inside [`Self::with_held_table`].
    pub fn smu_table_value(
        &self,
        read: impl FnOnce(&SmuSession) -> Result<f32, SmuError>,
    ) -> Option<f64> {
        let held = self.table_held.get();
        self.with_smu(|s| {
            if !held {
                s.update_pm_table()?;
            }
            read(s)
        })
        .map(f64::from)
    }

    /// Transfers the table once and runs `f` with every SMU read served from
    /// that copy. If the transfer fails, reads inside `f` transfer as usual.
    pub fn with_held_table<T>(&self, f: impl FnOnce() -> T) -> T {
        let transferred = self.with_smu(|s| s.update_pm_table()).is_some();
        self.table_held.set(transferred);
        let value = f();
        self.table_held.set(false);
        value
    }
}

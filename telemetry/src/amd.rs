// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use hwaccess::{extract_bits, PciAddress};

use crate::context::{MsrContext, VendorMsr};
use crate::msr_definitions::amd::AMD_MSR_DEFINITIONS;
use crate::msr_definitions::{MsrDefinition, RegisterAddress};

const AMD_VENDOR_ID: u16 = 0x1022;

/// SMN address of the reported control temperature (Tctl) on Zen.
const ZEN_THM_TCON_CUR_TMP: u32 = 0x59800;
const ZEN_SMN_INDEX: u16 = 0x60;
const ZEN_SMN_DATA: u16 = 0x64;
/// Tctl is reported with a 49 degree offset in this range.
const ZEN_CUR_TEMP_RANGE_SEL: u32 = 0x80000;

/// Northbridge SMU index/data pair and the thermal register behind it.
const NB_SMU_INDEX: u16 = 0xb8;
const NB_SMU_DATA: u16 = 0xbc;
const NB_SMU_REPORTED_TEMP: u32 = 0xd820_0ca4;

const K10_REPORTED_TEMP: u16 = 0xa4;
// CurTmpTjSel, bits 17:16. Both set selects the range offset by 49 degrees.
// Readers that compare the masked value against 0x3000 never see it set and
// never apply the offset; this one does.
const K10_TEMP_RANGE_SEL: u32 = 0x30000;
const K8_THERMTRIP_STATUS: u16 = 0xe4;
const K8_MISC_CONTROL: u16 = 0x1103;

/// Tctl offsets of parts whose control temperature is not the die temperature.
const TCTL_OFFSETS: [(&str, f64); 6] = [
    ("1600X", -20.0),
    ("1700X", -20.0),
    ("1800X", -20.0),
    ("2700X", -10.0),
    ("Threadripper 19", -27.0),
    ("Threadripper 29", -27.0),
];

/// Family 12h divisor ids.
const FAMILY_12H_DIVISORS: [f64; 9] = [1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0];

/// P-state register layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MultiplierLayout {
    /// fid[8:4], did[3:0] through the divisor table.
    Llano,
    /// did[8:4], lsd[3:0] against the measured core clock.
    Bobcat,
    /// did[8:6], fid[5:0], power of two divisor.
    K10,
    /// did[13:8], fid[7:0].
    Zen,
    /// fid[11:0] in 5 MHz steps.
    Zen5,
}

const MULTIPLIER_LAYOUTS: [(i32, MultiplierLayout); 10] = [
    (0x10, MultiplierLayout::K10),
    (0x11, MultiplierLayout::K10),
    (0x12, MultiplierLayout::Llano),
    (0x14, MultiplierLayout::Bobcat),
    (0x15, MultiplierLayout::K10),
    (0x16, MultiplierLayout::K10),
    (0x17, MultiplierLayout::Zen),
    (0x18, MultiplierLayout::Zen),
    (0x19, MultiplierLayout::Zen),
    (0x1a, MultiplierLayout::Zen5),
];

fn multiplier_layout(ext_family: i32) -> Option<MultiplierLayout> {
    MULTIPLIER_LAYOUTS
        .iter()
        .find(|(family, _)| *family == ext_family)
        .map(|(_, layout)| *layout)
}

fn pstate_register(index: u32) -> RegisterAddress {
    RegisterAddress(RegisterAddress::AMD_PSTATE_0.0 + index)
}

pub(crate) struct Amd;

impl Amd {
    fn is_apu(ctx: &MsrContext) -> bool {
        ctx.id.brand.contains("APU") || ctx.id.brand.contains("Radeon ")
    }

    /// Lowest performance P-state with its enable bit set.
    fn last_pstate(ctx: &MsrContext) -> Option<u32> {
        if let Some(index) = ctx.last_pstate.get() {
            return Some(index);
        }
        let last = RegisterAddress::AMD_PSTATE_7.0 - RegisterAddress::AMD_PSTATE_0.0;
        let index = (0..=last).rev().find(|i| ctx.msr(pstate_register(*i), 63, 63) == Some(1))?;
        ctx.last_pstate.set(Some(index));
        Some(index)
    }

    fn current_pstate(ctx: &MsrContext) -> Option<u32> {
        ctx.msr(RegisterAddress::AMD_PSTATE_STATUS, 2, 0).map(|p| p as u32)
    }

    fn multiplier(ctx: &MsrContext, pstate: u32) -> Option<f64> {
        let family = ctx.id.ext_family;
        let Some(layout) = multiplier_layout(family) else {
            warn!("No P-state layout for AMD family {family:#x}");
            return None;
        };
        let reg = ctx.msr_raw(pstate_register(pstate))?;
        let field = |hi, lo| extract_bits(reg, hi, lo) as f64;
        let magic = if family == 0x11 { 8.0 } else { 16.0 };
        let divisor = if Self::is_apu(ctx) { 1.0 } else { 2.0 };

        let mult = match layout {
            MultiplierLayout::Llano => {
                let div = FAMILY_12H_DIVISORS.get(extract_bits(reg, 3, 0) as usize)?;
                (field(8, 4) + magic) / div
            }
            MultiplierLayout::Bobcat => {
                let clock = ctx.cpu_clock()?;
                let base = ((clock + 5) / 100) as f64;
                (base + magic) / (field(8, 4) + field(3, 0) * 0.25 + 1.0)
            }
            MultiplierLayout::K10 => {
                (field(5, 0) + magic) / (1u64 << extract_bits(reg, 8, 6)) as f64 / divisor
            }
            MultiplierLayout::Zen => {
                let did = field(13, 8);
                if did == 0.0 {
                    return None;
                }
                field(7, 0) / did * 2.0
            }
            MultiplierLayout::Zen5 => field(11, 0) * 5.0 / 100.0,
        };
        mult.is_finite().then_some(mult)
    }

    fn tctl_offset(brand: &str) -> f64 {
        TCTL_OFFSETS
            .iter()
            .find(|(part, _)| brand.contains(part))
            .map_or(0.0, |(_, offset)| *offset)
    }

    fn zen_temperature(ctx: &MsrContext) -> Option<f64> {
        ctx.pci_write(PciAddress::HOST_BRIDGE, ZEN_SMN_INDEX, ZEN_THM_TCON_CUR_TMP)?;
        let raw = ctx.pci_read(PciAddress::HOST_BRIDGE, ZEN_SMN_DATA)?;
        let mut offset = Self::tctl_offset(&ctx.id.brand);
        if raw & ZEN_CUR_TEMP_RANGE_SEL != 0 {
            offset -= 49.0;
        }
        Some(0.001 * f64::from((raw >> 21) * 125) + offset)
    }

    /// Misc control device of the K10 derived families, `None` for parts
    /// reporting through the northbridge SMU.
    fn k10_misc_device(family: i32, model: i32) -> Option<Option<u16>> {
        let device = match (family, model & 0xf0) {
            (0x10, _) => 0x1203,
            (0x11, _) => 0x1303,
            (0x12 | 0x14, _) => 0x1703,
            (0x15, 0x00) => 0x1603,
            (0x15, 0x10) => 0x1403,
            (0x15, 0x30) => 0x141d,
            (0x15, 0x60 | 0x70) => return Some(None),
            (0x16, 0x00) => 0x1533,
            (0x16, 0x30) => 0x1583,
            _ => return None,
        };
        Some(Some(device))
    }

    fn k10_temperature(ctx: &MsrContext) -> Option<f64> {
        let (family, model) = (ctx.id.ext_family, ctx.id.ext_model);
        let raw = match Self::k10_misc_device(family, model)? {
            Some(device) => {
                let addr = ctx.find_pci_device(AMD_VENDOR_ID, device)?;
                ctx.pci_read(addr, K10_REPORTED_TEMP)?
            }
            None => {
                ctx.pci_write(PciAddress::HOST_BRIDGE, NB_SMU_INDEX, NB_SMU_REPORTED_TEMP)?;
                ctx.pci_read(PciAddress::HOST_BRIDGE, NB_SMU_DATA)?
            }
        };

        let lowered_range =
            matches!(family, 0x15 | 0x16) && raw & K10_TEMP_RANGE_SEL == K10_TEMP_RANGE_SEL;
        if !lowered_range {
            return Some(f64::from((raw >> 21) & 0x7ff) / 8.0);
        }
        let mask = if family == 0x15 && model & 0xf0 == 0 { 0x7fc } else { 0x7ff };
        Some(f64::from((raw >> 21) & mask) / 8.0 - 49.0)
    }

    fn k8_temperature(ctx: &MsrContext) -> Option<f64> {
        let model = ctx.id.ext_model;
        let mut offset = -49.0;
        if model >= 0x69 && !matches!(model, 0xc1 | 0x6c | 0x7c) {
            offset += 21.0;
        }
        let addr = ctx.find_pci_device(AMD_VENDOR_ID, K8_MISC_CONTROL)?;
        ctx.pci_write(addr, K8_THERMTRIP_STATUS, 0)?;
        let raw = ctx.pci_read(addr, K8_THERMTRIP_STATUS)?;
        Some(f64::from((raw >> 16) & 0xff) + offset)
    }
}

impl VendorMsr for Amd {
    fn definitions(&self) -> &'static [MsrDefinition] {
        AMD_MSR_DEFINITIONS.as_slice()
    }

    fn temperature(&self, ctx: &MsrContext) -> Option<f64> {
        ctx.smu_table_value(|s| s.core_temperature(0))
    }

    fn package_temperature(&self, ctx: &MsrContext) -> Option<f64> {
        match ctx.id.ext_family {
            f if f >= 0x17 => Self::zen_temperature(ctx),
            0x10..=0x16 => Self::k10_temperature(ctx),
            0x0f => Self::k8_temperature(ctx),
            _ => None,
        }
    }

    fn package_energy(&self, ctx: &MsrContext) -> Option<f64> {
        if ctx.id.ext_family < 0x17 {
            return None;
        }
        let esu = ctx.msr(RegisterAddress::AMD_PWR_UNIT, 12, 8)?;
        let raw = ctx.msr(RegisterAddress::AMD_PKG_ENERGY_STAT, 31, 0)?;
        Some(raw as f64 / (1u64 << esu) as f64)
    }

    fn power_limit_1(&self, ctx: &MsrContext) -> Option<f64> {
        ctx.smu_table_value(|s| s.slow_limit())
    }

    fn power_limit_2(&self, ctx: &MsrContext) -> Option<f64> {
        ctx.smu_table_value(|s| s.fast_limit())
    }

    fn core_voltage(&self, ctx: &MsrContext) -> Option<f64> {
        let (family, model) = (ctx.id.ext_family, ctx.id.ext_model);
        let reg = ctx.msr_raw(pstate_register(Self::current_pstate(ctx)?))?;
        let step = if family < 0x15 || (family == 0x15 && model < 0x10) {
            0.0125
        } else {
            0.00625
        };
        let vid = if family < 0x17 {
            extract_bits(reg, 15, 9)
        } else {
            extract_bits(reg, 21, 14)
        };
        Some(1.55 - step * vid as f64)
    }

    fn bus_clock(&self, ctx: &MsrContext) -> Option<f64> {
        let max_val = ctx.msr(RegisterAddress::AMD_PSTATE_CURRENT_LIMIT, 6, 4)? as u32;
        let pstate = Self::last_pstate(ctx)?.checked_sub(max_val)?;
        let mult = Self::multiplier(ctx, pstate)?;
        if mult <= 0.0 {
            return None;
        }
        Some(f64::from(ctx.cpu_clock()?) / mult)
    }

    fn current_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::multiplier(ctx, Self::current_pstate(ctx)?)
    }

    fn min_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::multiplier(ctx, Self::last_pstate(ctx)?)
    }

    fn max_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::multiplier(ctx, 0)
    }

    fn igpu_temperature(&self, ctx: &MsrContext) -> Option<f64> {
        ctx.smu_table_value(|s| s.apu_temperature())
    }

    fn core_temperature(&self, ctx: &MsrContext, core: u32) -> Option<f64> {
        ctx.smu_table_value(|s| s.core_temperature(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_by_family() {
        assert_eq!(multiplier_layout(0x0f), None);
        assert_eq!(multiplier_layout(0x13), None);
        assert_eq!(multiplier_layout(0x16), Some(MultiplierLayout::K10));
        assert_eq!(multiplier_layout(0x18), Some(MultiplierLayout::Zen));
        assert_eq!(multiplier_layout(0x1a), Some(MultiplierLayout::Zen5));
    }

    #[test]
    fn tctl_offsets() {
        assert_eq!(Amd::tctl_offset("AMD Ryzen 7 1800X Eight-Core Processor"), -20.0);
        assert_eq!(Amd::tctl_offset("AMD Ryzen 7 2700X Eight-Core Processor"), -10.0);
        assert_eq!(Amd::tctl_offset("AMD Ryzen Threadripper 2950X 16-Core Processor"), -27.0);
        assert_eq!(Amd::tctl_offset("AMD Ryzen 9 7950X 16-Core Processor"), 0.0);
    }

    #[test]
    fn k10_device_selection() {
        assert_eq!(Amd::k10_misc_device(0x10, 0x04), Some(Some(0x1203)));
        assert_eq!(Amd::k10_misc_device(0x14, 0x02), Some(Some(0x1703)));
        assert_eq!(Amd::k10_misc_device(0x15, 0x38), Some(Some(0x141d)));
        assert_eq!(Amd::k10_misc_device(0x15, 0x65), Some(None));
        assert_eq!(Amd::k10_misc_device(0x16, 0x30), Some(Some(0x1583)));
        assert_eq!(Amd::k10_misc_device(0x16, 0x60), None);
    }
}

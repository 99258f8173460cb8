// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use cpuid::CpuFeatures;

use crate::context::{MsrContext, VendorMsr};
use crate::msr_definitions::intel::INTEL_MSR_DEFINITIONS;
use crate::msr_definitions::{MsrDefinition, RegisterAddress};

const THERM_STATUS_VALID: u64 = 1 << 31;

pub(crate) struct Intel;

impl Intel {
    fn tj_max(ctx: &MsrContext) -> Option<f64> {
        ctx.msr(RegisterAddress::IA32_TEMPERATURE_TARGET, 23, 16).map(|t| t as f64)
    }

    /// Joules per energy counter increment.
    fn energy_unit(ctx: &MsrContext) -> Option<f64> {
        let esu = ctx.msr(RegisterAddress::MSR_RAPL_POWER_UNIT, 12, 8)?;
        Some(1.0 / (1u64 << esu) as f64)
    }

    fn power_limit(ctx: &MsrContext, hi: u8, lo: u8) -> Option<f64> {
        let pu = ctx.msr(RegisterAddress::MSR_RAPL_POWER_UNIT, 3, 0)?;
        let limit = ctx.msr(RegisterAddress::MSR_PKG_POWER_LIMIT, hi, lo)?;
        Some(limit as f64 / (1u64 << pu) as f64)
    }

    /// Ratio and voltage fields read back as zero are treated as absent.
    fn nonzero(value: u64) -> Option<f64> {
        (value != 0).then_some(value as f64)
    }

    /// Family 6 and later expose PERF_STATUS ratios, PLATFORM_INFO and the
    /// turbo ratio limit. Older parts only have the legacy fallbacks.
    fn modern(ctx: &MsrContext) -> Option<()> {
        (ctx.id.ext_family >= 6).then_some(())
    }
}

impl VendorMsr for Intel {
    fn definitions(&self) -> &'static [MsrDefinition] {
        INTEL_MSR_DEFINITIONS.as_slice()
    }

    fn temperature(&self, ctx: &MsrContext) -> Option<f64> {
        if !ctx.id.features.contains(CpuFeatures::INTEL_DTS) {
            return None;
        }
        let status = ctx.msr_raw(RegisterAddress::IA32_THERM_STATUS)?;
        if status & THERM_STATUS_VALID == 0 {
            return None;
        }
        let readout = hwaccess::extract_bits(status, 22, 16) as f64;
        Some(Self::tj_max(ctx)? - readout)
    }

    fn package_temperature(&self, ctx: &MsrContext) -> Option<f64> {
        if !ctx.id.features.contains(CpuFeatures::INTEL_PTM) {
            return None;
        }
        let readout = ctx.msr(RegisterAddress::IA32_PACKAGE_THERM_STATUS, 22, 16)? as f64;
        Some(Self::tj_max(ctx)? - readout)
    }

    fn package_energy(&self, ctx: &MsrContext) -> Option<f64> {
        let raw = ctx.msr(RegisterAddress::MSR_PKG_ENERGY_STATUS, 31, 0)?;
        Some(raw as f64 * Self::energy_unit(ctx)?)
    }

    fn power_limit_1(&self, ctx: &MsrContext) -> Option<f64> {
        Self::power_limit(ctx, 14, 0)
    }

    fn power_limit_2(&self, ctx: &MsrContext) -> Option<f64> {
        Self::power_limit(ctx, 46, 32)
    }

    fn core_voltage(&self, ctx: &MsrContext) -> Option<f64> {
        Self::modern(ctx)?;
        let vid = ctx.msr(RegisterAddress::IA32_PERF_STATUS, 47, 32)?;
        Self::nonzero(vid).map(|v| v / 8192.0)
    }

    fn bus_clock(&self, ctx: &MsrContext) -> Option<f64> {
        Self::modern(ctx)?;
        let ratio = Self::nonzero(ctx.msr(RegisterAddress::MSR_PLATFORM_INFO, 15, 8)?)?;
        Some(ctx.cpu_clock()? as f64 / ratio)
    }

    fn current_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::modern(ctx)
            .and_then(|_| ctx.msr(RegisterAddress::IA32_PERF_STATUS, 15, 8))
            .or_else(|| {
                let reg = ctx.msr_raw(RegisterAddress::IA32_EBL_CR_POWERON)?;
                Some((reg >> 22) & 0x1f)
            })
            .map(|ratio| ratio as f64)
    }

    fn min_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::modern(ctx)?;
        ctx.msr(RegisterAddress::MSR_PLATFORM_INFO, 47, 40).map(|ratio| ratio as f64)
    }

    fn max_multiplier(&self, ctx: &MsrContext) -> Option<f64> {
        Self::modern(ctx)
            .and_then(|_| ctx.msr(RegisterAddress::MSR_TURBO_RATIO_LIMIT, 7, 0))
            .or_else(|| {
                let reg = ctx.msr_raw(RegisterAddress::IA32_PERF_STATUS)?;
                Some((reg >> 40) & 0x1f)
            })
            .map(|ratio| ratio as f64)
    }

    fn igpu_energy(&self, ctx: &MsrContext) -> Option<f64> {
        let raw = ctx.msr(RegisterAddress::MSR_PP1_ENERGY_STATUS, 31, 0)?;
        Some(raw as f64 * Self::energy_unit(ctx)?)
    }

    fn microcode_version(&self, ctx: &MsrContext) -> Option<u32> {
        ctx.msr(RegisterAddress::IA32_BIOS_SIGN_ID, 63, 32).map(|v| v as u32)
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use crate::context::{MsrContext, VendorMsr};
use crate::msr_definitions::centaur::CENTAUR_MSR_DEFINITIONS;
use crate::msr_definitions::{MsrDefinition, RegisterAddress};

/// Selector written to the Zhaoxin index register for the die sensor.
const ZHAOXIN_DIE_SENSOR: u64 = 0x19;

/// Front side bus frequency in MHz by FSB_FREQ[2:0].
const FSB_FREQUENCIES: [f64; 7] = [266.67, 133.33, 200.0, 166.67, 333.33, 100.0, 400.0];

pub(crate) struct Centaur;

impl Centaur {
    fn temperature_register(ctx: &MsrContext) -> Option<RegisterAddress> {
        match (ctx.id.ext_family, ctx.id.ext_model) {
            (7, 0x6b) => {
                ctx.write_msr(RegisterAddress::ZHAOXIN_TEMPERATURE_INDEX, ZHAOXIN_DIE_SENSOR)?;
                Some(RegisterAddress::ZHAOXIN_TEMPERATURE_DATA)
            }
            (7, _) => Some(RegisterAddress::VIA_TEMPERATURE_NANO),
            (6, 0x0a | 0x0d) => Some(RegisterAddress::VIA_TEMPERATURE_C7),
            (6, 0x0f) => Some(RegisterAddress::VIA_TEMPERATURE_NANO),
            _ => None,
        }
    }
}

impl VendorMsr for Centaur {
    fn definitions(&self) -> &'static [MsrDefinition] {
        CENTAUR_MSR_DEFINITIONS.as_slice()
    }

    fn temperature(&self, ctx: &MsrContext) -> Option<f64> {
        let register = Self::temperature_register(ctx)?;
        ctx.msr(register, 23, 0).map(|t| t as f64)
    }

    fn bus_clock(&self, ctx: &MsrContext) -> Option<f64> {
        let index = ctx.msr(RegisterAddress::MSR_FSB_FREQ, 2, 0)?;
        FSB_FREQUENCIES.get(index as usize).copied()
    }

    fn microcode_version(&self, ctx: &MsrContext) -> Option<u32> {
        ctx.msr(RegisterAddress::IA32_BIOS_SIGN_ID, 63, 32).map(|v| v as u32)
    }
}

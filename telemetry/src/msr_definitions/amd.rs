// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::Format::{Decimal, Flag};
use super::{
    MsrDefinition, MsrDefinitions, RegisterAddress, ValueDefinition, ValueDefinitions,
};

impl RegisterAddress {
    pub const AMD_PSTATE_CURRENT_LIMIT: Self = Self(0xc001_0061);
    pub const AMD_PSTATE_STATUS: Self = Self(0xc001_0063);
    pub const AMD_PSTATE_0: Self = Self(0xc001_0064);
    pub const AMD_PSTATE_7: Self = Self(0xc001_006b);
    pub const AMD_PWR_UNIT: Self = Self(0xc001_0299);
    pub const AMD_CORE_ENERGY_STAT: Self = Self(0xc001_029a);
    pub const AMD_PKG_ENERGY_STAT: Self = Self(0xc001_029b);
}

// A macro rather than a `const fn` so that `&[v!(..)]` is promoted to `'static`.
macro_rules! v {
    ($short:expr, $description:expr, $lo:expr, $hi:expr, $format:expr $(,)?) => {
        ValueDefinition {
            short: $short,
            description: $description,
            bits_range: ($lo, $hi),
            format: $format,
        }
    };
}

/// P-state definition layout of family 17h to 19h.
const PSTATE_FIELDS: &[ValueDefinition] = &[
    v!("CpuFid", "Core frequency id", 0, 7, Decimal),
    v!("CpuDfsId", "Core divisor id", 8, 13, Decimal),
    v!("CpuVid", "Core voltage id", 14, 21, Decimal),
    v!("IddValue", "Current dissipation value", 22, 29, Decimal),
    v!("IddDiv", "Current dissipation divisor", 30, 31, Decimal),
    v!("PstateEn", "P-state is valid", 63, 63, Flag),
];

const fn pstate(index: u32, name: &'static str) -> MsrDefinition {
    MsrDefinition {
        address: RegisterAddress(RegisterAddress::AMD_PSTATE_0.0 + index),
        name,
        values: ValueDefinitions::new(PSTATE_FIELDS),
    }
}

/// Registers read by the AMD telemetry accessors.
///
/// Based on the Processor Programming Reference for family 17h and 19h. The
/// P-state layout differs on older families; the dump always uses the Zen one.
pub static AMD_MSR_DEFINITIONS: MsrDefinitions<13> = const {
    MsrDefinitions([
        MsrDefinition {
            address: RegisterAddress::AMD_PSTATE_CURRENT_LIMIT,
            name: "PStateCurLim",
            values: ValueDefinitions::new(&[
                v!(
                    "CurPstateLimit",
                    "Highest-performance non-boosted P-state allowed",
                    0,
                    2,
                    Decimal,
                ),
                v!("PstateMaxVal", "Lowest-performance non-boosted P-state", 4, 6, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::AMD_PSTATE_STATUS,
            name: "PStateStat",
            values: ValueDefinitions::new(&[v!("CurPstate", "Current P-state", 0, 2, Decimal)]),
        },
        pstate(0, "PStateDef0"),
        pstate(1, "PStateDef1"),
        pstate(2, "PStateDef2"),
        pstate(3, "PStateDef3"),
        pstate(4, "PStateDef4"),
        pstate(5, "PStateDef5"),
        pstate(6, "PStateDef6"),
        pstate(7, "PStateDef7"),
        MsrDefinition {
            address: RegisterAddress::AMD_PWR_UNIT,
            name: "RAPL_PWR_UNIT",
            values: ValueDefinitions::new(&[
                v!("PowerUnits", "Power in units of 1/2^n W", 0, 3, Decimal),
                v!("EnergyStatusUnits", "Energy in units of 1/2^n J", 8, 12, Decimal),
                v!("TimeUnits", "Time in units of 1/2^n s", 16, 19, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::AMD_CORE_ENERGY_STAT,
            name: "CORE_ENERGY_STAT",
            values: ValueDefinitions::new(&[
                v!("TotalEnergyConsumed", "Core energy in energy status units", 0, 31, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::AMD_PKG_ENERGY_STAT,
            name: "PKG_ENERGY_STAT",
            values: ValueDefinitions::new(&[
                v!("TotalEnergyConsumed", "Package energy in energy status units", 0, 31, Decimal),
            ]),
        },
    ])
};

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::Format::{Decimal, Flag, Hex};
use super::{
    MsrDefinition, MsrDefinitions, RegisterAddress, ValueDefinition, ValueDefinitions,
};

impl RegisterAddress {
    pub const IA32_EBL_CR_POWERON: Self = Self(0x2a);
    pub const IA32_BIOS_SIGN_ID: Self = Self(0x8b);
    pub const MSR_PLATFORM_INFO: Self = Self(0xce);
    pub const IA32_MPERF: Self = Self(0xe7);
    pub const IA32_APERF: Self = Self(0xe8);
    pub const IA32_PERF_STATUS: Self = Self(0x198);
    pub const IA32_THERM_STATUS: Self = Self(0x19c);
    pub const IA32_TEMPERATURE_TARGET: Self = Self(0x1a2);
    pub const MSR_TURBO_RATIO_LIMIT: Self = Self(0x1ad);
    pub const IA32_PACKAGE_THERM_STATUS: Self = Self(0x1b1);
    pub const MSR_RAPL_POWER_UNIT: Self = Self(0x606);
    pub const MSR_PKG_POWER_LIMIT: Self = Self(0x610);
    pub const MSR_PKG_ENERGY_STATUS: Self = Self(0x611);
    pub const MSR_PP0_ENERGY_STATUS: Self = Self(0x639);
    pub const MSR_PP1_ENERGY_STATUS: Self = Self(0x641);
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

/// Registers the Intel telemetry accessors read, with the fields they use and
/// their immediate neighbours.
///
/// Based on the Intel 64 and IA-32 Architectures Software Developer's Manual,
/// Volume 4 (Model-Specific Registers). Layouts for the non-architectural
/// registers are the Nehalem and later ones.
pub static INTEL_MSR_DEFINITIONS: MsrDefinitions<15> = const {
    MsrDefinitions([
        MsrDefinition {
            address: RegisterAddress::IA32_EBL_CR_POWERON,
            name: "IA32_EBL_CR_POWERON",
            values: ValueDefinitions::new(&[
                v!("BUS_RATIO", "Clock frequency ratio (P6 family and NetBurst)", 22, 26, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_BIOS_SIGN_ID,
            name: "IA32_BIOS_SIGN_ID",
            values: ValueDefinitions::new(&[
                v!("PATCH_SIGN_ID", "Microcode update signature", 32, 63, Hex),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_PLATFORM_INFO,
            name: "MSR_PLATFORM_INFO",
            values: ValueDefinitions::new(&[
                v!("MAX_NON_TURBO_RATIO", "Maximum non-turbo ratio", 8, 15, Decimal),
                v!("PPIN_CAP", "Protected processor inventory number available", 23, 23, Flag),
                v!("TURBO_LIMIT_PROG", "Turbo ratio limits are programmable", 28, 28, Flag),
                v!("TDP_LIMIT_PROG", "TDP limits are programmable", 29, 29, Flag),
                v!("MAX_EFFICIENCY_RATIO", "Minimum operating ratio", 40, 47, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_MPERF,
            name: "IA32_MPERF",
            values: ValueDefinitions::new(&[
                v!("MCNT", "Maximum frequency clock count", 0, 63, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_APERF,
            name: "IA32_APERF",
            values: ValueDefinitions::new(&[
                v!("ACNT", "Actual frequency clock count", 0, 63, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_PERF_STATUS,
            name: "IA32_PERF_STATUS",
            values: ValueDefinitions::new(&[
                v!("CURRENT_RATIO", "Current performance state ratio", 8, 15, Decimal),
                v!("CORE_VOLTAGE", "Core voltage in units of 1/8192 V", 32, 47, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_THERM_STATUS,
            name: "IA32_THERM_STATUS",
            values: ValueDefinitions::new(&[
                v!("THERMAL_STATUS", "Thermal sensor is tripped", 0, 0, Flag),
                v!("THERMAL_STATUS_LOG", "Thermal sensor tripped since last clear", 1, 1, Flag),
                v!("PROCHOT", "PROCHOT# or FORCEPR# is asserted", 2, 2, Flag),
                v!("CRITICAL_TEMP", "Critical temperature detector output", 4, 4, Flag),
                v!("DIGITAL_READOUT", "Degrees below TjMax", 16, 22, Decimal),
                v!("RESOLUTION", "Sensor resolution in degrees Celsius", 27, 30, Decimal),
                v!("READING_VALID", "Digital readout is valid", 31, 31, Flag),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_TEMPERATURE_TARGET,
            name: "IA32_TEMPERATURE_TARGET",
            values: ValueDefinitions::new(&[
                v!("TCC_OFFSET_TIME_WINDOW", "TCC activation offset time window", 0, 6, Decimal),
                v!("TEMPERATURE_TARGET", "TjMax in degrees Celsius", 16, 23, Decimal),
                v!(
                    "TCC_ACTIVATION_OFFSET",
                    "Degrees below TjMax where throttling starts",
                    24,
                    29,
                    Decimal,
                ),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_TURBO_RATIO_LIMIT,
            name: "MSR_TURBO_RATIO_LIMIT",
            values: ValueDefinitions::new(&[
                v!("MAX_RATIO_1C", "Maximum turbo ratio, one core active", 0, 7, Decimal),
                v!("MAX_RATIO_2C", "Maximum turbo ratio, two cores active", 8, 15, Decimal),
                v!("MAX_RATIO_3C", "Maximum turbo ratio, three cores active", 16, 23, Decimal),
                v!("MAX_RATIO_4C", "Maximum turbo ratio, four cores active", 24, 31, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::IA32_PACKAGE_THERM_STATUS,
            name: "IA32_PACKAGE_THERM_STATUS",
            values: ValueDefinitions::new(&[
                v!("PKG_THERMAL_STATUS", "Package thermal sensor is tripped", 0, 0, Flag),
                v!("PKG_PROCHOT", "Package PROCHOT# is asserted", 2, 2, Flag),
                v!("PKG_CRITICAL_TEMP", "Package critical temperature detector output", 4, 4, Flag),
                v!("PKG_DIGITAL_READOUT", "Package degrees below TjMax", 16, 22, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_RAPL_POWER_UNIT,
            name: "MSR_RAPL_POWER_UNIT",
            values: ValueDefinitions::new(&[
                v!("POWER_UNITS", "Power in units of 1/2^n W", 0, 3, Decimal),
                v!("ENERGY_STATUS_UNITS", "Energy in units of 1/2^n J", 8, 12, Decimal),
                v!("TIME_UNITS", "Time in units of 1/2^n s", 16, 19, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_PKG_POWER_LIMIT,
            name: "MSR_PKG_POWER_LIMIT",
            values: ValueDefinitions::new(&[
                v!("PL1", "Package power limit #1 in power units", 0, 14, Decimal),
                v!("PL1_ENABLE", "Power limit #1 enabled", 15, 15, Flag),
                v!("PL1_CLAMP", "Package clamping limitation #1", 16, 16, Flag),
                v!("PL1_TIME_WINDOW", "Time window for power limit #1", 17, 23, Hex),
                v!("PL2", "Package power limit #2 in power units", 32, 46, Decimal),
                v!("PL2_ENABLE", "Power limit #2 enabled", 47, 47, Flag),
                v!("PL2_CLAMP", "Package clamping limitation #2", 48, 48, Flag),
                v!("PL2_TIME_WINDOW", "Time window for power limit #2", 49, 55, Hex),
                v!("LOCK", "Register is locked until reset", 63, 63, Flag),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_PKG_ENERGY_STATUS,
            name: "MSR_PKG_ENERGY_STATUS",
            values: ValueDefinitions::new(&[
                v!("TOTAL_ENERGY_CONSUMED", "Package energy in energy status units", 0, 31, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_PP0_ENERGY_STATUS,
            name: "MSR_PP0_ENERGY_STATUS",
            values: ValueDefinitions::new(&[
                v!(
                    "TOTAL_ENERGY_CONSUMED",
                    "Core domain energy in energy status units",
                    0,
                    31,
                    Decimal,
                ),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_PP1_ENERGY_STATUS,
            name: "MSR_PP1_ENERGY_STATUS",
            values: ValueDefinitions::new(&[
                v!(
                    "TOTAL_ENERGY_CONSUMED",
                    "Graphics domain energy in energy status units",
                    0,
                    31,
                    Decimal,
                ),
            ]),
        },
    ])
};

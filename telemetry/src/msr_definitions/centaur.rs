// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::Format::{Decimal, Hex};
use super::{
    MsrDefinition, MsrDefinitions, RegisterAddress, ValueDefinition, ValueDefinitions,
};

impl RegisterAddress {
    pub const MSR_FSB_FREQ: Self = Self(0xcd);
    pub const VIA_TEMPERATURE_C7: Self = Self(0x1169);
    pub const ZHAOXIN_TEMPERATURE_MAX: Self = Self(0x1415);
    pub const ZHAOXIN_TEMPERATURE_CRIT: Self = Self(0x1416);
    pub const VIA_TEMPERATURE_NANO: Self = Self(0x1423);
    pub const ZHAOXIN_TEMPERATURE_INDEX: Self = Self(0x174c);
    pub const ZHAOXIN_TEMPERATURE_DATA: Self = Self(0x174d);
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

const TEMPERATURE: &[ValueDefinition] =
    &[v!("TEMPERATURE", "Temperature in degrees Celsius", 0, 23, Decimal)];

/// Registers of VIA and Zhaoxin parts, as used by the Linux `via-cputemp`
/// and `zhaoxin-cputemp` drivers.
pub static CENTAUR_MSR_DEFINITIONS: MsrDefinitions<6> = const {
    MsrDefinitions([
        MsrDefinition {
            address: RegisterAddress::IA32_BIOS_SIGN_ID,
            name: "IA32_BIOS_SIGN_ID",
            values: ValueDefinitions::new(&[
                v!("PATCH_SIGN_ID", "Microcode update signature", 32, 63, Hex),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::MSR_FSB_FREQ,
            name: "MSR_FSB_FREQ",
            values: ValueDefinitions::new(&[
                v!("BUS_SPEED", "Front side bus frequency code", 0, 2, Decimal),
            ]),
        },
        MsrDefinition {
            address: RegisterAddress::VIA_TEMPERATURE_C7,
            name: "VIA_TEMPERATURE_C7",
            values: ValueDefinitions::new(TEMPERATURE),
        },
        MsrDefinition {
            address: RegisterAddress::ZHAOXIN_TEMPERATURE_MAX,
            name: "ZHAOXIN_TEMPERATURE_MAX",
            values: ValueDefinitions::new(TEMPERATURE),
        },
        MsrDefinition {
            address: RegisterAddress::ZHAOXIN_TEMPERATURE_CRIT,
            name: "ZHAOXIN_TEMPERATURE_CRIT",
            values: ValueDefinitions::new(TEMPERATURE),
        },
        MsrDefinition {
            address: RegisterAddress::VIA_TEMPERATURE_NANO,
            name: "VIA_TEMPERATURE_NANO",
            values: ValueDefinitions::new(TEMPERATURE),
        },
    ])
};

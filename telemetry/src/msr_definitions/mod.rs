// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

pub mod amd;
pub mod centaur;
pub mod intel;

use hwaccess::HardwareAccess;
use serde::Serialize;

/// The register address of an MSR
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterAddress(pub u32);

/// How a field is turned into a number worth printing.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Format {
    /// Print the raw field in hex.
    Hex,
    /// Print the raw field in decimal.
    Decimal,
    /// A single bit printed as a yes/no flag.
    Flag,
}

/// A description of a range of bits in an MSR.
#[derive(Clone, Copy, Debug)]
pub struct ValueDefinition {
    /// A short name for the value.
    pub short: &'static str,
    /// A description of the value.
    pub description: &'static str,
    /// The range of bits in the MSR corresponding to this value, as `(low, high)`.
    ///
    /// This is not a `RangeInclusive<u8>` because that type does unfortunately not implement `Copy`.
    pub bits_range: (u8, u8),
    pub format: Format,
}

/// Describes values within an MSR.
///
/// NOTE: The only way to interact with this value (beyond this module) is via the const [`Self::as_slice()`](Self::as_slice) method.
pub struct ValueDefinitions(&'static [ValueDefinition]);

impl ValueDefinitions {
    /// Constructor permitting at most 64 entries.
    const fn new(msr_descriptions: &'static [ValueDefinition]) -> Self {
        assert!(msr_descriptions.len() <= 64);
        Self(msr_descriptions)
    }

    pub const fn as_slice(&self) -> &'static [ValueDefinition] {
        self.0
    }
}

/// Describes one MSR: its address, name and fields.
pub struct MsrDefinition {
    pub address: RegisterAddress,
    pub name: &'static str,
    pub values: ValueDefinitions,
}

/// Describes multiple MSRs.
pub struct MsrDefinitions<const NUM: usize>([MsrDefinition; NUM]);

impl<const NUM: usize> MsrDefinitions<NUM> {
    pub const fn as_slice(&self) -> &[MsrDefinition; NUM] {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDump {
    pub name: &'static str,
    pub description: &'static str,
    pub bits: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisterDump {
    pub name: &'static str,
    pub address: String,
    /// `None` when the register could not be read.
    pub raw: Option<String>,
    pub fields: Vec<FieldDump>,
}

fn format_field(value: u64, format: Format) -> String {
    match format {
        Format::Hex => format!("{value:#x}"),
        Format::Decimal => value.to_string(),
        Format::Flag => (if value != 0 { "yes" } else { "no" }).to_string(),
    }
}

/// Reads every register in `definitions` on `cpu` and splits it into its documented fields.
pub fn dump(hw: &dyn HardwareAccess, cpu: u32, definitions: &[MsrDefinition]) -> Vec<RegisterDump> {
    definitions
        .iter()
        .map(|msr| {
            let value = hw.read_msr(cpu, msr.address.0).ok();
            let fields = match value {
                Some(value) => msr
                    .values
                    .as_slice()
                    .iter()
                    .map(|field| {
                        let (lo, hi) = field.bits_range;
                        FieldDump {
                            name: field.short,
                            description: field.description,
                            bits: if lo == hi {
                                format!("{lo}")
                            } else {
                                format!("{hi}:{lo}")
                            },
                            value: format_field(
                                hwaccess::extract_bits(value, hi, lo),
                                field.format,
                            ),
                        }
                    })
                    .collect(),
                None => Vec::new(),
            };
            RegisterDump {
                name: msr.name,
                address: format!("{:#x}", msr.address.0),
                raw: value.map(|v| format!("{v:#018x}")),
                fields,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use hwaccess::mock::MockAccess;

    use super::*;

    fn check_table(definitions: &[MsrDefinition]) {
        for msr in definitions {
            let mut covered = 0u64;
            for field in msr.values.as_slice() {
                let (lo, hi) = field.bits_range;
                assert!(lo <= hi && hi < 64, "{} {}", msr.name, field.short);
                if field.format == Format::Flag {
                    assert_eq!(lo, hi, "{} {}", msr.name, field.short);
                }
                let width = (hi - lo + 1) as u32;
                let mask = if width == 64 { u64::MAX } else { ((1u64 << width) - 1) << lo };
                assert_eq!(covered & mask, 0, "{} {} overlaps", msr.name, field.short);
                covered |= mask;
            }
        }
    }

    #[test]
    fn fields_are_well_formed() {
        check_table(intel::INTEL_MSR_DEFINITIONS.as_slice());
        check_table(amd::AMD_MSR_DEFINITIONS.as_slice());
        check_table(centaur::CENTAUR_MSR_DEFINITIONS.as_slice());
    }

    #[test]
    fn dump_splits_fields() {
        let hw = MockAccess::new().with_msr(0x1a2, 100 << 16);
        let dump = dump(&hw, 0, intel::INTEL_MSR_DEFINITIONS.as_slice());
        let target = dump.iter().find(|r| r.address == "0x1a2").unwrap();
        assert_eq!(target.raw.as_deref(), Some("0x0000000000640000"));
        let tj = target.fields.iter().find(|f| f.bits == "23:16").unwrap();
        assert_eq!(tj.value, "100");

        let missing = dump.iter().find(|r| r.address == "0x198").unwrap();
        assert_eq!(missing.raw, None);
        assert!(missing.fields.is_empty());
    }
}

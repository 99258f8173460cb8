// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::{brand_bits, match_pattern, number_at, MatchEntry, MatchInput};
use crate::decode::ProcessorIdentity;

const ATHLON: u64 = 1 << 0;
const PHENOM: u64 = 1 << 1;
const SEMPRON: u64 = 1 << 2;
const OPTERON: u64 = 1 << 3;
const TURION: u64 = 1 << 4;
const DURON: u64 = 1 << 5;
const A_SERIES: u64 = 1 << 6;
const FX: u64 = 1 << 7;
const RYZEN: u64 = 1 << 8;
const THREADRIPPER: u64 = 1 << 9;
const EPYC: u64 = 1 << 10;
const PRO: u64 = 1 << 11;
const HYGON: u64 = 1 << 12;

const BRAND_PATTERNS: [(&str, u64); 14] = [
    ("Athlon", ATHLON),
    ("Phenom", PHENOM),
    ("Sempron", SEMPRON),
    ("Opteron", OPTERON),
    ("Turion", TURION),
    ("Duron", DURON),
    ("A#-", A_SERIES),
    ("A##-", A_SERIES),
    ("FX", FX),
    ("Ryzen", RYZEN),
    ("Threadripper", THREADRIPPER),
    ("EPYC", EPYC),
    (" PRO ", PRO),
    ("Hygon", HYGON),
];

/// Product generation from the model number.
///
/// Desktop and mobile parts carry it in the leading digit (`Ryzen 9 7950X`),
/// server parts in the trailing one (`EPYC 7763`).
fn generation(brand: &str) -> Option<i32> {
    let leading = |pattern: &str, offset: usize| {
        let pos = match_pattern(brand, pattern);
        (pos != 0).then(|| number_at(brand, pos + offset)).flatten()
    };
    if let Some(n) = leading("Ryzen [3579] #", 8).or_else(|| leading("Ryzen [3579] PRO #", 12)) {
        return Some(n / 1000);
    }
    if let Some(n) = leading("Threadripper #", 13).or_else(|| leading("Threadripper PRO #", 17)) {
        return Some(n / 1000);
    }
    leading("EPYC #", 5).map(|n| n % 10)
}

pub(super) fn match_input(id: &ProcessorIdentity) -> MatchInput {
    let bits = brand_bits(&id.brand, &BRAND_PATTERNS);
    MatchInput::from_identity(id, bits, -1, generation(&id.brand).unwrap_or(-1))
}

const NA: i32 = -1;

#[rustfmt::skip]
pub(super) const TABLE: &[MatchEntry] = &[
    //             F   M   S   EF    EM    #c  L2  L3  BC  bits                          MC  name
    MatchEntry::new(NA, NA, NA, NA,   NA,    1, NA, NA, NA, 0,                            NA, "Unknown AMD CPU"),

    // K8
    MatchEntry::new(15, NA, NA, 15,   NA,   NA, NA, NA, NA, ATHLON,                       NA, "K8 (Athlon 64)"),
    MatchEntry::new(15, NA, NA, 15,   NA,   NA, NA, NA, NA, OPTERON,                      NA, "K8 (Opteron)"),
    MatchEntry::new(15, NA, NA, 15,   NA,   NA, NA, NA, NA, SEMPRON,                      NA, "K8 (Sempron)"),
    MatchEntry::new(15, NA, NA, 15,   NA,   NA, NA, NA, NA, TURION,                       NA, "K8 (Turion 64)"),

    // K10
    MatchEntry::new(15,  2, NA, 0x10, 0x02, NA, NA, NA, NA, PHENOM,                       NA, "Agena (Phenom)"),
    MatchEntry::new(15,  2, NA, 0x10, 0x02, NA, NA, NA, NA, OPTERON,                      NA, "Barcelona (Opteron)"),
    MatchEntry::new(15,  4, NA, 0x10, 0x04, NA, NA, NA, NA, PHENOM,                       NA, "Deneb (Phenom II)"),
    MatchEntry::new(15,  5, NA, 0x10, 0x05, NA, NA, NA, NA, ATHLON,                       NA, "Propus (Athlon II)"),
    MatchEntry::new(15,  6, NA, 0x10, 0x06, NA, NA, NA, NA, ATHLON,                       NA, "Regor (Athlon II)"),
    MatchEntry::new(15, 10, NA, 0x10, 0x0a, NA, NA, NA, NA, PHENOM,                       NA, "Thuban (Phenom II)"),
    MatchEntry::new(15,  1, NA, 0x12, 0x01, NA, NA, NA, NA, A_SERIES,                     NA, "Llano (A-Series)"),
    MatchEntry::new(15,  1, NA, 0x14, 0x01, NA, NA, NA, NA, 0,                            NA, "Ontario/Zacate"),
    MatchEntry::new(15,  2, NA, 0x14, 0x02, NA, NA, NA, NA, 0,                            NA, "Ontario/Zacate"),

    // Bulldozer family
    MatchEntry::new(15,  1, NA, 0x15, 0x01, NA, NA, NA, NA, FX,                           NA, "Zambezi (FX)"),
    MatchEntry::new(15,  1, NA, 0x15, 0x01, NA, NA, NA, NA, OPTERON,                      NA, "Interlagos (Opteron)"),
    MatchEntry::new(15,  2, NA, 0x15, 0x02, NA, NA, NA, NA, FX,                           NA, "Vishera (FX)"),
    MatchEntry::new(15,  0, NA, 0x15, 0x10, NA, NA, NA, NA, A_SERIES,                     NA, "Trinity (A-Series)"),
    MatchEntry::new(15,  3, NA, 0x15, 0x13, NA, NA, NA, NA, A_SERIES,                     NA, "Richland (A-Series)"),
    MatchEntry::new(15,  0, NA, 0x15, 0x30, NA, NA, NA, NA, A_SERIES,                     NA, "Kaveri (A-Series)"),
    MatchEntry::new(15,  0, NA, 0x15, 0x60, NA, NA, NA, NA, A_SERIES,                     NA, "Carrizo (A-Series)"),
    MatchEntry::new(15,  0, NA, 0x15, 0x70, NA, NA, NA, NA, A_SERIES,                     NA, "Stoney Ridge (A-Series)"),
    MatchEntry::new(15,  0, NA, 0x16, 0x00, NA, NA, NA, NA, 0,                            NA, "Kabini"),
    MatchEntry::new(15,  0, NA, 0x16, 0x30, NA, NA, NA, NA, 0,                            NA, "Beema/Mullins"),

    // Zen, Zen+, Zen 2
    MatchEntry::new(15,  1, NA, 0x17, 0x01, NA, NA, NA, NA, RYZEN,                         1, "Summit Ridge (Ryzen)"),
    MatchEntry::new(15,  1, NA, 0x17, 0x01, NA, NA, NA, NA, RYZEN | THREADRIPPER,          1, "Whitehaven (Threadripper)"),
    MatchEntry::new(15,  1, NA, 0x17, 0x01, NA, NA, NA, NA, EPYC,                          1, "Naples (EPYC)"),
    MatchEntry::new(15,  8, NA, 0x17, 0x08, NA, NA, NA, NA, RYZEN,                         2, "Pinnacle Ridge (Ryzen)"),
    MatchEntry::new(15,  8, NA, 0x17, 0x08, NA, NA, NA, NA, RYZEN | THREADRIPPER,          2, "Colfax (Threadripper)"),
    MatchEntry::new(15,  1, NA, 0x17, 0x11, NA, NA, NA, NA, RYZEN,                        NA, "Raven Ridge (Ryzen)"),
    MatchEntry::new(15,  8, NA, 0x17, 0x18, NA, NA, NA, NA, RYZEN,                        NA, "Picasso (Ryzen)"),
    MatchEntry::new(15,  0, NA, 0x17, 0x20, NA, NA, NA, NA, 0,                            NA, "Dali"),
    MatchEntry::new(15,  1, NA, 0x17, 0x31, NA, NA, NA, NA, RYZEN | THREADRIPPER,          3, "Castle Peak (Threadripper)"),
    MatchEntry::new(15,  1, NA, 0x17, 0x31, NA, NA, NA, NA, EPYC,                          2, "Rome (EPYC)"),
    MatchEntry::new(15,  0, NA, 0x17, 0x60, NA, NA, NA, NA, RYZEN,                         4, "Renoir (Ryzen)"),
    MatchEntry::new(15,  8, NA, 0x17, 0x68, NA, NA, NA, NA, RYZEN,                         5, "Lucienne (Ryzen)"),
    MatchEntry::new(15,  1, NA, 0x17, 0x71, NA, NA, NA, NA, RYZEN,                         3, "Matisse (Ryzen)"),
    MatchEntry::new(15,  0, NA, 0x17, 0x90, NA, NA, NA, NA, 0,                            NA, "Van Gogh"),
    MatchEntry::new(15,  0, NA, 0x17, 0xa0, NA, NA, NA, NA, RYZEN,                         7, "Mendocino (Ryzen)"),

    // Zen 3, Zen 4
    MatchEntry::new(15,  1, NA, 0x19, 0x01, NA, NA, NA, NA, EPYC,                          3, "Milan (EPYC)"),
    MatchEntry::new(15,  8, NA, 0x19, 0x08, NA, NA, NA, NA, RYZEN | THREADRIPPER,          5, "Chagall (Threadripper)"),
    MatchEntry::new(15,  1, NA, 0x19, 0x21, NA, NA, NA, NA, RYZEN,                         5, "Vermeer (Ryzen)"),
    MatchEntry::new(15,  0, NA, 0x19, 0x50, NA, NA, NA, NA, RYZEN,                         5, "Cezanne (Ryzen)"),
    MatchEntry::new(15,  4, NA, 0x19, 0x44, NA, NA, NA, NA, RYZEN,                         6, "Rembrandt (Ryzen)"),
    MatchEntry::new(15,  1, NA, 0x19, 0x61, NA, NA, NA, NA, RYZEN,                         7, "Raphael (Ryzen)"),
    MatchEntry::new(15,  4, NA, 0x19, 0x74, NA, NA, NA, NA, RYZEN,                         7, "Phoenix (Ryzen)"),
    MatchEntry::new(15,  5, NA, 0x19, 0x75, NA, NA, NA, NA, RYZEN,                         8, "Hawk Point (Ryzen)"),
    MatchEntry::new(15,  1, NA, 0x19, 0x11, NA, NA, NA, NA, EPYC,                          4, "Genoa (EPYC)"),

    // Zen 5
    MatchEntry::new(15,  4, NA, 0x1a, 0x24, NA, NA, NA, NA, RYZEN,                        NA, "Strix Point (Ryzen AI)"),
    MatchEntry::new(15,  4, NA, 0x1a, 0x44, NA, NA, NA, NA, RYZEN,                         9, "Granite Ridge (Ryzen)"),
    MatchEntry::new(15,  0, NA, 0x1a, 0x60, NA, NA, NA, NA, RYZEN,                        NA, "Krackan Point (Ryzen AI)"),
    MatchEntry::new(15,  0, NA, 0x1a, 0x70, NA, NA, NA, NA, RYZEN,                        NA, "Strix Halo (Ryzen AI Max)"),

    // Hygon
    MatchEntry::new(15,  0, NA, 0x18, 0x00, NA, NA, NA, NA, HYGON,                        NA, "Dhyana"),
    MatchEntry::new(15,  1, NA, 0x18, 0x01, NA, NA, NA, NA, HYGON,                        NA, "Dhyana"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename::best_match;

    fn name(ext_family: i32, ext_model: i32, brand: &str) -> &'static str {
        let input = MatchInput {
            family: 15,
            model: ext_model & 0xf,
            ext_family,
            ext_model,
            ncores: 16,
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            bits: brand_bits(brand, &BRAND_PATTERNS),
            model_code: generation(brand).unwrap_or(-1),
            ..Default::default()
        };
        TABLE[best_match(TABLE, &input).0].name
    }

    #[test]
    fn generations() {
        assert_eq!(generation("AMD Ryzen 9 7950X 16-Core Processor"), Some(7));
        assert_eq!(generation("AMD Ryzen 7 PRO 4750G with Radeon Graphics"), Some(4));
        assert_eq!(generation("AMD Ryzen Threadripper 3970X 32-Core Processor"), Some(3));
        assert_eq!(generation("AMD EPYC 7763 64-Core Processor"), Some(3));
        assert_eq!(generation("AMD Athlon(tm) II X2 250 Processor"), None);
    }

    #[test]
    fn zen_parts() {
        assert_eq!(name(0x19, 0x61, "AMD Ryzen 9 7950X 16-Core Processor"), "Raphael (Ryzen)");
        assert_eq!(name(0x19, 0x01, "AMD EPYC 7763 64-Core Processor"), "Milan (EPYC)");
        assert_eq!(
            name(0x17, 0x01, "AMD Ryzen Threadripper 1950X 16-Core Processor"),
            "Whitehaven (Threadripper)"
        );
        assert_eq!(
            name(0x17, 0x01, "AMD Ryzen 7 1800X Eight-Core Processor"),
            "Summit Ridge (Ryzen)"
        );
    }

    #[test]
    fn older_parts() {
        assert_eq!(name(0x15, 0x02, "AMD FX(tm)-8350 Eight-Core Processor"), "Vishera (FX)");
        assert_eq!(name(0x10, 0x04, "AMD Phenom(tm) II X4 965 Processor"), "Deneb (Phenom II)");
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::{brand_bits, match_pattern, number_at, MatchEntry, MatchInput};
use crate::decode::ProcessorIdentity;

const PENTIUM: u64 = 1 << 0;
const CELERON: u64 = 1 << 1;
const XEON: u64 = 1 << 2;
const ATOM: u64 = 1 << 3;
const CORE: u64 = 1 << 4;
const I3: u64 = 1 << 5;
const I5: u64 = 1 << 6;
const I7: u64 = 1 << 7;
const I9: u64 = 1 << 8;
const ULTRA: u64 = 1 << 9;
const MOBILE: u64 = 1 << 10;
const PROCESSOR_N: u64 = 1 << 11;

const BRAND_PATTERNS: [(&str, u64); 14] = [
    ("Pentium", PENTIUM),
    ("Celeron", CELERON),
    ("Xeon", XEON),
    ("Atom", ATOM),
    ("Core", CORE),
    ("i3-", I3),
    ("i5-", I5),
    ("i7-", I7),
    ("i9-", I9),
    ("Ultra 5", ULTRA | I5),
    ("Ultra 7", ULTRA | I7),
    ("Ultra 9", ULTRA | I9),
    ("Processor N#", PROCESSOR_N),
    ("#[HU]", MOBILE),
];

/// Core generation from the model number: `i7-8700K` is 8, `i9-12900K` is 12.
fn core_generation(brand: &str) -> Option<i32> {
    let pos = match_pattern(brand, "i#-#");
    if pos == 0 {
        return None;
    }
    let number = number_at(brand, pos + 3)?;
    Some(match number {
        n if n >= 1000 => n / 1000,
        n => n / 100,
    })
}

pub(super) fn match_input(id: &ProcessorIdentity) -> MatchInput {
    let bits = brand_bits(&id.brand, &BRAND_PATTERNS);
    let model_code = core_generation(&id.brand).unwrap_or(-1);
    MatchInput::from_identity(id, bits, -1, model_code)
}

const NA: i32 = -1;

#[rustfmt::skip]
pub(super) const TABLE: &[MatchEntry] = &[
    //             F   M   S   EF  EM   #c  L2  L3  BC  bits                  MC  name
    MatchEntry::new(NA, NA, NA, NA, NA,  1, NA, NA, NA, 0,                    NA, "Unknown Intel CPU"),

    // NetBurst
    MatchEntry::new(15, NA, NA, 15, NA, NA, NA, NA, NA, 0,                    NA, "Unknown Pentium 4"),
    MatchEntry::new(15,  3, NA, 15, NA, NA, NA, NA, NA, PENTIUM,              NA, "Prescott (Pentium 4)"),
    MatchEntry::new(15,  4, NA, 15, NA, NA, NA, NA, NA, PENTIUM,              NA, "Prescott (Pentium 4)"),
    MatchEntry::new(15,  6, NA, 15, NA, NA, NA, NA, NA, PENTIUM,              NA, "Cedar Mill (Pentium 4)"),
    MatchEntry::new(15,  4, NA, 15, NA, NA, NA, NA, NA, XEON,                 NA, "Nocona (Xeon)"),

    // Core 2
    MatchEntry::new( 6, 15, NA,  6, 15, NA, NA, NA, NA, CORE,                 NA, "Merom (Core 2)"),
    MatchEntry::new( 6, 15, NA,  6, 15, NA, NA, NA, NA, XEON,                 NA, "Woodcrest (Xeon)"),
    MatchEntry::new( 6,  7, NA,  6, 23, NA, NA, NA, NA, CORE,                 NA, "Penryn (Core 2)"),
    MatchEntry::new( 6,  7, NA,  6, 23, NA, NA, NA, NA, XEON,                 NA, "Harpertown (Xeon)"),

    // Nehalem, Westmere
    MatchEntry::new( 6, 10, NA,  6, 26, NA, NA, NA, NA, CORE | I7,            NA, "Bloomfield (Core i7)"),
    MatchEntry::new( 6, 10, NA,  6, 26, NA, NA, NA, NA, XEON,                 NA, "Gainestown (Xeon)"),
    MatchEntry::new( 6, 14, NA,  6, 30, NA, NA, NA, NA, CORE,                 NA, "Lynnfield (Core i5/i7)"),
    MatchEntry::new( 6,  5, NA,  6, 37, NA, NA, NA, NA, CORE,                 NA, "Clarkdale (Core i3/i5)"),
    MatchEntry::new( 6, 12, NA,  6, 44, NA, NA, NA, NA, CORE,                 NA, "Gulftown (Core i7)"),
    MatchEntry::new( 6, 12, NA,  6, 44, NA, NA, NA, NA, XEON,                 NA, "Westmere-EP (Xeon)"),

    // Sandy Bridge to Broadwell
    MatchEntry::new( 6, 10, NA,  6, 42, NA, NA, NA, NA, CORE,                  2, "Sandy Bridge (Core i3/i5/i7)"),
    MatchEntry::new( 6, 10, NA,  6, 42, NA, NA, NA, NA, PENTIUM,              NA, "Sandy Bridge (Pentium)"),
    MatchEntry::new( 6, 10, NA,  6, 42, NA, NA, NA, NA, CELERON,              NA, "Sandy Bridge (Celeron)"),
    MatchEntry::new( 6, 13, NA,  6, 45, NA, NA, NA, NA, CORE | I7,             3, "Sandy Bridge-E (Core i7)"),
    MatchEntry::new( 6, 13, NA,  6, 45, NA, NA, NA, NA, XEON,                 NA, "Sandy Bridge-EP (Xeon)"),
    MatchEntry::new( 6, 10, NA,  6, 58, NA, NA, NA, NA, CORE,                  3, "Ivy Bridge (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6, 62, NA, NA, NA, NA, CORE | I7,             4, "Ivy Bridge-E (Core i7)"),
    MatchEntry::new( 6, 14, NA,  6, 62, NA, NA, NA, NA, XEON,                 NA, "Ivy Bridge-EP (Xeon)"),
    MatchEntry::new( 6, 12, NA,  6, 60, NA, NA, NA, NA, CORE,                  4, "Haswell (Core i3/i5/i7)"),
    MatchEntry::new( 6,  5, NA,  6, 69, NA, NA, NA, NA, CORE,                  4, "Haswell-ULT (Core i3/i5/i7)"),
    MatchEntry::new( 6,  6, NA,  6, 70, NA, NA, NA, NA, CORE,                  4, "Crystal Well (Core i5/i7)"),
    MatchEntry::new( 6, 15, NA,  6, 63, NA, NA, NA, NA, CORE | I7,             5, "Haswell-E (Core i7)"),
    MatchEntry::new( 6, 15, NA,  6, 63, NA, NA, NA, NA, XEON,                 NA, "Haswell-EP (Xeon)"),
    MatchEntry::new( 6, 13, NA,  6, 61, NA, NA, NA, NA, CORE,                  5, "Broadwell-U (Core i3/i5/i7)"),
    MatchEntry::new( 6,  7, NA,  6, 71, NA, NA, NA, NA, CORE,                  5, "Broadwell-H (Core i5/i7)"),
    MatchEntry::new( 6, 15, NA,  6, 79, NA, NA, NA, NA, CORE | I7,             6, "Broadwell-E (Core i7)"),
    MatchEntry::new( 6, 15, NA,  6, 79, NA, NA, NA, NA, XEON,                 NA, "Broadwell-EP (Xeon)"),

    // Skylake family
    MatchEntry::new( 6, 14, NA,  6, 78, NA, NA, NA, NA, CORE,                  6, "Skylake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6, 94, NA, NA, NA, NA, CORE,                  6, "Skylake-S (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6, 94, NA, NA, NA, NA, XEON,                 NA, "Skylake (Xeon E3)"),
    MatchEntry::new( 6,  5, NA,  6, 85, NA, NA, NA, NA, XEON,                 NA, "Skylake-SP (Xeon)"),
    MatchEntry::new( 6,  5,  7,  6, 85, NA, NA, NA, NA, XEON,                 NA, "Cascade Lake-SP (Xeon)"),
    MatchEntry::new( 6,  5, NA,  6, 85, NA, NA, NA, NA, CORE | I9,             7, "Skylake-X (Core i9)"),
    MatchEntry::new( 6, 14, NA,  6,142, NA, NA, NA, NA, CORE,                  7, "Kaby Lake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6,142, NA, NA, NA, NA, CORE,                  8, "Whiskey Lake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6,158, NA, NA, NA, NA, CORE,                  7, "Kaby Lake-S (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6,158, NA, NA, NA, NA, CORE,                  8, "Coffee Lake-S (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6,158, NA, NA, NA, NA, CORE,                  9, "Coffee Lake-R (Core i3/i5/i7/i9)"),
    MatchEntry::new( 6, 14, NA,  6,158, NA, NA, NA, NA, XEON,                 NA, "Coffee Lake (Xeon E)"),
    MatchEntry::new( 6,  5, NA,  6,165, NA, NA, NA, NA, CORE,                 10, "Comet Lake-S (Core i3/i5/i7/i9)"),
    MatchEntry::new( 6,  6, NA,  6,166, NA, NA, NA, NA, CORE,                 10, "Comet Lake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 14, NA,  6,126, NA, NA, NA, NA, CORE,                 10, "Ice Lake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 10, NA,  6,106, NA, NA, NA, NA, XEON,                 NA, "Ice Lake-SP (Xeon)"),
    MatchEntry::new( 6, 12, NA,  6,140, NA, NA, NA, NA, CORE,                 11, "Tiger Lake-U (Core i3/i5/i7)"),
    MatchEntry::new( 6, 13, NA,  6,141, NA, NA, NA, NA, CORE,                 11, "Tiger Lake-H (Core i5/i7/i9)"),
    MatchEntry::new( 6,  7, NA,  6,167, NA, NA, NA, NA, CORE,                 11, "Rocket Lake (Core i5/i7/i9)"),

    // Hybrid
    MatchEntry::new( 6,  7, NA,  6,151, NA, NA, NA, NA, CORE,                 12, "Alder Lake-S (Core i3/i5/i7/i9)"),
    MatchEntry::new( 6, 10, NA,  6,154, NA, NA, NA, NA, CORE,                 12, "Alder Lake-P (Core i3/i5/i7)"),
    MatchEntry::new( 6,  7, NA,  6,183, NA, NA, NA, NA, CORE,                 13, "Raptor Lake-S (Core i3/i5/i7/i9)"),
    MatchEntry::new( 6,  7, NA,  6,183, NA, NA, NA, NA, CORE,                 14, "Raptor Lake-S Refresh (Core i3/i5/i7/i9)"),
    MatchEntry::new( 6, 10, NA,  6,186, NA, NA, NA, NA, CORE,                 13, "Raptor Lake-P (Core i3/i5/i7)"),
    MatchEntry::new( 6, 10, NA,  6,170, NA, NA, NA, NA, ULTRA,                NA, "Meteor Lake (Core Ultra)"),
    MatchEntry::new( 6, 13, NA,  6,189, NA, NA, NA, NA, ULTRA,                NA, "Lunar Lake (Core Ultra)"),
    MatchEntry::new( 6,  6, NA,  6,198, NA, NA, NA, NA, ULTRA,                NA, "Arrow Lake-S (Core Ultra)"),
    MatchEntry::new( 6, 15, NA,  6,143, NA, NA, NA, NA, XEON,                 NA, "Sapphire Rapids (Xeon)"),
    MatchEntry::new( 6, 15, NA,  6,207, NA, NA, NA, NA, XEON,                 NA, "Emerald Rapids (Xeon)"),

    // Atom
    MatchEntry::new( 6, 12, NA,  6, 28, NA, NA, NA, NA, ATOM,                 NA, "Diamondville (Atom)"),
    MatchEntry::new( 6,  7, NA,  6, 55, NA, NA, NA, NA, ATOM,                 NA, "Bay Trail (Atom)"),
    MatchEntry::new( 6,  7, NA,  6, 55, NA, NA, NA, NA, CELERON,              NA, "Bay Trail (Celeron)"),
    MatchEntry::new( 6, 12, NA,  6, 92, NA, NA, NA, NA, CELERON,              NA, "Apollo Lake (Celeron)"),
    MatchEntry::new( 6, 10, NA,  6,122, NA, NA, NA, NA, CELERON,              NA, "Gemini Lake (Celeron)"),
    MatchEntry::new( 6,  6, NA,  6,150, NA, NA, NA, NA, ATOM,                 NA, "Elkhart Lake (Atom)"),
    MatchEntry::new( 6, 14, NA,  6,190, NA, NA, NA, NA, PROCESSOR_N,          NA, "Alder Lake-N"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename::best_match;

    fn input(ext_model: i32, brand: &str) -> MatchInput {
        MatchInput {
            family: 6,
            model: ext_model & 0xf,
            ext_family: 6,
            ext_model,
            ncores: 8,
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            bits: brand_bits(brand, &BRAND_PATTERNS),
            model_code: core_generation(brand).unwrap_or(-1),
            ..Default::default()
        }
    }

    fn name(ext_model: i32, brand: &str) -> &'static str {
        TABLE[best_match(TABLE, &input(ext_model, brand)).0].name
    }

    #[test]
    fn generations() {
        assert_eq!(core_generation("Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz"), Some(8));
        assert_eq!(core_generation("12th Gen Intel(R) Core(TM) i9-12900K"), Some(12));
        assert_eq!(core_generation("Intel(R) Core(TM) i7 CPU 920 @ 2.67GHz"), None);
        assert_eq!(core_generation("Intel(R) Core(TM) i5-520M"), Some(5));
    }

    #[test]
    fn model_code_splits_shared_models() {
        assert_eq!(
            name(158, "Intel(R) Core(TM) i7-7700K CPU @ 4.20GHz"),
            "Kaby Lake-S (Core i3/i5/i7)"
        );
        assert_eq!(
            name(158, "Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz"),
            "Coffee Lake-S (Core i3/i5/i7)"
        );
        assert_eq!(
            name(158, "Intel(R) Xeon(R) E-2176G CPU @ 3.70GHz"),
            "Coffee Lake (Xeon E)"
        );
        assert_eq!(
            name(151, "12th Gen Intel(R) Core(TM) i9-12900K"),
            "Alder Lake-S (Core i3/i5/i7/i9)"
        );
    }

    #[test]
    fn unknown_models_fall_back() {
        let mut unknown = input(0, "");
        unknown.family = 5;
        unknown.ext_family = 5;
        unknown.ncores = 1;
        assert_eq!(TABLE[best_match(TABLE, &unknown).0].name, "Unknown Intel CPU");
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use super::{brand_bits, MatchEntry, MatchInput};
use crate::decode::ProcessorIdentity;

const C7: u64 = 1 << 0;
const NANO: u64 = 1 << 1;
const EDEN: u64 = 1 << 2;
const QUADCORE: u64 = 1 << 3;
const ZHAOXIN: u64 = 1 << 4;
const KX: u64 = 1 << 5;
const KH: u64 = 1 << 6;

const BRAND_PATTERNS: [(&str, u64); 7] = [
    ("C7", C7),
    ("Nano", NANO),
    ("Eden", EDEN),
    ("QuadCore", QUADCORE),
    ("ZHAOXIN", ZHAOXIN),
    ("KX-", KX),
    ("KH-", KH),
];

pub(super) fn match_input(id: &ProcessorIdentity) -> MatchInput {
    MatchInput::from_identity(id, brand_bits(&id.brand, &BRAND_PATTERNS), -1, -1)
}

const NA: i32 = -1;

#[rustfmt::skip]
pub(super) const TABLE: &[MatchEntry] = &[
    //             F   M   S   EF  EM   #c  L2  L3  BC  bits              MC  name
    MatchEntry::new(NA, NA, NA, NA, NA,  1, NA, NA, NA, 0,                NA, "Unknown Centaur CPU"),
    MatchEntry::new( 6, 10, NA,  6, 10, NA, NA, NA, NA, C7,               NA, "Esther (C7)"),
    MatchEntry::new( 6, 13, NA,  6, 13, NA, NA, NA, NA, C7,               NA, "Esther (C7-D)"),
    MatchEntry::new( 6, 13, NA,  6, 13, NA, NA, NA, NA, EDEN,             NA, "Esther (Eden)"),
    MatchEntry::new( 6, 15, NA,  6, 15, NA, NA, NA, NA, NANO,             NA, "Isaiah (Nano)"),
    MatchEntry::new( 6, 15, NA,  6, 15, NA, NA, NA, NA, NANO | QUADCORE,  NA, "Isaiah (QuadCore)"),
    MatchEntry::new( 6, 15, NA,  6, 15, NA, NA, NA, NA, ZHAOXIN,          NA, "ZhangJiang (ZX-C)"),
    MatchEntry::new( 7, 11, NA,  7, 27, NA, NA, NA, NA, ZHAOXIN | KX,     NA, "WuDaoKou (KX-5000)"),
    MatchEntry::new( 7, 11, NA,  7, 27, NA, NA, NA, NA, ZHAOXIN | KH,     NA, "WuDaoKou (KH-20000)"),
    MatchEntry::new( 7, 11, NA,  7, 59, NA, NA, NA, NA, ZHAOXIN | KX,     NA, "LuJiaZui (KX-6000)"),
    MatchEntry::new( 7, 11, NA,  7, 59, NA, NA, NA, NA, ZHAOXIN | KH,     NA, "LuJiaZui (KH-30000)"),
    MatchEntry::new( 7, 11, NA,  7, 91, NA, NA, NA, NA, ZHAOXIN | KX,     NA, "YongFeng (KX-7000)"),
    MatchEntry::new( 7, 11, NA,  7, 91, NA, NA, NA, NA, ZHAOXIN | KH,     NA, "YongFeng (KH-40000)"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codename::best_match;

    #[test]
    fn zhaoxin_server_and_desktop_split() {
        let mut input = MatchInput {
            family: 7,
            model: 11,
            ext_family: 7,
            ext_model: 59,
            ncores: 8,
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            model_code: -1,
            bits: brand_bits("ZHAOXIN KaiXian KX-U6780A@2.7GHz", &BRAND_PATTERNS),
            ..Default::default()
        };
        assert_eq!(TABLE[best_match(TABLE, &input).0].name, "LuJiaZui (KX-6000)");

        input.bits = brand_bits("ZHAOXIN KaiSheng KH-37800D@2.7GHz", &BRAND_PATTERNS);
        assert_eq!(TABLE[best_match(TABLE, &input).0].name, "LuJiaZui (KH-30000)");
    }

    #[test]
    fn via_nano() {
        let input = MatchInput {
            family: 6,
            model: 15,
            ext_family: 6,
            ext_model: 15,
            bits: brand_bits("VIA Nano X2 U4025 @ 1.2+GHz", &BRAND_PATTERNS),
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            model_code: -1,
            ..Default::default()
        };
        assert_eq!(TABLE[best_match(TABLE, &input).0].name, "Isaiah (Nano)");
    }
}

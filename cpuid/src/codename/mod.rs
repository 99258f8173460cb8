// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Best-match codename classification.
//!
//! Every reference entry is scored against the decoded identity and the
//! entry with the strictly highest score wins. Ties keep the earliest entry,
//! so table order matters.

mod amd;
mod centaur;
mod intel;

use serde::Serialize;

use crate::decode::ProcessorIdentity;
use crate::vendor::Vendor;

/// Reference row. Fields are compared for exact equality with the observed
/// values, so a `-1` entry also scores against an unknown (`-1`) observation.
#[derive(Clone, Copy, Debug)]
pub struct MatchEntry {
    pub family: i32,
    pub model: i32,
    pub stepping: i32,
    pub ext_family: i32,
    pub ext_model: i32,
    pub ncores: i32,
    pub l2_cache: i32,
    pub l3_cache: i32,
    pub brand_code: i32,
    /// Brand-string derived bits; each shared bit scores 2.
    pub model_bits: u64,
    pub model_code: i32,
    pub name: &'static str,
}

impl MatchEntry {
    #[allow(clippy::too_many_arguments)]
    pub const fn new(
        family: i32,
        model: i32,
        stepping: i32,
        ext_family: i32,
        ext_model: i32,
        ncores: i32,
        l2_cache: i32,
        l3_cache: i32,
        brand_code: i32,
        model_bits: u64,
        model_code: i32,
        name: &'static str,
    ) -> Self {
        MatchEntry {
            family,
            model,
            stepping,
            ext_family,
            ext_model,
            ncores,
            l2_cache,
            l3_cache,
            brand_code,
            model_bits,
            model_code,
            name,
        }
    }
}

/// Observed values the reference rows are compared with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchInput {
    pub family: i32,
    pub model: i32,
    pub stepping: i32,
    pub ext_family: i32,
    pub ext_model: i32,
    pub ncores: i32,
    pub l2_cache: i32,
    pub l3_cache: i32,
    pub brand_code: i32,
    pub bits: u64,
    pub model_code: i32,
}

impl MatchInput {
    pub fn from_identity(
        id: &ProcessorIdentity,
        bits: u64,
        brand_code: i32,
        model_code: i32,
    ) -> Self {
        MatchInput {
            family: id.family,
            model: id.model,
            stepping: id.stepping,
            ext_family: id.ext_family,
            ext_model: id.ext_model,
            ncores: id.num_cores,
            l2_cache: id.caches.l2.size_kb,
            l3_cache: id.caches.l3.size_kb,
            brand_code,
            bits,
            model_code,
        }
    }
}

pub fn score(entry: &MatchEntry, input: &MatchInput) -> i32 {
    let weighted = [
        (entry.family, input.family, 2),
        (entry.model, input.model, 2),
        (entry.stepping, input.stepping, 2),
        (entry.ext_family, input.ext_family, 2),
        (entry.ext_model, input.ext_model, 2),
        (entry.ncores, input.ncores, 2),
        (entry.l2_cache, input.l2_cache, 1),
        (entry.l3_cache, input.l3_cache, 1),
        (entry.brand_code, input.brand_code, 2),
        (entry.model_code, input.model_code, 2),
    ];
    let fields: i32 = weighted
        .iter()
        .filter(|(expected, observed, _)| expected == observed)
        .map(|(_, _, weight)| weight)
        .sum();
    fields + 2 * (entry.model_bits & input.bits).count_ones() as i32
}

/// Index and score of the best entry. An empty table yields `(0, -1)`.
pub fn best_match(table: &[MatchEntry], input: &MatchInput) -> (usize, i32) {
    let mut best = (0, -1);
    for (index, entry) in table.iter().enumerate() {
        let s = score(entry, input);
        if s > best.1 {
            best = (index, s);
        }
    }
    best
}

/// Acceptance floor for a best match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchPolicy {
    /// `None` accepts the best entry whatever its score.
    pub min_score: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub codename: Option<String>,
    pub score: i32,
}

/// Scores `table` and applies `policy` to the winner.
pub fn classify_with(
    table: &[MatchEntry],
    input: &MatchInput,
    policy: MatchPolicy,
) -> Classification {
    let (index, score) = best_match(table, input);
    let Some(entry) = table.get(index) else {
        return Classification { codename: None, score };
    };
    if let Some(min) = policy.min_score {
        if score < min {
            warn!(
                "Best codename match {:?} scored {score}, below the floor of {min}",
                entry.name
            );
            return Classification { codename: None, score };
        }
    }
    Classification {
        codename: Some(entry.name.to_owned()),
        score,
    }
}

/// Picks the vendor table and brand derived inputs for `id`.
pub fn classify(id: &ProcessorIdentity, policy: MatchPolicy) -> Classification {
    let (table, input): (&[MatchEntry], MatchInput) = match id.vendor {
        Vendor::Intel => (intel::TABLE, intel::match_input(id)),
        Vendor::Amd | Vendor::Hygon => (amd::TABLE, amd::match_input(id)),
        Vendor::Centaur | Vendor::Via | Vendor::Zhaoxin => {
            (centaur::TABLE, centaur::match_input(id))
        }
        _ => return Classification::default(),
    };
    classify_with(table, &input, policy)
}

/// Single pattern element against one character. Returns the pattern bytes
/// consumed, or `None` on mismatch.
fn match_entry(c: Option<u8>, p: &[u8]) -> Option<usize> {
    let c = c.filter(|c| *c != 0)?;
    let first = *p.first()?;
    if c == first || first == b'.' || (first == b'#' && c.is_ascii_digit()) {
        return Some(1);
    }
    if first == b'[' {
        let end = p.iter().position(|b| *b == b']')?;
        if p[1..end].contains(&c) {
            return Some(end + 1);
        }
    }
    None
}

/// Finds pattern `p` in `s`, returning the 1-based start of the first match
/// or 0 when there is none.
///
/// `.` matches any character, `#` a decimal digit and `[abc]` one of the
/// listed characters.
pub fn match_pattern(s: &str, p: &str) -> usize {
    let (s, p) = (s.as_bytes(), p.as_bytes());
    for i in 0..s.len() {
        if match_entry(Some(s[i]), p).is_none() {
            continue;
        }
        let (mut j, mut k) = (0, 0);
        while j < p.len() {
            match match_entry(s.get(i + k).copied(), &p[j..]) {
                Some(dj) => {
                    k += 1;
                    j += dj;
                }
                None => break,
            }
        }
        if j == p.len() {
            return i + 1;
        }
    }
    0
}

/// Decimal number starting at 1-based position `pos` of `s`, if any.
pub(crate) fn number_at(s: &str, pos: usize) -> Option<i32> {
    let digits: String = s
        .get(pos.checked_sub(1)?..)?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// ORs the bits of every pattern found in `brand`.
pub(crate) fn brand_bits(brand: &str, patterns: &[(&str, u64)]) -> u64 {
    patterns
        .iter()
        .filter(|(p, _)| match_pattern(brand, p) != 0)
        .fold(0, |acc, (_, bit)| acc | bit)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const TIE: [MatchEntry; 3] = [
        MatchEntry::new(-1, -1, -1, -1, -1, -1, -1, -1, -1, 0, -1, "Unknown"),
        MatchEntry::new(6, -1, -1, -1, 0x97, -1, -1, -1, -1, 0, -1, "First"),
        MatchEntry::new(6, -1, -1, -1, 0x97, -1, -1, -1, -1, 0, -1, "Second"),
    ];

    fn input(family: i32, ext_model: i32) -> MatchInput {
        MatchInput {
            family,
            ext_model,
            ..Default::default()
        }
    }

    #[test]
    fn ties_keep_the_first_entry() {
        let c = classify_with(&TIE, &input(6, 0x97), MatchPolicy::default());
        assert_eq!(c.codename.as_deref(), Some("First"));
        assert_eq!(c.score, 4);
    }

    #[test]
    fn zero_score_returns_first_row_unless_floored() {
        let c = classify_with(&TIE, &input(15, 2), MatchPolicy::default());
        assert_eq!(c, Classification { codename: Some("Unknown".into()), score: 0 });

        let c = classify_with(&TIE, &input(15, 2), MatchPolicy { min_score: Some(1) });
        assert_eq!(c, Classification { codename: None, score: 0 });
    }

    #[test]
    fn weights_and_bits() {
        let entry = MatchEntry::new(6, 7, 1, 6, 0x97, 8, 1280, 30720, 3, 0b1011, 12, "x");
        let all = MatchInput {
            family: 6,
            model: 7,
            stepping: 1,
            ext_family: 6,
            ext_model: 0x97,
            ncores: 8,
            l2_cache: 1280,
            l3_cache: 30720,
            brand_code: 3,
            bits: 0b0011,
            model_code: 12,
        };
        assert_eq!(score(&entry, &all), 2 * 8 + 2 + 4);
        let no_caches = MatchInput { l2_cache: -1, l3_cache: -1, ..all };
        assert_eq!(score(&entry, &no_caches), 2 * 8 + 4);
    }

    #[test]
    fn unknown_values_match_unknown_entries() {
        let entry = MatchEntry::new(-1, -1, -1, -1, -1, -1, -1, -1, -1, 0, -1, "any");
        let unknown = MatchInput {
            family: -1,
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            model_code: -1,
            ..Default::default()
        };
        // family 2, l2 1, l3 1, brand_code 2, model_code 2
        assert_eq!(score(&entry, &unknown), 8);
    }

    #[test]
    fn entry_without_l3_beats_entry_with_l3_on_cacheless_cpu() {
        let table = [
            MatchEntry::new(6, -1, -1, -1, -1, -1, -1, 8192, -1, 0, -1, "WithL3"),
            MatchEntry::new(6, -1, -1, -1, -1, -1, -1, -1, -1, 0, -1, "NoL3"),
        ];
        let input = MatchInput {
            family: 6,
            l2_cache: -1,
            l3_cache: -1,
            brand_code: -1,
            model_code: -1,
            ..Default::default()
        };
        assert_eq!(score(&table[0], &input), 7);
        assert_eq!(best_match(&table, &input), (1, 8));
    }

    #[test]
    fn patterns() {
        assert_eq!(match_pattern("Intel(R) Core(TM) i7-8700K", "i#-"), 19);
        assert_eq!(match_pattern("AMD Ryzen 9 7950X", "Ryzen [3579]"), 5);
        assert_eq!(match_pattern("AMD Ryzen 9 7950X", "Ryzen [24]"), 0);
        assert_eq!(match_pattern("Xeon E5-2690", "E#-##"), 6);
        assert_eq!(match_pattern("abc", "c."), 0);
        assert_eq!(match_pattern("abc", "[ab"), 0);
        assert_eq!(match_pattern("", "a"), 0);
        assert_eq!(number_at("i7-8700K", 4), Some(8700));
        assert_eq!(number_at("i7-", 4), None);
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(
            family in 0i32..32,
            ext_model in 0i32..256,
            bits in any::<u64>(),
        ) {
            let input = MatchInput {
                family,
                ext_model,
                bits,
                ..Default::default()
            };
            let first = classify_with(&TIE, &input, MatchPolicy::default());
            let second = classify_with(&TIE, &input, MatchPolicy::default());
            prop_assert_eq!(first, second);
        }
    }
}

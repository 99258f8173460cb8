// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use serde::Serialize;

use crate::bits;
use crate::raw::{CpuidLeaf, RawProcessorSample};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CacheLevel {
    L1Data,
    L1Instruction,
    L2,
    L3,
    L4,
}

impl CacheLevel {
    pub const ALL: [CacheLevel; 5] = [
        CacheLevel::L1Data,
        CacheLevel::L1Instruction,
        CacheLevel::L2,
        CacheLevel::L3,
        CacheLevel::L4,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CacheLevel::L1Data => "L1D",
            CacheLevel::L1Instruction => "L1I",
            CacheLevel::L2 => "L2",
            CacheLevel::L3 => "L3",
            CacheLevel::L4 => "L4",
        }
    }

    /// Maps a deterministic cache (level, type) pair. Anything else is not a
    /// cache this crate reports.
    fn from_level_type(level: u32, cache_type: u32) -> Option<CacheLevel> {
        match (level, cache_type) {
            (1, 1) => Some(CacheLevel::L1Data),
            (1, 2) => Some(CacheLevel::L1Instruction),
            (2, 3) => Some(CacheLevel::L2),
            (3, 3) => Some(CacheLevel::L3),
            (4, 3) => Some(CacheLevel::L4),
            _ => None,
        }
    }
}

/// Geometry of one cache level. `-1` means unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub size_kb: i32,
    pub assoc: i32,
    pub line_size: i32,
    /// Distinct instances in the topology group, when APIC ids are available.
    pub instances: i32,
}

impl Default for CacheInfo {
    fn default() -> Self {
        CacheInfo {
            size_kb: -1,
            assoc: -1,
            line_size: -1,
            instances: -1,
        }
    }
}

impl CacheInfo {
    pub fn is_known(&self) -> bool {
        self.size_kb >= 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Caches {
    pub l1_data: CacheInfo,
    pub l1_instruction: CacheInfo,
    pub l2: CacheInfo,
    pub l3: CacheInfo,
    pub l4: CacheInfo,
    /// APIC id mask selecting the cache id, per level. Zero when unknown.
    #[serde(skip)]
    sharing_mask: [u32; 5],
}

impl Caches {
    pub fn get(&self, level: CacheLevel) -> &CacheInfo {
        match level {
            CacheLevel::L1Data => &self.l1_data,
            CacheLevel::L1Instruction => &self.l1_instruction,
            CacheLevel::L2 => &self.l2,
            CacheLevel::L3 => &self.l3,
            CacheLevel::L4 => &self.l4,
        }
    }

    pub fn get_mut(&mut self, level: CacheLevel) -> &mut CacheInfo {
        match level {
            CacheLevel::L1Data => &mut self.l1_data,
            CacheLevel::L1Instruction => &mut self.l1_instruction,
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
            CacheLevel::L4 => &mut self.l4,
        }
    }

    pub fn sharing_mask(&self, level: CacheLevel) -> u32 {
        self.sharing_mask[level as usize]
    }

    fn assign(&mut self, level: CacheLevel, size_kb: i32, assoc: i32, line_size: i32) {
        let info = self.get_mut(level);
        info.size_kb = size_kb;
        info.assoc = assoc;
        info.line_size = line_size;
    }
}

/// `ceil(log2(x))`, with `-1` for zero.
pub(crate) fn get_count_order(x: u32) -> i32 {
    match x {
        0 => -1,
        1 => 0,
        x => 32 - (x - 1).leading_zeros() as i32,
    }
}

/// Walks leaf 0x4 (Intel) or 0x8000001D (AMD) sub-leaves until a null entry.
pub(crate) fn decode_deterministic(leaves: &[CpuidLeaf], caches: &mut Caches) {
    for leaf in leaves {
        let level = bits(leaf.eax, 7, 5);
        let cache_type = bits(leaf.eax, 4, 0);
        if level == 0 || cache_type == 0 {
            break;
        }
        let Some(cache) = CacheLevel::from_level_type(level, cache_type) else {
            debug!("Skipping cache level {level} type {cache_type}");
            continue;
        };

        let sharing = bits(leaf.eax, 25, 14) + 1;
        let ways = bits(leaf.ebx, 31, 22) as u64 + 1;
        let partitions = bits(leaf.ebx, 21, 12) as u64 + 1;
        let line_size = bits(leaf.ebx, 11, 0) as u64 + 1;
        let sets = leaf.ecx as u64 + 1;
        let size_kb = ways * partitions * line_size * sets / 1024;

        let order = get_count_order(sharing).max(0) as u32;
        caches.sharing_mask[cache as usize] = u32::MAX.checked_shl(order).unwrap_or(0);
        caches.assign(
            cache,
            i32::try_from(size_kb).unwrap_or(i32::MAX),
            ways as i32,
            line_size as i32,
        );
    }
}

/// L2/L3 associativity field of extended leaf 6.
fn amd_assoc(code: u32) -> i32 {
    match code {
        0x0 => 0,
        0x1 => 1,
        0x2 => 2,
        0x4 => 4,
        0x6 => 8,
        0x8 => 16,
        0xa => 32,
        0xb => 48,
        0xc => 64,
        0xd => 96,
        0xe => 128,
        // Fully associative
        0xf => 255,
        _ => -1,
    }
}

/// Extended leaves 5 (L1) and 6 (L2, L3), used by AMD parts without topology
/// extensions and by Centaur-family parts.
pub(crate) fn decode_legacy_amd(raw: &RawProcessorSample, caches: &mut Caches) {
    if let Some(l1) = raw.extended_leaf(5) {
        caches.assign(
            CacheLevel::L1Data,
            bits(l1.ecx, 31, 24) as i32,
            bits(l1.ecx, 23, 16) as i32,
            bits(l1.ecx, 7, 0) as i32,
        );
        caches.assign(
            CacheLevel::L1Instruction,
            bits(l1.edx, 31, 24) as i32,
            bits(l1.edx, 23, 16) as i32,
            bits(l1.edx, 7, 0) as i32,
        );
    }
    if let Some(l23) = raw.extended_leaf(6) {
        caches.assign(
            CacheLevel::L2,
            bits(l23.ecx, 31, 16) as i32,
            amd_assoc(bits(l23.ecx, 15, 12)),
            bits(l23.ecx, 7, 0) as i32,
        );
        let l3_size = bits(l23.edx, 31, 18) as i32 * 512;
        if l3_size > 0 {
            caches.assign(
                CacheLevel::L3,
                l3_size,
                amd_assoc(bits(l23.edx, 15, 12)),
                bits(l23.edx, 7, 0) as i32,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::SampleBuilder;

    fn deterministic(
        level: u32,
        cache_type: u32,
        sharing: u32,
        ways: u32,
        partitions: u32,
        line: u32,
        sets: u32,
    ) -> CpuidLeaf {
        CpuidLeaf::new(
            ((sharing - 1) << 14) | (level << 5) | cache_type,
            ((ways - 1) << 22) | ((partitions - 1) << 12) | (line - 1),
            sets - 1,
            0,
        )
    }

    #[test]
    fn size_formula() {
        let mut caches = Caches::default();
        decode_deterministic(&[deterministic(2, 3, 2, 8, 1, 64, 2048)], &mut caches);
        assert_eq!(caches.l2.size_kb, 1024);
        assert_eq!(caches.l2.assoc, 8);
        assert_eq!(caches.l2.line_size, 64);
        assert_eq!(caches.sharing_mask(CacheLevel::L2), 0xffff_fffe);
    }

    #[test]
    fn walk_stops_at_null_and_skips_unknown_pairs() {
        let mut caches = Caches::default();
        decode_deterministic(
            &[
                deterministic(1, 1, 2, 12, 1, 64, 64),
                deterministic(1, 3, 2, 8, 1, 64, 64),
                deterministic(1, 2, 2, 8, 1, 64, 64),
                CpuidLeaf::default(),
                deterministic(3, 3, 16, 12, 1, 64, 40960),
            ],
            &mut caches,
        );
        assert_eq!(caches.l1_data.size_kb, 48);
        assert_eq!(caches.l1_instruction.size_kb, 32);
        assert!(!caches.l3.is_known());
        assert_eq!(caches.sharing_mask(CacheLevel::L3), 0);
    }

    #[test]
    fn count_order() {
        assert_eq!(get_count_order(0), -1);
        assert_eq!(get_count_order(1), 0);
        assert_eq!(get_count_order(2), 1);
        assert_eq!(get_count_order(3), 2);
        assert_eq!(get_count_order(16), 4);
        assert_eq!(get_count_order(17), 5);
    }

    #[test]
    fn legacy_amd_leaves() {
        let raw = SampleBuilder::new()
            .max_extended(0x8000_0006)
            .leaf(0x8000_0005, CpuidLeaf::new(0, 0, 0x4002_0140, 0x4002_0140))
            .leaf(0x8000_0006, CpuidLeaf::new(0, 0, 0x0200_6140, 0x0200_6140))
            .build();
        let mut caches = Caches::default();
        decode_legacy_amd(&raw, &mut caches);
        assert_eq!(
            caches.l1_data,
            CacheInfo {
                size_kb: 64,
                assoc: 2,
                line_size: 64,
                instances: -1
            }
        );
        assert_eq!(caches.l2.size_kb, 512);
        assert_eq!(caches.l2.assoc, 8);
        assert_eq!(caches.l3.size_kb, 0x80 * 512);
        assert_eq!(caches.l3.assoc, 8);
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! System topology aggregation.
//!
//! Every logical processor is sampled in turn and runs of consecutive
//! processors sharing a purpose become one [`ProcessorIdentity`] entry. When
//! every processor reports its APIC topology, a new package also starts a new
//! entry.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::affinity::{processor_count, AffinityMask};
use crate::bits;
use crate::cache::CacheLevel;
use crate::codename::MatchPolicy;
use crate::decode::{decode, ProcessorIdentity};
use crate::features::{decode_features, CpuFeatures};
use crate::raw::{acquire_sample, RawProcessorSample, EXTENDED_BASE};
use crate::vendor::{identify_vendor, vendor_signature, Vendor};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum CpuPurpose {
    #[default]
    General,
    Performance,
    Efficiency,
    LowPowerEfficiency,
    UltimatePerformance,
}

impl CpuPurpose {
    pub fn name(&self) -> &'static str {
        match self {
            CpuPurpose::General => "general",
            CpuPurpose::Performance => "performance",
            CpuPurpose::Efficiency => "efficiency",
            CpuPurpose::LowPowerEfficiency => "low-power efficiency",
            CpuPurpose::UltimatePerformance => "ultimate performance",
        }
    }

    /// Short tag appended to per-cluster labels such as `CPU0-P`.
    pub fn suffix(&self) -> &'static str {
        match self {
            CpuPurpose::General => "-G",
            CpuPurpose::Performance => "-P",
            CpuPurpose::Efficiency => "-E",
            CpuPurpose::LowPowerEfficiency => "-LPE",
            CpuPurpose::UltimatePerformance => "-UP",
        }
    }
}

impl fmt::Display for CpuPurpose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Leaf 0x1A EAX[31:24]
const INTEL_CORE_TYPE_ATOM: u32 = 0x20;
const INTEL_CORE_TYPE_CORE: u32 = 0x40;

fn intel_purpose(raw: &RawProcessorSample) -> CpuPurpose {
    if !decode_features(raw, Vendor::Intel).contains(CpuFeatures::HYBRID) {
        return CpuPurpose::General;
    }
    match raw.basic_leaf(0x1a).map(|l| bits(l.eax, 31, 24)) {
        Some(INTEL_CORE_TYPE_ATOM) => CpuPurpose::Efficiency,
        Some(INTEL_CORE_TYPE_CORE) => CpuPurpose::Performance,
        _ => CpuPurpose::General,
    }
}

fn amd_purpose(raw: &RawProcessorSample) -> CpuPurpose {
    if raw.max_extended() < EXTENDED_BASE + 0x26 {
        return CpuPurpose::General;
    }
    let heterogeneous = raw
        .amd_topology
        .iter()
        .take_while(|l| l.ebx != 0)
        .find(|l| l.eax & (1 << 30) != 0);
    match heterogeneous.map(|l| bits(l.ebx, 31, 28)) {
        Some(0) => CpuPurpose::Performance,
        Some(1) => CpuPurpose::Efficiency,
        _ => CpuPurpose::General,
    }
}

/// Core type of the processor that produced `raw`. Vendors without a hybrid
/// scheme are always general purpose.
pub(crate) fn identify_purpose(raw: &RawProcessorSample) -> CpuPurpose {
    match identify_vendor(raw) {
        Ok(Vendor::Intel) => intel_purpose(raw),
        Ok(Vendor::Amd) => amd_purpose(raw),
        _ => CpuPurpose::General,
    }
}

/// Identifiers derived from the x2APIC id of leaf 0xB.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApicTopology {
    pub apic_id: u32,
    pub package_id: u32,
    pub core_id: u32,
    pub smt_id: u32,
}

const LEVEL_TYPE_SMT: u32 = 1;
const LEVEL_TYPE_CORE: u32 = 2;

fn high_mask(shift: u32) -> u32 {
    u32::MAX.checked_shl(shift).unwrap_or(0)
}

/// Splits the x2APIC id into package, core and thread ids. `None` when the
/// vendor or the processor does not report leaf 0xB.
pub fn apic_topology(raw: &RawProcessorSample) -> Option<ApicTopology> {
    if !matches!(identify_vendor(raw), Ok(Vendor::Intel | Vendor::Amd)) {
        return None;
    }
    let leaf = raw.basic_leaf(0xb)?;
    if bits(leaf.ebx, 15, 0) == 0 {
        return None;
    }

    let levels: Vec<_> = raw
        .extended_topology
        .iter()
        .take_while(|l| l.eax != 0 && l.ebx != 0)
        .collect();
    let last = levels.last()?;
    let core_shift = bits(last.eax, 4, 0);
    if bits(last.ecx, 15, 8) == 0 {
        return None;
    }

    let mut topology = ApicTopology {
        apic_id: leaf.edx,
        package_id: leaf.edx & high_mask(core_shift),
        ..Default::default()
    };
    let mut smt_mask = 0;
    for level in &levels {
        match bits(level.ecx, 15, 8) {
            LEVEL_TYPE_SMT => {
                smt_mask = !high_mask(bits(level.eax, 4, 0));
                topology.smt_id = topology.apic_id & smt_mask;
            }
            LEVEL_TYPE_CORE => {
                let core_mask = !high_mask(core_shift) ^ smt_mask;
                topology.core_id = topology.apic_id & core_mask;
            }
            _ => {}
        }
    }
    Some(topology)
}

/// Purpose clusters of the whole system.
#[derive(Debug, Serialize)]
pub struct SystemTopology {
    pub entries: Vec<ProcessorIdentity>,
    pub total_logical_cpus: i32,
    /// Distinct cache instances per level across all clusters. Empty unless
    /// every sampled processor reported its APIC topology.
    pub cache_instances: BTreeMap<&'static str, usize>,
    /// Last per-processor error. Aggregation goes on past it, so the entries
    /// may be incomplete.
    #[serde(skip)]
    pub last_error: Option<Error>,
}

#[derive(Default)]
struct ClusterInstances {
    package_id: Option<u32>,
    cores: BTreeSet<(u32, u32)>,
    caches: [BTreeSet<u32>; 5],
}

/// Groups `count` logical processors, sampling each with `acquire`.
///
/// Failing to sample processor 0 fails the whole build; any later failure is
/// logged, kept in [`SystemTopology::last_error`] and the processor skipped.
pub fn build_topology_with<F>(
    count: usize,
    mut acquire: F,
    policy: MatchPolicy,
) -> Result<SystemTopology>
where
    F: FnMut(usize) -> Result<RawProcessorSample>,
{
    let mut entries: Vec<ProcessorIdentity> = Vec::new();
    let mut instances: Vec<ClusterInstances> = Vec::new();
    let mut system_caches: [BTreeSet<u32>; 5] = Default::default();
    let mut apic_supported = true;
    let mut last_error = None;
    let mut sampled = 0;

    for cpu in 0..count {
        let raw = match acquire(cpu) {
            Ok(raw) => raw,
            Err(Error::UnsupportedInstruction) if cpu == 0 => {
                return Err(Error::UnsupportedInstruction)
            }
            Err(e) if cpu == 0 => {
                error!("Failed to sample the first logical CPU: {e}");
                return Err(Error::NoProcessor);
            }
            Err(e) => {
                warn!("Skipping logical CPU {cpu}: {e}");
                last_error = Some(e);
                continue;
            }
        };
        sampled += 1;

        let purpose = identify_purpose(&raw);
        let apic = if apic_supported { apic_topology(&raw) } else { None };
        apic_supported = apic.is_some();
        debug!(
            "Logical CPU {cpu}: signature {:?}, purpose {purpose}, APIC {:?}",
            String::from_utf8_lossy(&vendor_signature(&raw)),
            apic.map(|a| a.apic_id)
        );

        let package_id = apic.map(|a| a.package_id);
        let new_package =
            apic_supported && instances.last().is_some_and(|c| c.package_id != package_id);
        if new_package || entries.last().map_or(true, |e| e.purpose != purpose) {
            match decode(&raw, policy) {
                Ok(mut id) => {
                    id.purpose = purpose;
                    id.index = cpu;
                    id.num_logical_cpus = 0;
                    entries.push(id);
                    instances.push(ClusterInstances {
                        package_id,
                        ..Default::default()
                    });
                }
                Err(e) => {
                    warn!("Failed to decode logical CPU {cpu}: {e}");
                    last_error = Some(e);
                    continue;
                }
            }
        }

        let (Some(entry), Some(cluster)) = (entries.last_mut(), instances.last_mut()) else {
            continue;
        };
        entry.affinity_mask.set(cpu);
        entry.num_logical_cpus += 1;
        if let Some(apic) = apic {
            cluster.cores.insert((apic.package_id, apic.core_id));
            for level in CacheLevel::ALL {
                let mask = entry.caches.sharing_mask(level);
                if mask != 0 {
                    cluster.caches[level as usize].insert(apic.apic_id & mask);
                    system_caches[level as usize].insert(apic.apic_id & mask);
                }
            }
        }
    }

    let total_logical_cpus = i32::try_from(sampled).unwrap_or(i32::MAX);
    for (entry, cluster) in entries.iter_mut().zip(&instances) {
        if apic_supported {
            entry.num_cores = cluster.cores.len() as i32;
            for level in CacheLevel::ALL {
                let count = cluster.caches[level as usize].len();
                if count > 0 {
                    entry.caches.get_mut(level).instances = count as i32;
                }
            }
        } else {
            let logical = entry.num_logical_cpus;
            let divisor = if entry.num_cores > 0 && logical % entry.num_cores == 0 {
                logical / entry.num_cores
            } else {
                1
            };
            entry.num_cores = logical / divisor;
        }
        entry.total_logical_cpus = total_logical_cpus;
    }

    let cache_instances = if apic_supported {
        CacheLevel::ALL
            .iter()
            .filter(|level| !system_caches[**level as usize].is_empty())
            .map(|level| (level.name(), system_caches[*level as usize].len()))
            .collect()
    } else {
        BTreeMap::new()
    };

    Ok(SystemTopology {
        entries,
        total_logical_cpus,
        cache_instances,
        last_error,
    })
}

/// Samples every online logical processor of this machine.
pub fn build_topology(policy: MatchPolicy) -> Result<SystemTopology> {
    build_topology_with(processor_count()?, acquire_sample, policy)
}

impl SystemTopology {
    /// Entry owning logical processor `cpu`.
    pub fn entry_for(&self, cpu: usize) -> Option<&ProcessorIdentity> {
        self.entries.iter().find(|e| e.affinity_mask.get(cpu))
    }
}

impl ProcessorIdentity {
    /// `CPU<index>` with the purpose suffix, e.g. `CPU0-P`.
    pub fn label(&self) -> String {
        format!("CPU{}{}", self.index, self.purpose.suffix())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::raw::{CpuidLeaf, CpuidReg, SampleBuilder};

    fn hybrid(core_type: u32) -> RawProcessorSample {
        SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(0x1a)
            .signature(6, 0x97, 2)
            .set_bits(7, CpuidReg::EDX, 1 << 15)
            .leaf(0x1a, CpuidLeaf::new(core_type << 24, 0, 0, 0))
            .build()
    }

    fn performance_then_efficiency(cpu: usize) -> Result<RawProcessorSample> {
        Ok(hybrid(if cpu < 4 { INTEL_CORE_TYPE_CORE } else { INTEL_CORE_TYPE_ATOM }))
    }

    #[test]
    fn purpose_runs_become_entries() {
        let topology =
            build_topology_with(8, performance_then_efficiency, MatchPolicy::default()).unwrap();
        assert_eq!(topology.entries.len(), 2);
        assert_eq!(topology.total_logical_cpus, 8);

        let (p, e) = (&topology.entries[0], &topology.entries[1]);
        assert_eq!((p.purpose, p.index, p.num_logical_cpus), (CpuPurpose::Performance, 0, 4));
        assert_eq!((e.purpose, e.index, e.num_logical_cpus), (CpuPurpose::Efficiency, 4, 4));
        assert_eq!(p.total_logical_cpus, 8);
        assert_eq!(e.total_logical_cpus, 8);
        assert_eq!(p.affinity_mask.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(e.affinity_mask.iter().collect::<Vec<_>>(), vec![4, 5, 6, 7]);
        assert_eq!(p.label(), "CPU0-P");
        assert_eq!(e.label(), "CPU4-E");
        assert!(topology.cache_instances.is_empty());
        assert!(topology.last_error.is_none());
        assert_eq!(topology.entry_for(5).map(|e| e.purpose), Some(CpuPurpose::Efficiency));
    }

    #[test]
    fn first_processor_failure_is_fatal() {
        let r = build_topology_with(
            4,
            |_| Err(Error::AffinityUnavailable(0)),
            MatchPolicy::default(),
        );
        assert!(matches!(r, Err(Error::NoProcessor)));

        let r = build_topology_with(
            4,
            |_| Err(Error::UnsupportedInstruction),
            MatchPolicy::default(),
        );
        assert!(matches!(r, Err(Error::UnsupportedInstruction)));
    }

    #[test]
    fn later_failures_are_recorded() {
        let acquire = |cpu: usize| {
            if cpu == 2 {
                Err(Error::AffinityUnavailable(cpu))
            } else {
                Ok(hybrid(INTEL_CORE_TYPE_CORE))
            }
        };
        let topology = build_topology_with(4, acquire, MatchPolicy::default()).unwrap();
        assert_eq!(topology.entries.len(), 1);
        assert_eq!(topology.entries[0].num_logical_cpus, 3);
        assert_eq!(topology.total_logical_cpus, 3);
        assert!(!topology.entries[0].affinity_mask.get(2));
        assert!(matches!(topology.last_error, Some(Error::AffinityUnavailable(2))));
    }

    #[test]
    fn unknown_vendor_does_not_abort() {
        let acquire = |cpu: usize| {
            if cpu == 1 {
                Ok(SampleBuilder::new().vendor(b"NotARealCPU!").build())
            } else {
                Ok(hybrid(INTEL_CORE_TYPE_CORE))
            }
        };
        let topology = build_topology_with(3, acquire, MatchPolicy::default()).unwrap();
        assert_eq!(topology.entries.len(), 1);
        assert_eq!(topology.entries[0].num_logical_cpus, 2);
        assert!(!topology.entries[0].affinity_mask.get(1));
        assert!(matches!(topology.last_error, Some(Error::UnknownVendor(_))));
    }

    /// Two cores with two threads each, sharing one L3 and with a private L2.
    fn smt_sample(apic_id: u32) -> Result<RawProcessorSample> {
        Ok(SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(0xb)
            .signature(6, 0x9e, 10)
            .sub_leaf(4, 0, CpuidLeaf::new((1 << 14) | (2 << 5) | 3, (3 << 22) | 63, 1023, 0))
            .sub_leaf(4, 1, CpuidLeaf::new((3 << 14) | (3 << 5) | 3, (15 << 22) | 63, 8191, 0))
            .sub_leaf(0xb, 0, CpuidLeaf::new(1, 2, 1 << 8, apic_id))
            .sub_leaf(0xb, 1, CpuidLeaf::new(2, 4, (2 << 8) | 1, apic_id))
            .build())
    }

    #[test]
    fn apic_ids_split_levels() {
        let topo = apic_topology(&smt_sample(3).unwrap()).unwrap();
        assert_eq!(
            topo,
            ApicTopology {
                apic_id: 3,
                package_id: 0,
                core_id: 2,
                smt_id: 1
            }
        );
    }

    #[test]
    fn apic_topology_counts_instances() {
        let topology =
            build_topology_with(4, |cpu| smt_sample(cpu as u32), MatchPolicy::default()).unwrap();
        assert_eq!(topology.entries.len(), 1);
        let entry = &topology.entries[0];
        assert_eq!(entry.num_cores, 2);
        assert_eq!(entry.num_logical_cpus, 4);
        assert_eq!(entry.caches.l2.instances, 2);
        assert_eq!(entry.caches.l3.instances, 1);
        assert_eq!(entry.caches.l1_data.instances, -1);
        assert_eq!(topology.cache_instances.get("L2"), Some(&2));
        assert_eq!(topology.cache_instances.get("L3"), Some(&1));
    }

    #[test]
    fn packages_split_entries() {
        // APIC ids 4..8 sit on the second package.
        let topology =
            build_topology_with(8, |cpu| smt_sample(cpu as u32), MatchPolicy::default()).unwrap();
        assert_eq!(topology.entries.len(), 2);
        assert_eq!(topology.total_logical_cpus, 8);
        for (entry, first) in topology.entries.iter().zip([0, 4]) {
            assert_eq!(entry.purpose, CpuPurpose::General);
            assert_eq!(entry.index, first);
            assert_eq!(entry.num_logical_cpus, 4);
            assert_eq!(entry.num_cores, 2);
            assert_eq!(entry.caches.l2.instances, 2);
            assert_eq!(
                entry.affinity_mask.iter().collect::<Vec<_>>(),
                (first..first + 4).collect::<Vec<_>>()
            );
        }
        assert_eq!(topology.entry_for(6).map(|e| e.index), Some(4));
    }

    #[test]
    fn amd_heterogeneous_cores() {
        let sample = |core_type: u32| {
            SampleBuilder::new()
                .vendor(b"AuthenticAMD")
                .max_extended(0x8000_0026)
                .sub_leaf(0x8000_0026, 0, CpuidLeaf::new(1 << 30, (core_type << 28) | 1, 0, 0))
                .build()
        };
        assert_eq!(identify_purpose(&sample(0)), CpuPurpose::Performance);
        assert_eq!(identify_purpose(&sample(1)), CpuPurpose::Efficiency);

        let homogeneous = SampleBuilder::new()
            .vendor(b"AuthenticAMD")
            .max_extended(0x8000_0026)
            .sub_leaf(0x8000_0026, 0, CpuidLeaf::new(0, 1, 0, 0))
            .build();
        assert_eq!(identify_purpose(&homogeneous), CpuPurpose::General);
    }

    proptest! {
        #[test]
        fn entries_follow_purpose_runs(kinds in proptest::collection::vec(any::<bool>(), 1..32)) {
            let acquire = |cpu: usize| {
                Ok(hybrid(if kinds[cpu] { INTEL_CORE_TYPE_CORE } else { INTEL_CORE_TYPE_ATOM }))
            };
            let topology =
                build_topology_with(kinds.len(), acquire, MatchPolicy::default()).unwrap();
            let runs = 1 + kinds.windows(2).filter(|w| w[0] != w[1]).count();
            prop_assert_eq!(topology.entries.len(), runs);
            let logical: i32 = topology.entries.iter().map(|e| e.num_logical_cpus).sum();
            prop_assert_eq!(logical as usize, kinds.len());
            prop_assert!(topology
                .entries
                .iter()
                .all(|e| e.total_logical_cpus as usize == kinds.len()));
        }
    }
}

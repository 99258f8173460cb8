// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use serde::Serialize;

use crate::affinity::{processor_count, AffinityMask};
use crate::bits;
use crate::cache::{decode_deterministic, decode_legacy_amd, Caches};
use crate::codename::{self, MatchPolicy};
use crate::features::{decode_features, CpuFeatures};
use crate::hypervisor::{detect_hypervisor, Hypervisor};
use crate::raw::{capture, cpuid_supported, HostCpuid, RawProcessorSample, EXTENDED_BASE};
use crate::topology::{identify_purpose, CpuPurpose};
use crate::vendor::{identify_vendor, vendor_signature, Vendor};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Architecture {
    X86,
    #[default]
    Unknown,
}

/// Decoded identity of one logical processor, or of a purpose cluster once
/// the topology aggregator has filled in the counts and affinity mask.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessorIdentity {
    pub architecture: Architecture,
    pub vendor: Vendor,
    /// The raw 12-byte vendor signature.
    pub vendor_str: String,
    /// Brand string with leading blanks removed; empty when not reported.
    pub brand: String,
    pub family: i32,
    pub model: i32,
    pub stepping: i32,
    pub ext_family: i32,
    pub ext_model: i32,
    /// AMD package type (ext leaf 1 EBX[31:28]), `-1` elsewhere.
    pub pkg_type: i32,
    /// Width of the SSE execution units in bits, `-1` when unknown.
    pub sse_size: i32,
    pub features: CpuFeatures,
    pub num_cores: i32,
    pub num_logical_cpus: i32,
    pub total_logical_cpus: i32,
    pub caches: Caches,
    pub codename: Option<String>,
    pub codename_score: i32,
    pub purpose: CpuPurpose,
    pub hypervisor: Hypervisor,
    pub affinity_mask: AffinityMask,
    /// First logical processor of the cluster.
    pub index: usize,
}

impl ProcessorIdentity {
    fn new(vendor: Vendor, vendor_str: String) -> Self {
        ProcessorIdentity {
            architecture: Architecture::X86,
            vendor,
            vendor_str,
            brand: String::new(),
            family: 0,
            model: 0,
            stepping: 0,
            ext_family: 0,
            ext_model: 0,
            pkg_type: -1,
            sse_size: -1,
            features: CpuFeatures::empty(),
            num_cores: -1,
            num_logical_cpus: -1,
            total_logical_cpus: 0,
            caches: Caches::default(),
            codename: None,
            codename_score: 0,
            purpose: CpuPurpose::General,
            hypervisor: Hypervisor::None,
            affinity_mask: AffinityMask::new(),
            index: 0,
        }
    }
}

fn decode_signature(id: &mut ProcessorIdentity, eax: u32) {
    id.family = bits(eax, 11, 8) as i32;
    id.model = bits(eax, 7, 4) as i32;
    id.stepping = bits(eax, 3, 0) as i32;
    let xmodel = bits(eax, 19, 16) as i32;
    let xfamily = bits(eax, 27, 20) as i32;

    // AMD only adds the extended family for base family 0xF.
    id.ext_family = if id.vendor == Vendor::Amd && id.family < 0xf {
        id.family
    } else {
        id.family + xfamily
    };
    id.ext_model = id.model + (xmodel << 4);
}

fn decode_brand(raw: &RawProcessorSample) -> String {
    if raw.max_extended() < EXTENDED_BASE + 4 {
        return String::new();
    }
    let bytes: Vec<u8> = raw.extended[2..=4]
        .iter()
        .flat_map(|l| [l.eax, l.ebx, l.ecx, l.edx])
        .flat_map(u32::to_le_bytes)
        .collect();
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_start_matches(' ').to_owned()
}

fn decode_sse_size(id: &ProcessorIdentity) -> i32 {
    if !id.features.contains(CpuFeatures::SSE) {
        return -1;
    }
    match id.vendor {
        Vendor::Amd if id.ext_family >= 16 && id.ext_family != 17 => 128,
        Vendor::Amd => 64,
        Vendor::Intel if id.family == 6 && id.ext_model >= 15 => 128,
        Vendor::Intel => 64,
        _ => -1,
    }
}

/// Leaf 1 logical count and leaf 4 core count, shared by every vendor.
fn decode_cores_common(raw: &RawProcessorSample, id: &mut ProcessorIdentity) {
    let logical = raw.basic_leaf(1).map_or(-1, |l| bits(l.ebx, 23, 16) as i32);
    let cores = raw.basic_leaf(4).map_or(-1, |l| bits(l.eax, 31, 26) as i32 + 1);

    if id.features.contains(CpuFeatures::HT) {
        if cores > 1 {
            id.num_cores = cores;
            id.num_logical_cpus = logical;
        } else {
            id.num_cores = 1;
            id.num_logical_cpus = logical.max(1);
            if id.num_logical_cpus == 1 {
                id.features.remove(CpuFeatures::HT);
            }
        }
    } else {
        id.num_cores = logical.max(1);
        id.num_logical_cpus = id.num_cores;
    }
}

fn decode_cores_amd(raw: &RawProcessorSample, id: &mut ProcessorIdentity) {
    let logical = raw.basic_leaf(1).map_or(-1, |l| bits(l.ebx, 23, 16) as i32);
    let mut cores = raw.extended_leaf(8).map_or(-1, |l| bits(l.ecx, 7, 0) as i32 + 1);

    if !id.features.contains(CpuFeatures::HT) {
        id.num_cores = 1;
        id.num_logical_cpus = 1;
        return;
    }
    if cores > 1 {
        if id.ext_family >= 0x17 {
            if let Some(l) = raw.extended_leaf(0x1e) {
                cores /= bits(l.ebx, 15, 8) as i32 + 1;
            }
        }
        id.num_cores = cores;
        id.num_logical_cpus = logical;
    } else {
        id.num_cores = 1;
        id.num_logical_cpus = logical.max(1);
    }
}

fn decode_caches(raw: &RawProcessorSample, id: &mut ProcessorIdentity) {
    match id.vendor {
        Vendor::Intel => {
            if raw.basic_leaf(4).is_some() {
                decode_deterministic(&raw.deterministic_cache, &mut id.caches);
            }
        }
        Vendor::Amd | Vendor::Hygon => {
            if id.features.contains(CpuFeatures::TOPOEXT) && raw.extended_leaf(0x1d).is_some() {
                decode_deterministic(&raw.amd_cache, &mut id.caches);
            } else {
                decode_legacy_amd(raw, &mut id.caches);
            }
        }
        Vendor::Centaur | Vendor::Via | Vendor::Zhaoxin => decode_legacy_amd(raw, &mut id.caches),
        _ => {}
    }
}

/// Decodes one raw sample. Counts describe a single package; the topology
/// aggregator replaces them with system-wide numbers.
pub fn decode(raw: &RawProcessorSample, policy: MatchPolicy) -> Result<ProcessorIdentity> {
    let vendor = identify_vendor(raw)?;
    let signature = vendor_signature(raw);
    let mut id = ProcessorIdentity::new(vendor, String::from_utf8_lossy(&signature).into_owned());

    if let Some(leaf1) = raw.basic_leaf(1) {
        decode_signature(&mut id, leaf1.eax);
    }
    id.brand = decode_brand(raw);
    id.features = decode_features(raw, vendor);
    id.sse_size = decode_sse_size(&id);

    match vendor {
        Vendor::Amd | Vendor::Hygon => {
            decode_cores_amd(raw, &mut id);
            id.pkg_type = raw.extended_leaf(1).map_or(-1, |l| bits(l.ebx, 31, 28) as i32);
        }
        _ => decode_cores_common(raw, &mut id),
    }
    decode_caches(raw, &mut id);

    id.hypervisor = detect_hypervisor(raw, vendor, id.features);
    id.purpose = identify_purpose(raw);

    let classification = codename::classify(&id, policy);
    id.codename = classification.codename;
    id.codename_score = classification.score;

    debug!(
        "Decoded {} family {:#x} model {:#x} stepping {} as {:?} (score {})",
        id.vendor, id.ext_family, id.ext_model, id.stepping, id.codename, id.codename_score
    );
    Ok(id)
}

/// Identifies the processor the calling thread runs on.
pub fn identify(policy: MatchPolicy) -> Result<ProcessorIdentity> {
    if !cpuid_supported() {
        return Err(Error::UnsupportedInstruction);
    }
    let raw = capture(&HostCpuid);
    let mut id = decode(&raw, policy)?;
    id.total_logical_cpus = i32::try_from(processor_count()?).unwrap_or(i32::MAX);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{CpuidLeaf, CpuidReg, SampleBuilder};

    const SSE: u32 = 1 << 25;
    const HT: u32 = 1 << 28;

    fn alder_lake() -> RawProcessorSample {
        SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(0x1f)
            .max_extended(0x8000_0008)
            .leaf(1, CpuidLeaf::new(0, 24 << 16, 0, 0))
            .signature(6, 0x97, 2)
            .set_bits(1, CpuidReg::EDX, SSE | HT)
            .sub_leaf(
                4,
                0,
                CpuidLeaf::new((15 << 26) | (1 << 14) | (1 << 5) | 1, (11 << 22) | 63, 63, 0),
            )
            .sub_leaf(
                4,
                1,
                CpuidLeaf::new((15 << 26) | (1 << 14) | (2 << 5) | 3, (9 << 22) | 63, 2047, 0),
            )
            .brand("12th Gen Intel(R) Core(TM) i9-12900K")
            .build()
    }

    #[test]
    fn intel_identity() {
        let id = decode(&alder_lake(), MatchPolicy::default()).unwrap();
        assert_eq!(id.vendor, Vendor::Intel);
        assert_eq!(id.vendor_str, "GenuineIntel");
        assert_eq!((id.family, id.model, id.stepping), (6, 7, 2));
        assert_eq!((id.ext_family, id.ext_model), (6, 0x97));
        assert_eq!(id.brand, "12th Gen Intel(R) Core(TM) i9-12900K");
        assert_eq!(id.sse_size, 128);
        assert_eq!((id.num_cores, id.num_logical_cpus), (16, 24));
        assert_eq!(id.caches.l1_data.size_kb, 48);
        assert_eq!(id.caches.l2.size_kb, 1280);
        assert_eq!(id.pkg_type, -1);
        assert_eq!(id.codename.as_deref(), Some("Alder Lake-S (Core i3/i5/i7/i9)"));
        assert_eq!(id.hypervisor, Hypervisor::None);
    }

    #[test]
    fn amd_identity() {
        let raw = SampleBuilder::new()
            .vendor(b"AuthenticAMD")
            .max_basic(0x10)
            .max_extended(0x8000_001e)
            .leaf(1, CpuidLeaf::new(0, 32 << 16, 0, SSE | HT))
            .signature(0x19, 0x61, 2)
            .leaf(0x8000_0001, CpuidLeaf::new(0, 4 << 28, 0, 0))
            .leaf(0x8000_0008, CpuidLeaf::new(0, 0, 31, 0))
            .leaf(0x8000_001e, CpuidLeaf::new(0, 1 << 8, 0, 0))
            .brand("AMD Ryzen 9 7950X 16-Core Processor            ")
            .build();
        let id = decode(&raw, MatchPolicy::default()).unwrap();
        assert_eq!((id.ext_family, id.ext_model), (0x19, 0x61));
        assert_eq!((id.num_cores, id.num_logical_cpus), (16, 32));
        assert_eq!(id.pkg_type, 4);
        assert_eq!(id.sse_size, 128);
        assert_eq!(id.codename.as_deref(), Some("Raphael (Ryzen)"));
    }

    #[test]
    fn extended_family_is_vendor_specific() {
        let eax = (1 << 20) | (6 << 8);
        for (vendor, expected) in [(b"AuthenticAMD", 6), (b"GenuineIntel", 7)] {
            let raw = SampleBuilder::new()
                .vendor(vendor)
                .max_basic(1)
                .leaf(1, CpuidLeaf::new(eax, 0, 0, 0))
                .build();
            assert_eq!(decode(&raw, MatchPolicy::default()).unwrap().ext_family, expected);
        }
    }

    #[test]
    fn brand_needs_leaf_4_and_is_trimmed() {
        let builder = || SampleBuilder::new().vendor(b"GenuineIntel").brand("   Intel(R) Xeon(R)");
        let id =
            decode(&builder().max_extended(0x8000_0004).build(), MatchPolicy::default()).unwrap();
        assert_eq!(id.brand, "Intel(R) Xeon(R)");
        let id =
            decode(&builder().max_extended(0x8000_0003).build(), MatchPolicy::default()).unwrap();
        assert_eq!(id.brand, "");
    }

    #[test]
    fn sse_width_rules() {
        let sse = |vendor: &[u8; 12], family: u32, model: u32| {
            let raw = SampleBuilder::new()
                .vendor(vendor)
                .max_basic(1)
                .signature(family, model, 0)
                .set_bits(1, CpuidReg::EDX, SSE)
                .build();
            decode(&raw, MatchPolicy::default()).unwrap().sse_size
        };
        assert_eq!(sse(b"AuthenticAMD", 0x10, 2), 128);
        assert_eq!(sse(b"AuthenticAMD", 0x11, 3), 64);
        assert_eq!(sse(b"GenuineIntel", 6, 0x0f), 128);
        assert_eq!(sse(b"GenuineIntel", 6, 0x0e), 64);
        assert_eq!(sse(b"HygonGenuine", 0x18, 0), -1);

        let raw = SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(1)
            .signature(6, 0x3a, 9)
            .build();
        assert_eq!(decode(&raw, MatchPolicy::default()).unwrap().sse_size, -1);
    }

    #[test]
    fn single_thread_clears_ht() {
        let raw = SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(1)
            .leaf(1, CpuidLeaf::new(0, 1 << 16, 0, HT))
            .build();
        let id = decode(&raw, MatchPolicy::default()).unwrap();
        assert_eq!((id.num_cores, id.num_logical_cpus), (1, 1));
        assert!(!id.features.contains(CpuFeatures::HT));
    }

    #[test]
    fn unknown_vendor_fails() {
        let raw = SampleBuilder::new().vendor(b"NotARealCPU!").build();
        assert!(matches!(decode(&raw, MatchPolicy::default()), Err(Error::UnknownVendor(_))));
    }

    #[test]
    fn serializes_to_json() {
        let id = decode(&alder_lake(), MatchPolicy::default()).unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json["vendor"], "Intel");
        assert_eq!(json["caches"]["l2"]["size_kb"], 1280);
        assert!(json["features"].as_array().unwrap().iter().any(|f| f == "sse"));
    }
}

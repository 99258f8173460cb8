// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Raw CPUID acquisition.
//!
//! A [`RawProcessorSample`] is the register dump of one logical processor. It
//! is captured once and never modified; all decoding works from it so that the
//! same dump always yields the same identity.

use serde::{Serialize, Serializer};

use crate::affinity::ScopedAffinity;
use crate::{Error, Result};

pub const MAX_BASIC_LEAVES: usize = 32;
pub const MAX_EXTENDED_LEAVES: usize = 32;
/// Leaf 0x4 sub-leaves.
pub const MAX_DETERMINISTIC_CACHE: usize = 8;
/// Leaf 0xB sub-leaves.
pub const MAX_EXTENDED_TOPOLOGY: usize = 4;
/// Leaf 0x12 sub-leaves.
pub const MAX_SGX: usize = 4;
/// Leaf 0x14 sub-leaves.
pub const MAX_PROCESSOR_TRACE: usize = 4;
/// Leaf 0x8000001D sub-leaves.
pub const MAX_AMD_CACHE: usize = 4;
/// Leaf 0x80000026 sub-leaves.
pub const MAX_AMD_TOPOLOGY: usize = 4;

pub const EXTENDED_BASE: u32 = 0x8000_0000;
pub const HYPERVISOR_BASE: u32 = 0x4000_0000;

const LEAF_DETERMINISTIC_CACHE: u32 = 0x4;
const LEAF_EXTENDED_TOPOLOGY: u32 = 0xb;
const LEAF_SGX: u32 = 0x12;
const LEAF_PROCESSOR_TRACE: u32 = 0x14;
const LEAF_AMD_CACHE: u32 = 0x8000_001d;
const LEAF_AMD_TOPOLOGY: u32 = 0x8000_0026;

pub(crate) fn serialize_as_hex<S: Serializer>(
    input: &u32,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{input:#010x}"))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum CpuidReg {
    EAX,
    EBX,
    ECX,
    EDX,
}

/// Output registers of one CPUID invocation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CpuidLeaf {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidLeaf {
    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        CpuidLeaf { eax, ebx, ecx, edx }
    }

    pub fn get(&self, reg: CpuidReg) -> u32 {
        match reg {
            CpuidReg::EAX => self.eax,
            CpuidReg::EBX => self.ebx,
            CpuidReg::ECX => self.ecx,
            CpuidReg::EDX => self.edx,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CpuidLeaf::default()
    }

    /// Twelve signature bytes taken from three registers, in order.
    pub(crate) fn signature(&self, regs: [CpuidReg; 3]) -> [u8; 12] {
        let mut sig = [0u8; 12];
        for (chunk, reg) in sig.chunks_exact_mut(4).zip(regs) {
            chunk.copy_from_slice(&self.get(reg).to_le_bytes());
        }
        sig
    }
}

/// Something able to execute CPUID on the current logical processor.
pub trait CpuidSource {
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> CpuidLeaf;
}

/// The CPUID instruction of the processor the thread currently runs on.
pub struct HostCpuid;

impl CpuidSource for HostCpuid {
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> CpuidLeaf {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                // SAFETY: CPUID is available on every x86_64 processor and has no
                // side effects besides writing the output registers.
                let r = unsafe { std::arch::x86_64::__cpuid_count(leaf, sub_leaf) };
                CpuidLeaf::new(r.eax, r.ebx, r.ecx, r.edx)
            } else {
                let _ = (leaf, sub_leaf);
                CpuidLeaf::default()
            }
        }
    }
}

/// Whether this build can execute CPUID at all.
pub fn cpuid_supported() -> bool {
    cfg!(target_arch = "x86_64")
}

/// Register dump of one logical processor.
///
/// Leaves above the reported maximum are captured too; the processor returns
/// zeroes or repeats the highest leaf for them, so decoders always check the
/// maximum leaf before trusting an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawProcessorSample {
    pub basic: [CpuidLeaf; MAX_BASIC_LEAVES],
    pub extended: [CpuidLeaf; MAX_EXTENDED_LEAVES],
    pub hypervisor: CpuidLeaf,
    pub deterministic_cache: [CpuidLeaf; MAX_DETERMINISTIC_CACHE],
    pub extended_topology: [CpuidLeaf; MAX_EXTENDED_TOPOLOGY],
    pub sgx: [CpuidLeaf; MAX_SGX],
    pub processor_trace: [CpuidLeaf; MAX_PROCESSOR_TRACE],
    pub amd_cache: [CpuidLeaf; MAX_AMD_CACHE],
    pub amd_topology: [CpuidLeaf; MAX_AMD_TOPOLOGY],
}

impl Default for RawProcessorSample {
    fn default() -> Self {
        RawProcessorSample {
            basic: [CpuidLeaf::default(); MAX_BASIC_LEAVES],
            extended: [CpuidLeaf::default(); MAX_EXTENDED_LEAVES],
            hypervisor: CpuidLeaf::default(),
            deterministic_cache: [CpuidLeaf::default(); MAX_DETERMINISTIC_CACHE],
            extended_topology: [CpuidLeaf::default(); MAX_EXTENDED_TOPOLOGY],
            sgx: [CpuidLeaf::default(); MAX_SGX],
            processor_trace: [CpuidLeaf::default(); MAX_PROCESSOR_TRACE],
            amd_cache: [CpuidLeaf::default(); MAX_AMD_CACHE],
            amd_topology: [CpuidLeaf::default(); MAX_AMD_TOPOLOGY],
        }
    }
}

/// One `(leaf, sub-leaf)` row of a serialized sample.
#[derive(Serialize)]
struct RawEntry {
    #[serde(serialize_with = "serialize_as_hex")]
    leaf: u32,
    sub_leaf: u32,
    #[serde(flatten)]
    regs: CpuidLeaf,
}

impl RawProcessorSample {
    pub fn max_basic(&self) -> u32 {
        self.basic[0].eax
    }

    pub fn max_extended(&self) -> u32 {
        self.extended[0].eax
    }

    /// Basic leaf `leaf` if the processor reports it.
    pub fn basic_leaf(&self, leaf: u32) -> Option<&CpuidLeaf> {
        if self.max_basic() < leaf {
            return None;
        }
        self.basic.get(leaf as usize)
    }

    /// Extended leaf `0x80000000 + index` if the processor reports it.
    pub fn extended_leaf(&self, index: u32) -> Option<&CpuidLeaf> {
        if self.max_extended() < EXTENDED_BASE + index {
            return None;
        }
        self.extended.get(index as usize)
    }

    fn sub_leaf_tables(&self) -> [(u32, &[CpuidLeaf]); 6] {
        [
            (LEAF_DETERMINISTIC_CACHE, &self.deterministic_cache[..]),
            (LEAF_EXTENDED_TOPOLOGY, &self.extended_topology[..]),
            (LEAF_SGX, &self.sgx[..]),
            (LEAF_PROCESSOR_TRACE, &self.processor_trace[..]),
            (LEAF_AMD_CACHE, &self.amd_cache[..]),
            (LEAF_AMD_TOPOLOGY, &self.amd_topology[..]),
        ]
    }

    fn sub_leaf_tables_mut(&mut self) -> [(u32, &mut [CpuidLeaf]); 6] {
        [
            (LEAF_DETERMINISTIC_CACHE, &mut self.deterministic_cache[..]),
            (LEAF_EXTENDED_TOPOLOGY, &mut self.extended_topology[..]),
            (LEAF_SGX, &mut self.sgx[..]),
            (LEAF_PROCESSOR_TRACE, &mut self.processor_trace[..]),
            (LEAF_AMD_CACHE, &mut self.amd_cache[..]),
            (LEAF_AMD_TOPOLOGY, &mut self.amd_topology[..]),
        ]
    }

    /// Non-empty rows in capture order.
    fn entries(&self) -> Vec<RawEntry> {
        let mut entries = Vec::new();
        let mut push = |leaf, sub_leaf, regs: &CpuidLeaf| {
            if !regs.is_empty() {
                entries.push(RawEntry {
                    leaf,
                    sub_leaf,
                    regs: *regs,
                });
            }
        };
        for (i, regs) in self.basic.iter().enumerate() {
            push(i as u32, 0, regs);
        }
        for (i, regs) in self.extended.iter().enumerate() {
            push(EXTENDED_BASE + i as u32, 0, regs);
        }
        push(HYPERVISOR_BASE, 0, &self.hypervisor);
        for (leaf, table) in self.sub_leaf_tables() {
            for (sub, regs) in table.iter().enumerate() {
                push(leaf, sub as u32, regs);
            }
        }
        entries
    }
}

impl Serialize for RawProcessorSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries().serialize(serializer)
    }
}

/// Replays a captured dump, so a sample can stand in for a live processor.
impl CpuidSource for RawProcessorSample {
    fn cpuid(&self, leaf: u32, sub_leaf: u32) -> CpuidLeaf {
        if let Some((_, table)) = self.sub_leaf_tables().into_iter().find(|(l, _)| *l == leaf) {
            return table.get(sub_leaf as usize).copied().unwrap_or_default();
        }
        let slot = match leaf {
            HYPERVISOR_BASE => Some(&self.hypervisor),
            l if l >= EXTENDED_BASE => self.extended.get((l - EXTENDED_BASE) as usize),
            l => self.basic.get(l as usize),
        };
        slot.copied().unwrap_or_default()
    }
}

/// Executes every leaf and sub-leaf of interest through `source`.
pub fn capture<S: CpuidSource + ?Sized>(source: &S) -> RawProcessorSample {
    let mut raw = RawProcessorSample::default();
    for (i, slot) in raw.basic.iter_mut().enumerate() {
        *slot = source.cpuid(i as u32, 0);
    }
    for (i, slot) in raw.extended.iter_mut().enumerate() {
        *slot = source.cpuid(EXTENDED_BASE + i as u32, 0);
    }
    raw.hypervisor = source.cpuid(HYPERVISOR_BASE, 0);
    for (leaf, table) in raw.sub_leaf_tables_mut() {
        for (sub, slot) in table.iter_mut().enumerate() {
            *slot = source.cpuid(leaf, sub as u32);
        }
    }
    raw
}

/// Pins the calling thread to `logical_cpu`, dumps its CPUID leaves and
/// restores the previous affinity.
pub fn acquire_sample(logical_cpu: usize) -> Result<RawProcessorSample> {
    if !cpuid_supported() {
        return Err(Error::UnsupportedInstruction);
    }
    let _pinned = ScopedAffinity::pin(logical_cpu)?;
    Ok(capture(&HostCpuid))
}

/// Builds synthetic samples.
#[derive(Default)]
pub struct SampleBuilder {
    raw: RawProcessorSample,
}

impl SampleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the 12-byte vendor signature of leaf 0 (stored as EBX, EDX, ECX).
    pub fn vendor(mut self, signature: &[u8; 12]) -> Self {
        let word = |i: usize| {
            u32::from_le_bytes([signature[i], signature[i + 1], signature[i + 2], signature[i + 3]])
        };
        self.raw.basic[0].ebx = word(0);
        self.raw.basic[0].edx = word(4);
        self.raw.basic[0].ecx = word(8);
        self
    }

    pub fn max_basic(mut self, max: u32) -> Self {
        self.raw.basic[0].eax = max;
        self
    }

    pub fn max_extended(mut self, max: u32) -> Self {
        self.raw.extended[0].eax = max;
        self
    }

    /// Leaf 1 EAX from its family/model/stepping parts.
    pub fn signature(mut self, family: u32, model: u32, stepping: u32) -> Self {
        let (base_family, ext_family) = if family > 0xf {
            (0xf, family - 0xf)
        } else {
            (family, 0)
        };
        self.raw.basic[1].eax = (ext_family << 20)
            | ((model >> 4) << 16)
            | (base_family << 8)
            | ((model & 0xf) << 4)
            | (stepping & 0xf);
        self
    }

    /// Sets a basic, extended or hypervisor leaf (sub-leaf 0).
    pub fn leaf(mut self, leaf: u32, regs: CpuidLeaf) -> Self {
        let slot = match leaf {
            HYPERVISOR_BASE => Some(&mut self.raw.hypervisor),
            l if l >= EXTENDED_BASE => self.raw.extended.get_mut((l - EXTENDED_BASE) as usize),
            l => self.raw.basic.get_mut(l as usize),
        };
        if let Some(slot) = slot {
            *slot = regs;
        }
        self
    }

    /// Sets one sub-leaf of leaf 0x4, 0xB, 0x12, 0x14, 0x8000001D or 0x80000026.
    ///
    /// Sub-leaf 0 is mirrored into the plain leaf table, as the hardware does.
    pub fn sub_leaf(mut self, leaf: u32, sub_leaf: usize, regs: CpuidLeaf) -> Self {
        if sub_leaf == 0 {
            self = self.leaf(leaf, regs);
        }
        if let Some(slot) = self
            .raw
            .sub_leaf_tables_mut()
            .into_iter()
            .find(|(l, _)| *l == leaf)
            .and_then(|(_, table)| table.get_mut(sub_leaf))
        {
            *slot = regs;
        }
        self
    }

    /// Writes the brand string into extended leaves 2 to 4 (at most 48 bytes).
    pub fn brand(mut self, brand: &str) -> Self {
        let mut bytes = [0u8; 48];
        let len = brand.len().min(48);
        bytes[..len].copy_from_slice(&brand.as_bytes()[..len]);
        for (i, chunk) in bytes.chunks_exact(16).enumerate() {
            let word =
                |j: usize| u32::from_le_bytes([chunk[j], chunk[j + 1], chunk[j + 2], chunk[j + 3]]);
            self.raw.extended[2 + i] = CpuidLeaf::new(word(0), word(4), word(8), word(12));
        }
        self
    }

    /// Sets the hypervisor signature of leaf 0x40000000 (stored as EBX, ECX, EDX).
    pub fn hypervisor(mut self, signature: &[u8; 12]) -> Self {
        let word = |i: usize| {
            u32::from_le_bytes([signature[i], signature[i + 1], signature[i + 2], signature[i + 3]])
        };
        self.raw.hypervisor = CpuidLeaf::new(HYPERVISOR_BASE, word(0), word(4), word(8));
        self
    }

    /// ORs `mask` into one register of a basic or extended leaf.
    pub fn set_bits(mut self, leaf: u32, reg: CpuidReg, mask: u32) -> Self {
        let slot = if leaf >= EXTENDED_BASE {
            self.raw.extended.get_mut((leaf - EXTENDED_BASE) as usize)
        } else {
            self.raw.basic.get_mut(leaf as usize)
        };
        if let Some(slot) = slot {
            match reg {
                CpuidReg::EAX => slot.eax |= mask,
                CpuidReg::EBX => slot.ebx |= mask,
                CpuidReg::ECX => slot.ecx |= mask,
                CpuidReg::EDX => slot.edx |= mask,
            }
        }
        self
    }

    pub fn build(self) -> RawProcessorSample {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_serialization() {
        for (leaf, expected) in [
            (0x0_u32, "0x00000000"),
            (0x1e, "0x0000001e"),
            (0x40000000, "0x40000000"),
            (0x8000001d, "0x8000001d"),
        ] {
            let mut v = Vec::new();
            let mut serializer = serde_json::Serializer::new(&mut v);
            serialize_as_hex(&leaf, &mut serializer).unwrap();
            assert_eq!(std::str::from_utf8(&v).unwrap(), format!("\"{expected}\""));
        }
    }

    #[test]
    fn capture_replays_a_sample() {
        let sample = SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(0x1f)
            .max_extended(0x8000_0008)
            .signature(6, 0x97, 2)
            .brand("12th Gen Intel(R) Core(TM) i9-12900K")
            .sub_leaf(0x4, 1, CpuidLeaf::new(0x122, 0x1c0003f, 0x3f, 0))
            .sub_leaf(0xb, 0, CpuidLeaf::new(1, 2, 0x100, 7))
            .hypervisor(b"KVMKVMKVM\0\0\0")
            .build();

        assert_eq!(capture(&sample), sample);
    }

    #[test]
    fn leaves_above_maximum_are_hidden() {
        let sample = SampleBuilder::new()
            .max_basic(1)
            .leaf(7, CpuidLeaf::new(0, 0xffff_ffff, 0, 0))
            .build();
        assert!(sample.basic_leaf(1).is_some());
        assert!(sample.basic_leaf(7).is_none());
        assert!(sample.extended_leaf(1).is_none());
    }

    #[test]
    fn signature_splits_extended_fields() {
        let sample = SampleBuilder::new().signature(0x19, 0x61, 2).build();
        assert_eq!(sample.basic[1].eax, 0x00a6_0f12);
    }

    #[test]
    fn serialized_sample_skips_empty_leaves() {
        let sample = SampleBuilder::new()
            .vendor(b"AuthenticAMD")
            .max_basic(0x10)
            .sub_leaf(0x8000_001d, 2, CpuidLeaf::new(0x143, 0x1c0003f, 0x3ff, 2))
            .build();
        let json: serde_json::Value = serde_json::to_value(&sample).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["leaf"], "0x00000000");
        assert_eq!(rows[0]["eax"], 0x10);
        assert_eq!(rows[1]["leaf"], "0x8000001d");
        assert_eq!(rows[1]["sub_leaf"], 2);
    }
}

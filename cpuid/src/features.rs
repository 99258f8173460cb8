// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Feature flag decoding from declarative bit tables.

use bitflags::bitflags;
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::raw::{CpuidReg, RawProcessorSample, EXTENDED_BASE};
use crate::vendor::Vendor;

bitflags! {
    /// Named CPU features. Bits not listed in a decode table are never set.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CpuFeatures: u128 {
        // basic leaf 1 EDX
        const FPU = 1 << 0;
        const VME = 1 << 1;
        const DE = 1 << 2;
        const PSE = 1 << 3;
        const TSC = 1 << 4;
        const MSR = 1 << 5;
        const PAE = 1 << 6;
        const MCE = 1 << 7;
        const CX8 = 1 << 8;
        const APIC = 1 << 9;
        const SEP = 1 << 10;
        const MTRR = 1 << 11;
        const PGE = 1 << 12;
        const MCA = 1 << 13;
        const CMOV = 1 << 14;
        const PAT = 1 << 15;
        const PSE36 = 1 << 16;
        const CLFLUSH = 1 << 17;
        const DTS = 1 << 18;
        const ACPI = 1 << 19;
        const MMX = 1 << 20;
        const FXSR = 1 << 21;
        const SSE = 1 << 22;
        const SSE2 = 1 << 23;
        const SS = 1 << 24;
        const HT = 1 << 25;
        const TM = 1 << 26;
        const PBE = 1 << 27;
        // basic leaf 1 ECX
        const PNI = 1 << 28;
        const PCLMUL = 1 << 29;
        const DTS64 = 1 << 30;
        const MONITOR = 1 << 31;
        const DS_CPL = 1 << 32;
        const VMX = 1 << 33;
        const SMX = 1 << 34;
        const EST = 1 << 35;
        const TM2 = 1 << 36;
        const SSSE3 = 1 << 37;
        const FMA3 = 1 << 38;
        const CX16 = 1 << 39;
        const XTPR = 1 << 40;
        const PDCM = 1 << 41;
        const PCID = 1 << 42;
        const SSE4_1 = 1 << 43;
        const SSE4_2 = 1 << 44;
        const X2APIC = 1 << 45;
        const MOVBE = 1 << 46;
        const POPCNT = 1 << 47;
        const TSC_DEADLINE = 1 << 48;
        const AES = 1 << 49;
        const XSAVE = 1 << 50;
        const OSXSAVE = 1 << 51;
        const AVX = 1 << 52;
        const F16C = 1 << 53;
        const RDRAND = 1 << 54;
        const HYPERVISOR = 1 << 55;
        // leaf 7 EBX
        const FSGSBASE = 1 << 56;
        const SGX = 1 << 57;
        const BMI1 = 1 << 58;
        const HLE = 1 << 59;
        const AVX2 = 1 << 60;
        const SMEP = 1 << 61;
        const BMI2 = 1 << 62;
        const ERMS = 1 << 63;
        const INVPCID = 1 << 64;
        const RTM = 1 << 65;
        const MPX = 1 << 66;
        const AVX512F = 1 << 67;
        const AVX512DQ = 1 << 68;
        const RDSEED = 1 << 69;
        const ADX = 1 << 70;
        const SMAP = 1 << 71;
        const AVX512IFMA = 1 << 72;
        const CLFLUSHOPT = 1 << 73;
        const CLWB = 1 << 74;
        const AVX512PF = 1 << 75;
        const AVX512ER = 1 << 76;
        const AVX512CD = 1 << 77;
        const SHA_NI = 1 << 78;
        const AVX512BW = 1 << 79;
        const AVX512VL = 1 << 80;
        // leaf 7 ECX
        const AVX512VBMI = 1 << 81;
        const UMIP = 1 << 82;
        const PKU = 1 << 83;
        const AVX512VBMI2 = 1 << 84;
        const GFNI = 1 << 85;
        const VAES = 1 << 86;
        const VPCLMULQDQ = 1 << 87;
        const AVX512VNNI = 1 << 88;
        const AVX512BITALG = 1 << 89;
        const AVX512VPOPCNTDQ = 1 << 90;
        const RDPID = 1 << 91;
        // leaf 7 EDX
        const HYBRID = 1 << 92;
        const AMX_BF16 = 1 << 93;
        const AVX512_FP16 = 1 << 94;
        const AMX_TILE = 1 << 95;
        const AMX_INT8 = 1 << 96;
        // extended leaf 1 EDX
        const SYSCALL = 1 << 97;
        const NX = 1 << 98;
        const MMXEXT = 1 << 99;
        const PDPE1GB = 1 << 100;
        const RDTSCP = 1 << 101;
        const LM = 1 << 102;
        const AMD3DNOWEXT = 1 << 103;
        const AMD3DNOW = 1 << 104;
        // extended leaf 1 ECX
        const LAHF_LM = 1 << 105;
        const CMP_LEGACY = 1 << 106;
        const SVM = 1 << 107;
        const EXTAPIC = 1 << 108;
        const CR8_LEGACY = 1 << 109;
        const ABM = 1 << 110;
        const SSE4A = 1 << 111;
        const MISALIGNSSE = 1 << 112;
        const PREFETCHW = 1 << 113;
        const OSVW = 1 << 114;
        const IBS = 1 << 115;
        const XOP = 1 << 116;
        const LWP = 1 << 117;
        const FMA4 = 1 << 118;
        const TBM = 1 << 119;
        const TOPOEXT = 1 << 120;
        // extended leaf 7 EDX
        const CONSTANT_TSC = 1 << 121;
        // leaf 6 EAX
        const INTEL_DTS = 1 << 122;
        const INTEL_PTM = 1 << 123;
    }
}

const LEAF1_EDX: &[(u8, CpuFeatures)] = &[
    (0, CpuFeatures::FPU),
    (1, CpuFeatures::VME),
    (2, CpuFeatures::DE),
    (3, CpuFeatures::PSE),
    (4, CpuFeatures::TSC),
    (5, CpuFeatures::MSR),
    (6, CpuFeatures::PAE),
    (7, CpuFeatures::MCE),
    (8, CpuFeatures::CX8),
    (9, CpuFeatures::APIC),
    (11, CpuFeatures::SEP),
    (12, CpuFeatures::MTRR),
    (13, CpuFeatures::PGE),
    (14, CpuFeatures::MCA),
    (15, CpuFeatures::CMOV),
    (16, CpuFeatures::PAT),
    (17, CpuFeatures::PSE36),
    (19, CpuFeatures::CLFLUSH),
    (21, CpuFeatures::DTS),
    (22, CpuFeatures::ACPI),
    (23, CpuFeatures::MMX),
    (24, CpuFeatures::FXSR),
    (25, CpuFeatures::SSE),
    (26, CpuFeatures::SSE2),
    (27, CpuFeatures::SS),
    (28, CpuFeatures::HT),
    (29, CpuFeatures::TM),
    (31, CpuFeatures::PBE),
];

const LEAF1_ECX: &[(u8, CpuFeatures)] = &[
    (0, CpuFeatures::PNI),
    (1, CpuFeatures::PCLMUL),
    (2, CpuFeatures::DTS64),
    (3, CpuFeatures::MONITOR),
    (4, CpuFeatures::DS_CPL),
    (5, CpuFeatures::VMX),
    (6, CpuFeatures::SMX),
    (7, CpuFeatures::EST),
    (8, CpuFeatures::TM2),
    (9, CpuFeatures::SSSE3),
    (12, CpuFeatures::FMA3),
    (13, CpuFeatures::CX16),
    (14, CpuFeatures::XTPR),
    (15, CpuFeatures::PDCM),
    (17, CpuFeatures::PCID),
    (19, CpuFeatures::SSE4_1),
    (20, CpuFeatures::SSE4_2),
    (21, CpuFeatures::X2APIC),
    (22, CpuFeatures::MOVBE),
    (23, CpuFeatures::POPCNT),
    (24, CpuFeatures::TSC_DEADLINE),
    (25, CpuFeatures::AES),
    (26, CpuFeatures::XSAVE),
    (27, CpuFeatures::OSXSAVE),
    (28, CpuFeatures::AVX),
    (29, CpuFeatures::F16C),
    (30, CpuFeatures::RDRAND),
    (31, CpuFeatures::HYPERVISOR),
];

const LEAF7_EBX: &[(u8, CpuFeatures)] = &[
    (0, CpuFeatures::FSGSBASE),
    (2, CpuFeatures::SGX),
    (3, CpuFeatures::BMI1),
    (4, CpuFeatures::HLE),
    (5, CpuFeatures::AVX2),
    (7, CpuFeatures::SMEP),
    (8, CpuFeatures::BMI2),
    (9, CpuFeatures::ERMS),
    (10, CpuFeatures::INVPCID),
    (11, CpuFeatures::RTM),
    (14, CpuFeatures::MPX),
    (16, CpuFeatures::AVX512F),
    (17, CpuFeatures::AVX512DQ),
    (18, CpuFeatures::RDSEED),
    (19, CpuFeatures::ADX),
    (20, CpuFeatures::SMAP),
    (21, CpuFeatures::AVX512IFMA),
    (23, CpuFeatures::CLFLUSHOPT),
    (24, CpuFeatures::CLWB),
    (26, CpuFeatures::AVX512PF),
    (27, CpuFeatures::AVX512ER),
    (28, CpuFeatures::AVX512CD),
    (29, CpuFeatures::SHA_NI),
    (30, CpuFeatures::AVX512BW),
    (31, CpuFeatures::AVX512VL),
];

const LEAF7_ECX: &[(u8, CpuFeatures)] = &[
    (1, CpuFeatures::AVX512VBMI),
    (2, CpuFeatures::UMIP),
    (3, CpuFeatures::PKU),
    (6, CpuFeatures::AVX512VBMI2),
    (8, CpuFeatures::GFNI),
    (9, CpuFeatures::VAES),
    (10, CpuFeatures::VPCLMULQDQ),
    (11, CpuFeatures::AVX512VNNI),
    (12, CpuFeatures::AVX512BITALG),
    (14, CpuFeatures::AVX512VPOPCNTDQ),
    (22, CpuFeatures::RDPID),
];

const LEAF7_EDX: &[(u8, CpuFeatures)] = &[
    (15, CpuFeatures::HYBRID),
    (22, CpuFeatures::AMX_BF16),
    (23, CpuFeatures::AVX512_FP16),
    (24, CpuFeatures::AMX_TILE),
    (25, CpuFeatures::AMX_INT8),
];

const EXT1_EDX: &[(u8, CpuFeatures)] = &[
    (11, CpuFeatures::SYSCALL),
    (20, CpuFeatures::NX),
    (22, CpuFeatures::MMXEXT),
    (26, CpuFeatures::PDPE1GB),
    (27, CpuFeatures::RDTSCP),
    (29, CpuFeatures::LM),
    (30, CpuFeatures::AMD3DNOWEXT),
    (31, CpuFeatures::AMD3DNOW),
];

const EXT1_ECX: &[(u8, CpuFeatures)] = &[
    (0, CpuFeatures::LAHF_LM),
    (1, CpuFeatures::CMP_LEGACY),
    (2, CpuFeatures::SVM),
    (3, CpuFeatures::EXTAPIC),
    (4, CpuFeatures::CR8_LEGACY),
    (5, CpuFeatures::ABM),
    (6, CpuFeatures::SSE4A),
    (7, CpuFeatures::MISALIGNSSE),
    (8, CpuFeatures::PREFETCHW),
    (9, CpuFeatures::OSVW),
    (10, CpuFeatures::IBS),
    (11, CpuFeatures::XOP),
    (15, CpuFeatures::LWP),
    (16, CpuFeatures::FMA4),
    (21, CpuFeatures::TBM),
    (22, CpuFeatures::TOPOEXT),
];

const EXT7_EDX: &[(u8, CpuFeatures)] = &[
    (8, CpuFeatures::CONSTANT_TSC),
];

const LEAF6_EAX: &[(u8, CpuFeatures)] = &[
    (0, CpuFeatures::INTEL_DTS),
    (6, CpuFeatures::INTEL_PTM),
];

/// A register of one leaf and the features its bits map to.
struct FeatureGroup {
    leaf: u32,
    reg: CpuidReg,
    map: &'static [(u8, CpuFeatures)],
    intel_only: bool,
}

const FEATURE_GROUPS: [FeatureGroup; 9] = [
    FeatureGroup { leaf: 1, reg: CpuidReg::EDX, map: LEAF1_EDX, intel_only: false },
    FeatureGroup { leaf: 1, reg: CpuidReg::ECX, map: LEAF1_ECX, intel_only: false },
    FeatureGroup { leaf: 7, reg: CpuidReg::EBX, map: LEAF7_EBX, intel_only: false },
    FeatureGroup { leaf: 7, reg: CpuidReg::ECX, map: LEAF7_ECX, intel_only: false },
    FeatureGroup { leaf: 7, reg: CpuidReg::EDX, map: LEAF7_EDX, intel_only: true },
    FeatureGroup { leaf: 6, reg: CpuidReg::EAX, map: LEAF6_EAX, intel_only: true },
    FeatureGroup { leaf: EXTENDED_BASE + 1, reg: CpuidReg::EDX, map: EXT1_EDX, intel_only: false },
    FeatureGroup { leaf: EXTENDED_BASE + 1, reg: CpuidReg::ECX, map: EXT1_ECX, intel_only: false },
    FeatureGroup { leaf: EXTENDED_BASE + 7, reg: CpuidReg::EDX, map: EXT7_EDX, intel_only: false },
];

fn match_features(map: &[(u8, CpuFeatures)], value: u32) -> CpuFeatures {
    map.iter()
        .filter(|(bit, _)| value & (1u32 << bit) != 0)
        .fold(CpuFeatures::empty(), |acc, (_, flag)| acc | *flag)
}

/// Decodes every feature group whose leaf the processor reports.
pub(crate) fn decode_features(raw: &RawProcessorSample, vendor: Vendor) -> CpuFeatures {
    let mut features = CpuFeatures::empty();
    for group in FEATURE_GROUPS.iter() {
        if group.intel_only && vendor != Vendor::Intel {
            continue;
        }
        let leaf = if group.leaf >= EXTENDED_BASE {
            raw.extended_leaf(group.leaf - EXTENDED_BASE)
        } else {
            raw.basic_leaf(group.leaf)
        };
        if let Some(leaf) = leaf {
            features |= match_features(group.map, leaf.get(group.reg));
        }
    }
    features
}

impl CpuFeatures {
    /// Lower-case names of the set flags, in table order.
    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.iter_names().map(|(name, _)| name.to_lowercase())
    }
}

impl Serialize for CpuFeatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for name in self.names() {
            seq.serialize_element(&name)?;
        }
        seq.end()
    }
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::fmt;

use serde::Serialize;

use crate::raw::{CpuidReg, RawProcessorSample};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Vendor {
    Intel,
    Amd,
    Cyrix,
    NexGen,
    Transmeta,
    Umc,
    Centaur,
    Rise,
    Sis,
    Nsc,
    Hygon,
    Vortex86,
    Via,
    Zhaoxin,
    Unknown,
}

/// Leaf 0 signatures. The first matching row wins.
const VENDOR_SIGNATURES: [(&[u8; 12], Vendor); 16] = [
    (b"GenuineIntel", Vendor::Intel),
    (b"AuthenticAMD", Vendor::Amd),
    (b"AMDisbetter!", Vendor::Amd),
    (b"CyrixInstead", Vendor::Cyrix),
    (b"NexGenDriven", Vendor::NexGen),
    (b"GenuineTMx86", Vendor::Transmeta),
    (b"TransmetaCPU", Vendor::Transmeta),
    (b"UMC UMC UMC ", Vendor::Umc),
    (b"CentaurHauls", Vendor::Centaur),
    (b"RiseRiseRise", Vendor::Rise),
    (b"SiS SiS SiS ", Vendor::Sis),
    (b"Geode by NSC", Vendor::Nsc),
    (b"HygonGenuine", Vendor::Hygon),
    (b"Vortex86 SoC", Vendor::Vortex86),
    (b"VIA VIA VIA ", Vendor::Via),
    (b"  Shanghai  ", Vendor::Zhaoxin),
];

impl Vendor {
    /// Looks up a 12-byte leaf 0 signature.
    pub fn from_signature(signature: &[u8; 12]) -> Result<Vendor> {
        VENDOR_SIGNATURES
            .iter()
            .find(|(sig, _)| *sig == signature)
            .map(|(_, vendor)| *vendor)
            .ok_or_else(|| Error::UnknownVendor(String::from_utf8_lossy(signature).into_owned()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Vendor::Intel => "Intel",
            Vendor::Amd => "AMD",
            Vendor::Cyrix => "Cyrix",
            Vendor::NexGen => "NexGen",
            Vendor::Transmeta => "Transmeta",
            Vendor::Umc => "UMC",
            Vendor::Centaur => "Centaur",
            Vendor::Rise => "Rise",
            Vendor::Sis => "SiS",
            Vendor::Nsc => "NSC",
            Vendor::Hygon => "Hygon",
            Vendor::Vortex86 => "Vortex86",
            Vendor::Via => "VIA",
            Vendor::Zhaoxin => "Zhaoxin",
            Vendor::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vendor signature of leaf 0, in EBX, EDX, ECX order.
pub(crate) fn vendor_signature(raw: &RawProcessorSample) -> [u8; 12] {
    raw.basic[0].signature([CpuidReg::EBX, CpuidReg::EDX, CpuidReg::ECX])
}

pub(crate) fn identify_vendor(raw: &RawProcessorSample) -> Result<Vendor> {
    Vendor::from_signature(&vendor_signature(raw))
}

// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use serde::Serialize;

use crate::features::CpuFeatures;
use crate::raw::{CpuidReg, RawProcessorSample};
use crate::vendor::Vendor;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Hypervisor {
    /// Running on bare metal
    None,
    /// Virtualized, but the signature is not known (or the vendor cannot tell)
    Unknown,
    Acrn,
    Bhyve,
    HyperV,
    Kvm,
    Parallels,
    Qemu,
    Qnx,
    VirtualBox,
    VMware,
    Xen,
}

/// Leaf 0x40000000 signatures (EBX, ECX, EDX).
const HYPERVISOR_SIGNATURES: [(&[u8; 12], Hypervisor); 12] = [
    (b"ACRNACRNACRN", Hypervisor::Acrn),
    (b"bhyve bhyve\0", Hypervisor::Bhyve),
    (b"Microsoft Hv", Hypervisor::HyperV),
    (b"KVMKVMKVM\0\0\0", Hypervisor::Kvm),
    (b"Linux KVM Hv", Hypervisor::Kvm),
    (b"prl hyperv\0\0", Hypervisor::Parallels),
    (b"lrpepyh vr\0\0", Hypervisor::Parallels),
    (b"TCGTCGTCGTCG", Hypervisor::Qemu),
    (b"QNXQVMBSQG\0\0", Hypervisor::Qnx),
    (b"VBoxVBoxVBox", Hypervisor::VirtualBox),
    (b"VMwareVMware", Hypervisor::VMware),
    (b"XenVMMXenVMM", Hypervisor::Xen),
];

/// Bytes up to the first NUL.
fn c_str(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Only Intel and AMD define the hypervisor-present bit, every other vendor
/// yields [`Hypervisor::Unknown`].
pub(crate) fn detect_hypervisor(
    raw: &RawProcessorSample,
    vendor: Vendor,
    features: CpuFeatures,
) -> Hypervisor {
    if !matches!(vendor, Vendor::Intel | Vendor::Amd) {
        return Hypervisor::Unknown;
    }
    if !features.contains(CpuFeatures::HYPERVISOR) {
        return Hypervisor::None;
    }

    let signature = raw
        .hypervisor
        .signature([CpuidReg::EBX, CpuidReg::ECX, CpuidReg::EDX]);
    let signature = c_str(&signature);
    HYPERVISOR_SIGNATURES
        .iter()
        .find(|(sig, _)| c_str(&sig[..]) == signature)
        .map(|(_, hv)| *hv)
        .unwrap_or(Hypervisor::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::SampleBuilder;

    #[test]
    fn known_signatures() {
        for (sig, expected) in HYPERVISOR_SIGNATURES {
            let raw = SampleBuilder::new().hypervisor(sig).build();
            assert_eq!(detect_hypervisor(&raw, Vendor::Intel, CpuFeatures::HYPERVISOR), expected);
        }
    }

    #[test]
    fn bit_and_vendor_gate_detection() {
        let raw = SampleBuilder::new().hypervisor(b"KVMKVMKVM\0\0\0").build();
        assert_eq!(detect_hypervisor(&raw, Vendor::Amd, CpuFeatures::empty()), Hypervisor::None);
        assert_eq!(
            detect_hypervisor(&raw, Vendor::Centaur, CpuFeatures::HYPERVISOR),
            Hypervisor::Unknown
        );

        let raw = SampleBuilder::new().hypervisor(b"NotAHypervsr").build();
        assert_eq!(
            detect_hypervisor(&raw, Vendor::Amd, CpuFeatures::HYPERVISOR),
            Hypervisor::Unknown
        );
    }

    #[test]
    fn comparison_stops_at_nul() {
        // Trailing garbage after the terminator does not matter.
        let raw = SampleBuilder::new().hypervisor(b"KVMKVMKVM\0xy").build();
        assert_eq!(
            detect_hypervisor(&raw, Vendor::Intel, CpuFeatures::HYPERVISOR),
            Hypervisor::Kvm
        );
    }
}

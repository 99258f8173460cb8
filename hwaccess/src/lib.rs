// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Privileged hardware access
//!
//! This crate offers a trait abstraction over the ring-0 facilities the
//! telemetry code needs: model specific registers, PCI configuration space
//! and physical memory.
//!
//! # Backends
//!
//! - Linux (`/dev/cpu/N/msr`, sysfs PCI config, `/dev/mem`)
//! - in-memory mock (feature `mock`)
//!

#[macro_use]
extern crate log;

/// Linux implementation module
mod linux;

/// Scriptable in-memory implementation module
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use std::fmt;
use std::io;
use std::sync::Arc;

pub use linux::LinuxAccess;
use thiserror::Error;

#[derive(Error, Debug)]
///
///
pub enum Error {
    ///
    /// A device node could not be opened
    ///
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    ///
    /// Reading from a device node failed
    ///
    #[error("Failed to read {what}: {source}")]
    Read {
        what: String,
        #[source]
        source: io::Error,
    },
    ///
    /// Writing to a device node failed
    ///
    #[error("Failed to write {what}: {source}")]
    Write {
        what: String,
        #[source]
        source: io::Error,
    },
    ///
    /// Physical memory returned less data than requested
    ///
    #[error("Short read at physical address {addr:#x}: got {read} of {len} bytes")]
    ShortRead { addr: u64, read: usize, len: usize },
    ///
    /// Bit range is not within a 64 bit register
    ///
    #[error("Invalid bit range {hi}:{lo}")]
    InvalidRange { hi: u8, lo: u8 },
    ///
    /// No PCI function with the requested ids
    ///
    #[error("PCI device {vendor:04x}:{device:04x} (instance {index}) not found")]
    DeviceNotFound { vendor: u16, device: u16, index: u32 },
    ///
    /// The backend has no way to perform the operation
    ///
    #[error("Operation not supported by the access backend")]
    Unsupported,
}

///
/// Result type for returning from a function
///
pub type Result<T> = std::result::Result<T, Error>;

/// Address of a PCI function in configuration space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    /// Bus 0, device 0, function 0: the root complex / northbridge.
    pub const HOST_BRIDGE: Self = Self::new(0, 0, 0);

    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        PciAddress {
            bus,
            device: device & 0x1f,
            function: function & 0x07,
        }
    }

    /// Packed bus/device/function as used by configuration mechanism #1.
    pub fn bdf(&self) -> u32 {
        ((self.bus as u32) << 16) | ((self.device as u32) << 11) | ((self.function as u32) << 8)
    }

    /// Parses the sysfs form `dddd:bb:dd.f`. Only domain 0 is accepted.
    pub fn parse_sysfs(name: &str) -> Option<Self> {
        let (domain, rest) = name.split_once(':')?;
        if u16::from_str_radix(domain, 16).ok()? != 0 {
            return None;
        }
        let (bus, rest) = rest.split_once(':')?;
        let (device, function) = rest.split_once('.')?;
        let bus = u8::from_str_radix(bus, 16).ok()?;
        let device = u8::from_str_radix(device, 16).ok()?;
        let function = u8::from_str_radix(function, 16).ok()?;
        if device > 0x1f || function > 0x07 {
            return None;
        }
        Some(PciAddress::new(bus, device, function))
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0000:{:02x}:{:02x}.{:x}",
            self.bus, self.device, self.function
        )
    }
}

/// Extracts bits `hi..=lo` of `value`, shifted down to bit 0.
///
/// Callers must have validated the range with [`check_range`].
pub fn extract_bits(value: u64, hi: u8, lo: u8) -> u64 {
    let width = (hi - lo + 1) as u32;
    if width >= 64 {
        value
    } else {
        (value >> lo) & ((1u64 << width) - 1)
    }
}

pub fn check_range(hi: u8, lo: u8) -> Result<()> {
    if hi > 63 || lo > hi {
        return Err(Error::InvalidRange { hi, lo });
    }
    Ok(())
}

///
/// Trait to represent privileged register, configuration space and memory access
///
/// Failures are reported per call. The identification and telemetry layers treat
/// any error as "metric unavailable".
///
pub trait HardwareAccess: Send + Sync {
    ///
    /// Read a 64 bit MSR on the given logical CPU
    ///
    fn read_msr(&self, cpu: u32, index: u32) -> Result<u64>;
    ///
    /// Write a 64 bit MSR on the given logical CPU
    ///
    fn write_msr(&self, cpu: u32, index: u32, value: u64) -> Result<()>;
    ///
    /// Read a dword from PCI configuration space
    ///
    fn read_pci_config32(&self, addr: PciAddress, offset: u16) -> Result<u32>;
    ///
    /// Write a dword to PCI configuration space
    ///
    fn write_pci_config32(&self, addr: PciAddress, offset: u16, value: u32) -> Result<()>;
    ///
    /// Locate the `index`-th PCI function matching vendor and device id
    ///
    fn find_pci_device(&self, vendor: u16, device: u16, index: u32) -> Result<PciAddress>;
    ///
    /// Copy physical memory starting at `addr` into `buf`, returning the number of bytes read
    ///
    fn read_physical_memory(&self, addr: u64, buf: &mut [u8]) -> Result<usize>;
    ///
    /// Read an MSR and keep only bits `hi..=lo`
    ///
    fn read_msr_range(&self, cpu: u32, index: u32, hi: u8, lo: u8) -> Result<u64> {
        check_range(hi, lo)?;
        let value = self.read_msr(cpu, index)?;
        Ok(extract_bits(value, hi, lo))
    }
}

/// Opens the default backend for this platform.
pub fn new() -> std::result::Result<Arc<dyn HardwareAccess>, Error> {
    let access = LinuxAccess::new()?;
    info!("Privileged access through {}", access.root().display());
    Ok(Arc::new(access))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::mock::MockAccess;

    #[test]
    fn pci_address_formatting() {
        let addr = PciAddress::new(0, 0x18, 3);
        assert_eq!(addr.to_string(), "0000:00:18.3");
        assert_eq!(addr.bdf(), 0xc300);
        assert_eq!(PciAddress::parse_sysfs("0000:00:18.3"), Some(addr));
        assert_eq!(PciAddress::parse_sysfs("0001:00:18.3"), None);
        assert_eq!(PciAddress::parse_sysfs("0000:00:20.0"), None);
        assert_eq!(PciAddress::parse_sysfs("garbage"), None);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let hw = MockAccess::new().with_msr(0x198, u64::MAX);
        assert!(matches!(
            hw.read_msr_range(0, 0x198, 64, 0),
            Err(Error::InvalidRange { hi: 64, lo: 0 })
        ));
        assert!(matches!(
            hw.read_msr_range(0, 0x198, 3, 4),
            Err(Error::InvalidRange { hi: 3, lo: 4 })
        ));
        assert_eq!(hw.read_msr_range(0, 0x198, 63, 0).unwrap(), u64::MAX);
    }

    proptest! {
        #[test]
        fn read_msr_range_matches_shift_and_mask(
            value in any::<u64>(),
            a in 0u8..64,
            b in 0u8..64,
        ) {
            let (lo, hi) = (a.min(b), a.max(b));
            let hw = MockAccess::new().with_msr(0x10, value);
            let expected =
                (lo..=hi).fold(0u64, |acc, bit| acc | (((value >> bit) & 1) << (bit - lo)));
            prop_assert_eq!(hw.read_msr_range(0, 0x10, hi, lo).unwrap(), expected);
        }
    }
}

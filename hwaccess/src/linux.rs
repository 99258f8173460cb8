// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::{Error, HardwareAccess, PciAddress, Result};

const PCI_DEVICES: &str = "sys/bus/pci/devices";

/// Access through the Linux `msr` driver, sysfs and `/dev/mem`.
///
/// All paths are resolved below `root`, which is `/` outside of tests.
pub struct LinuxAccess {
    root: PathBuf,
}

impl LinuxAccess {
    /// Opens the host backend, checking that the `msr` driver is usable.
    pub fn new() -> Result<Self> {
        let access = LinuxAccess::with_root("/");
        let probe = access.msr_path(0);
        File::open(&probe).map_err(|source| Error::Open {
            path: probe.display().to_string(),
            source,
        })?;
        Ok(access)
    }

    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        LinuxAccess {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn msr_path(&self, cpu: u32) -> PathBuf {
        self.root.join(format!("dev/cpu/{cpu}/msr"))
    }

    fn config_path(&self, addr: PciAddress) -> PathBuf {
        self.root.join(PCI_DEVICES).join(addr.to_string()).join("config")
    }

    fn open(path: &Path, write: bool) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(write)
            .open(path)
            .map_err(|source| Error::Open {
                path: path.display().to_string(),
                source,
            })
    }

    fn read_id(path: &Path) -> Option<u16> {
        let text = fs::read_to_string(path).ok()?;
        u16::from_str_radix(text.trim().trim_start_matches("0x"), 16).ok()
    }
}

impl HardwareAccess for LinuxAccess {
    fn read_msr(&self, cpu: u32, index: u32) -> Result<u64> {
        let file = Self::open(&self.msr_path(cpu), false)?;
        let mut data = [0u8; 8];
        file.read_exact_at(&mut data, index as u64)
            .map_err(|source| Error::Read {
                what: format!("MSR {index:#x} on CPU {cpu}"),
                source,
            })?;
        Ok(u64::from_le_bytes(data))
    }

    fn write_msr(&self, cpu: u32, index: u32, value: u64) -> Result<()> {
        let file = Self::open(&self.msr_path(cpu), true)?;
        file.write_all_at(&value.to_le_bytes(), index as u64)
            .map_err(|source| Error::Write {
                what: format!("MSR {index:#x} on CPU {cpu}"),
                source,
            })
    }

    fn read_pci_config32(&self, addr: PciAddress, offset: u16) -> Result<u32> {
        let file = Self::open(&self.config_path(addr), false)?;
        let mut data = [0u8; 4];
        file.read_exact_at(&mut data, offset as u64)
            .map_err(|source| Error::Read {
                what: format!("PCI {addr} config offset {offset:#x}"),
                source,
            })?;
        Ok(u32::from_le_bytes(data))
    }

    fn write_pci_config32(&self, addr: PciAddress, offset: u16, value: u32) -> Result<()> {
        let file = Self::open(&self.config_path(addr), true)?;
        file.write_all_at(&value.to_le_bytes(), offset as u64)
            .map_err(|source| Error::Write {
                what: format!("PCI {addr} config offset {offset:#x}"),
                source,
            })
    }

    fn find_pci_device(&self, vendor: u16, device: u16, index: u32) -> Result<PciAddress> {
        let dir = self.root.join(PCI_DEVICES);
        let entries = fs::read_dir(&dir).map_err(|source| Error::Open {
            path: dir.display().to_string(),
            source,
        })?;

        let mut addresses: Vec<PciAddress> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| PciAddress::parse_sysfs(&entry.file_name().to_string_lossy()))
            .collect();
        addresses.sort();

        addresses
            .into_iter()
            .filter(|addr| {
                let base = dir.join(addr.to_string());
                Self::read_id(&base.join("vendor")) == Some(vendor)
                    && Self::read_id(&base.join("device")) == Some(device)
            })
            .nth(index as usize)
            .ok_or(Error::DeviceNotFound {
                vendor,
                device,
                index,
            })
    }

    fn read_physical_memory(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        let path = self.root.join("dev/mem");
        let file = Self::open(&path, false)?;
        let mut done = 0;
        while done < buf.len() {
            match file.read_at(&mut buf[done..], addr + done as u64) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::Read {
                        what: format!("physical memory at {:#x}", addr + done as u64),
                        source,
                    })
                }
            }
        }
        Ok(done)
    }
}

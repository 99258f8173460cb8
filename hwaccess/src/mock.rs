// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! In-memory [`HardwareAccess`] used by the test suites of the dependent crates.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use crate::{Error, HardwareAccess, PciAddress, Result};

/// Value returned by configuration space reads nobody has populated.
pub const UNPOPULATED: u32 = 0xffff_ffff;

#[derive(Default)]
struct IndexWindow {
    index_offset: u16,
    data_offset: u16,
    current: u32,
    registers: HashMap<u32, u32>,
}

#[derive(Default)]
struct MockState {
    msrs: HashMap<u32, u64>,
    cpu_msrs: HashMap<(u32, u32), u64>,
    msr_sequences: HashMap<u32, VecDeque<u64>>,
    msr_writes: Vec<(u32, u32, u64)>,
    pci: HashMap<(PciAddress, u16), u32>,
    pci_writes: Vec<(PciAddress, u16, u32)>,
    windows: HashMap<PciAddress, Vec<IndexWindow>>,
    devices: Vec<(u16, u16, PciAddress)>,
    memory: BTreeMap<u64, Vec<u8>>,
}

/// Scriptable register file.
///
/// MSRs not set explicitly fail to read, mirroring a `#GP` from the driver.
#[derive(Default)]
pub struct MockAccess {
    state: Mutex<MockState>,
}

impl MockAccess {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// MSR visible on every CPU.
    pub fn with_msr(self, index: u32, value: u64) -> Self {
        self.with_state(|s| {
            s.msrs.insert(index, value);
        })
    }

    pub fn with_cpu_msr(self, cpu: u32, index: u32, value: u64) -> Self {
        self.with_state(|s| {
            s.cpu_msrs.insert((cpu, index), value);
        })
    }

    /// Successive reads return the given values; the last one sticks.
    pub fn with_msr_sequence(self, index: u32, values: &[u64]) -> Self {
        self.with_state(|s| {
            s.msr_sequences.insert(index, values.iter().copied().collect());
        })
    }

    pub fn with_pci(self, addr: PciAddress, offset: u16, value: u32) -> Self {
        self.with_state(|s| {
            s.pci.insert((addr, offset), value);
        })
    }

    pub fn with_device(self, vendor: u16, device: u16, addr: PciAddress) -> Self {
        self.with_state(|s| s.devices.push((vendor, device, addr)))
    }

    /// Emulates an index/data register pair: a write to `index_offset` selects
    /// the register read back through `data_offset`.
    pub fn with_index_window(self, addr: PciAddress, index_offset: u16, data_offset: u16) -> Self {
        self.with_state(|s| {
            s.windows.entry(addr).or_default().push(IndexWindow {
                index_offset,
                data_offset,
                ..Default::default()
            })
        })
    }

    /// Populates a register behind a window created by [`Self::with_index_window`].
    pub fn with_indexed(self, addr: PciAddress, data_offset: u16, index: u32, value: u32) -> Self {
        self.with_state(|s| {
            if let Some(window) = s
                .windows
                .get_mut(&addr)
                .and_then(|w| w.iter_mut().find(|w| w.data_offset == data_offset))
            {
                window.registers.insert(index, value);
            }
        })
    }

    pub fn with_memory(self, addr: u64, bytes: &[u8]) -> Self {
        self.with_state(|s| {
            s.memory.insert(addr, bytes.to_vec());
        })
    }

    pub fn set_msr(&self, index: u32, value: u64) {
        self.state.lock().unwrap().msrs.insert(index, value);
    }

    pub fn set_memory(&self, addr: u64, bytes: &[u8]) {
        self.state.lock().unwrap().memory.insert(addr, bytes.to_vec());
    }

    /// Every `(cpu, index, value)` written so far.
    pub fn msr_writes(&self) -> Vec<(u32, u32, u64)> {
        self.state.lock().unwrap().msr_writes.clone()
    }

    /// Every plain configuration space write (window index writes included).
    pub fn pci_writes(&self) -> Vec<(PciAddress, u16, u32)> {
        self.state.lock().unwrap().pci_writes.clone()
    }
}

impl HardwareAccess for MockAccess {
    fn read_msr(&self, cpu: u32, index: u32) -> Result<u64> {
        let mut s = self.state.lock().unwrap();
        if let Some(seq) = s.msr_sequences.get_mut(&index) {
            let value = if seq.len() > 1 {
                seq.pop_front()
            } else {
                seq.front().copied()
            };
            if let Some(value) = value {
                return Ok(value);
            }
        }
        s.cpu_msrs
            .get(&(cpu, index))
            .or_else(|| s.msrs.get(&index))
            .copied()
            .ok_or(Error::Unsupported)
    }

    fn write_msr(&self, cpu: u32, index: u32, value: u64) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.msr_writes.push((cpu, index, value));
        s.msrs.insert(index, value);
        Ok(())
    }

    fn read_pci_config32(&self, addr: PciAddress, offset: u16) -> Result<u32> {
        let s = self.state.lock().unwrap();
        if let Some(window) = s
            .windows
            .get(&addr)
            .and_then(|w| w.iter().find(|w| w.data_offset == offset))
        {
            return Ok(window.registers.get(&window.current).copied().unwrap_or(UNPOPULATED));
        }
        Ok(s.pci.get(&(addr, offset)).copied().unwrap_or(UNPOPULATED))
    }

    fn write_pci_config32(&self, addr: PciAddress, offset: u16, value: u32) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.pci_writes.push((addr, offset, value));
        if let Some(windows) = s.windows.get_mut(&addr) {
            if let Some(window) = windows.iter_mut().find(|w| w.index_offset == offset) {
                window.current = value;
                return Ok(());
            }
            if let Some(window) = windows.iter_mut().find(|w| w.data_offset == offset) {
                let current = window.current;
                window.registers.insert(current, value);
                return Ok(());
            }
        }
        s.pci.insert((addr, offset), value);
        Ok(())
    }

    fn find_pci_device(&self, vendor: u16, device: u16, index: u32) -> Result<PciAddress> {
        let s = self.state.lock().unwrap();
        s.devices
            .iter()
            .filter(|(v, d, _)| *v == vendor && *d == device)
            .map(|(_, _, addr)| *addr)
            .nth(index as usize)
            .ok_or(Error::DeviceNotFound {
                vendor,
                device,
                index,
            })
    }

    fn read_physical_memory(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        let s = self.state.lock().unwrap();
        let Some((base, bytes)) = s.memory.range(..=addr).next_back() else {
            return Ok(0);
        };
        let start = (addr - base) as usize;
        if start >= bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        Ok(n)
    }
}

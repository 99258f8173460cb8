// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! A scripted SMU firmware behind the host bridge SMN window.
//!
//! Everything other than host bridge dword 0 and the SMN index/data pair is
//! forwarded to a [`MockAccess`], so MSR based telemetry can be tested
//! against the same handle.

use std::collections::HashMap;
use std::sync::Mutex;

use hwaccess::mock::MockAccess;
use hwaccess::{HardwareAccess, PciAddress, Result};

use crate::codename::{SmuCodename, TableBaseCommand};
use crate::mailbox::{Args, MailboxKind, MailboxLayout, MAX_ARGS, SMN_DATA_REG, SMN_INDEX_REG};
use crate::STATUS_OK;

/// Host bridge id reported unless overridden: AMD Zen root complex.
pub const DEFAULT_PCI_ID: u32 = 0x1450_1022;

const STATUS_UNKNOWN_CMD: u32 = 0xfe;
const MAILBOXES: [MailboxKind; 3] = [MailboxKind::Rsmu, MailboxKind::Mp1, MailboxKind::Hsmp];

#[derive(Default)]
struct SimState {
    pci_id: u32,
    smn_index: u32,
    registers: HashMap<u32, u32>,
    /// Response register reads that still return zero.
    stalled_reads: u32,
    completion_delay: u32,
    smu_version: u32,
    table_base: u64,
    table_version: u32,
    table: Vec<u8>,
    rejections: HashMap<(MailboxKind, u32), u32>,
}

pub struct SmuSimulator {
    inner: MockAccess,
    codename: SmuCodename,
    layout: MailboxLayout,
    state: Mutex<SimState>,
}

impl SmuSimulator {
    /// Firmware for `codename` with every response register idle and OK.
    ///
    /// Panics if the codename has no mailbox layout.
    pub fn new(codename: SmuCodename) -> Self {
        let layout = codename.mailbox_layout().unwrap();
        let mut state = SimState {
            pci_id: DEFAULT_PCI_ID,
            ..Default::default()
        };
        for kind in MAILBOXES {
            let addrs = layout.addresses(kind);
            if addrs.is_present() {
                state.registers.insert(addrs.rsp, STATUS_OK);
            }
        }
        SmuSimulator {
            inner: MockAccess::new(),
            codename,
            layout,
            state: Mutex::new(state),
        }
    }

    fn with_state(self, f: impl FnOnce(&mut SimState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    /// Forwards non-SMU traffic to `inner`.
    pub fn with_access(mut self, inner: MockAccess) -> Self {
        self.inner = inner;
        self
    }

    pub fn with_pci_id(self, pci_id: u32) -> Self {
        self.with_state(|s| s.pci_id = pci_id)
    }

    pub fn with_smu_version(self, version: u32) -> Self {
        self.with_state(|s| s.smu_version = version)
    }

    /// Table published at `base` on every transfer command.
    pub fn with_pm_table(self, base: u64, version: u32, bytes: &[u8]) -> Self {
        self.with_state(|s| {
            s.table_base = base;
            s.table_version = version;
            s.table = bytes.to_vec();
        })
    }

    /// Replaces the table contents the next transfer publishes.
    pub fn set_pm_table(&self, bytes: &[u8]) {
        self.state.lock().unwrap().table = bytes.to_vec();
    }

    /// The next `reads` response register reads return zero.
    pub fn stall(&self, reads: u32) {
        self.state.lock().unwrap().stalled_reads = reads;
    }

    /// Response register reads that return zero after each command.
    pub fn set_completion_delay(&self, reads: u32) {
        self.state.lock().unwrap().completion_delay = reads;
    }

    /// Answers `function` on `kind` with `status` instead of running it.
    pub fn reject(&self, kind: MailboxKind, function: u32, status: u32) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert((kind, function), status);
    }

    pub fn inner(&self) -> &MockAccess {
        &self.inner
    }

    fn is_response(&self, address: u32) -> bool {
        MAILBOXES.iter().any(|kind| {
            let addrs = self.layout.addresses(*kind);
            addrs.is_present() && addrs.rsp == address
        })
    }

    fn smn_read(&self, s: &mut SimState, address: u32) -> u32 {
        if s.stalled_reads > 0 && self.is_response(address) {
            s.stalled_reads -= 1;
            return 0;
        }
        s.registers.get(&address).copied().unwrap_or(0)
    }

    fn smn_write(&self, s: &mut SimState, address: u32, value: u32) {
        s.registers.insert(address, value);
        if let Some(kind) = MAILBOXES.iter().copied().find(|kind| {
            let addrs = self.layout.addresses(*kind);
            addrs.is_present() && addrs.cmd == address
        }) {
            self.execute(s, kind, value);
        }
    }

    fn execute(&self, s: &mut SimState, kind: MailboxKind, function: u32) {
        let addrs = *self.layout.addresses(kind);
        let mut args: Args = [0; MAX_ARGS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = s.registers.get(&addrs.arg(i)).copied().unwrap_or(0);
        }

        let status = match s.rejections.get(&(kind, function)).copied() {
            Some(status) => status,
            None => self.run(s, kind, function, &mut args),
        };

        for (i, arg) in args.iter().enumerate() {
            s.registers.insert(addrs.arg(i), *arg);
        }
        s.registers.insert(addrs.rsp, status);
        s.stalled_reads = s.completion_delay;
    }

    fn run(&self, s: &mut SimState, kind: MailboxKind, function: u32, args: &mut Args) -> u32 {
        match kind {
            MailboxKind::Mp1 if function == 0x02 => {
                args[0] = s.smu_version;
                STATUS_OK
            }
            MailboxKind::Rsmu => self.run_rsmu(s, function, args),
            _ => STATUS_UNKNOWN_CMD,
        }
    }

    // Some platforms reuse one function id for several requests, so every
    // matching effect is applied.
    fn run_rsmu(&self, s: &mut SimState, function: u32, args: &mut Args) -> u32 {
        let low = s.table_base as u32;
        let high = (s.table_base >> 32) as u32;
        let mut known = false;

        if self.codename.transfer_command().map(|(f, _)| f) == Some(function) {
            known = true;
            if s.table_base != 0 && !s.table.is_empty() {
                self.inner.set_memory(s.table_base, &s.table);
            }
        }

        match self.codename.table_base_command() {
            Some(TableBaseCommand::Single(f)) if f == function && args[0] == 1 && args[1] == 1 => {
                known = true;
                args[0] = low;
                args[1] = high;
            }
            Some(TableBaseCommand::Pair(first, second))
                if first == function || second == function =>
            {
                known = true;
                if second == function {
                    args[0] = low;
                }
            }
            Some(TableBaseCommand::Split(a, b, c)) if [a, b, c].contains(&function) => {
                known = true;
                if c == function {
                    match args[0] {
                        3 => args[0] = low,
                        5 => args[0] = high,
                        _ => {}
                    }
                }
            }
            _ => {}
        }

        if self.codename.table_version_command() == Some(function) {
            known = true;
            args[0] = s.table_version;
        }

        if known {
            STATUS_OK
        } else {
            STATUS_UNKNOWN_CMD
        }
    }
}

impl HardwareAccess for SmuSimulator {
    fn read_msr(&self, cpu: u32, index: u32) -> Result<u64> {
        self.inner.read_msr(cpu, index)
    }

    fn write_msr(&self, cpu: u32, index: u32, value: u64) -> Result<()> {
        self.inner.write_msr(cpu, index, value)
    }

    fn read_pci_config32(&self, addr: PciAddress, offset: u16) -> Result<u32> {
        if addr == PciAddress::HOST_BRIDGE {
            let mut s = self.state.lock().unwrap();
            match offset {
                0 => return Ok(s.pci_id),
                SMN_DATA_REG => {
                    let index = s.smn_index;
                    return Ok(self.smn_read(&mut s, index));
                }
                _ => {}
            }
        }
        self.inner.read_pci_config32(addr, offset)
    }

    fn write_pci_config32(&self, addr: PciAddress, offset: u16, value: u32) -> Result<()> {
        if addr == PciAddress::HOST_BRIDGE {
            let mut s = self.state.lock().unwrap();
            match offset {
                SMN_INDEX_REG => {
                    s.smn_index = value;
                    return Ok(());
                }
                SMN_DATA_REG => {
                    let index = s.smn_index;
                    self.smn_write(&mut s, index, value);
                    return Ok(());
                }
                _ => {}
            }
        }
        self.inner.write_pci_config32(addr, offset, value)
    }

    fn find_pci_device(&self, vendor: u16, device: u16, index: u32) -> Result<PciAddress> {
        self.inner.find_pci_device(vendor, device, index)
    }

    fn read_physical_memory(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        self.inner.read_physical_memory(addr, buf)
    }
}

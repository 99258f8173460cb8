// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::fmt;
use std::sync::Arc;

use hwaccess::{HardwareAccess, PciAddress};

use crate::{Result, SmuError, STATUS_OK};

/// SMN index register in the host bridge configuration space.
pub const SMN_INDEX_REG: u16 = 0xc4;
/// SMN data register in the host bridge configuration space.
pub const SMN_DATA_REG: u16 = 0xc8;

pub const MAX_ARGS: usize = 6;
pub const DEFAULT_MAX_RETRIES: u32 = 8096;

pub type Args = [u32; MAX_ARGS];

/// Args with only arg0 set.
pub fn args(arg0: u32) -> Args {
    let mut args = [0; MAX_ARGS];
    args[0] = arg0;
    args
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MailboxKind {
    Rsmu,
    Mp1,
    Hsmp,
}

impl fmt::Display for MailboxKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MailboxKind::Rsmu => "RSMU",
            MailboxKind::Mp1 => "MP1",
            MailboxKind::Hsmp => "HSMP",
        };
        write!(f, "{}", name)
    }
}

/// SMN addresses of one mailbox. A zero command address means the mailbox is absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxAddresses {
    pub cmd: u32,
    pub rsp: u32,
    pub args: u32,
}

impl MailboxAddresses {
    pub const NONE: Self = MailboxAddresses { cmd: 0, rsp: 0, args: 0 };

    pub fn is_present(&self) -> bool {
        self.cmd != 0
    }

    pub fn arg(&self, index: usize) -> u32 {
        self.args + (index as u32) * 4
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MailboxLayout {
    pub rsmu: MailboxAddresses,
    pub mp1: MailboxAddresses,
    pub hsmp: MailboxAddresses,
    /// Infinity Fabric generation of the platform.
    pub if_version: u32,
}

impl MailboxLayout {
    pub fn addresses(&self, kind: MailboxKind) -> &MailboxAddresses {
        match kind {
            MailboxKind::Rsmu => &self.rsmu,
            MailboxKind::Mp1 => &self.mp1,
            MailboxKind::Hsmp => &self.hsmp,
        }
    }
}

/// System Management Network access through the host bridge index/data pair.
#[derive(Clone)]
pub struct Smn {
    hw: Arc<dyn HardwareAccess>,
}

impl Smn {
    pub fn new(hw: Arc<dyn HardwareAccess>) -> Self {
        Smn { hw }
    }

    pub fn hw(&self) -> &Arc<dyn HardwareAccess> {
        &self.hw
    }

    pub fn read(&self, address: u32) -> Result<u32> {
        self.hw
            .write_pci_config32(PciAddress::HOST_BRIDGE, SMN_INDEX_REG, address)
            .map_err(SmuError::DriverError)?;
        let value = self
            .hw
            .read_pci_config32(PciAddress::HOST_BRIDGE, SMN_DATA_REG)
            .map_err(SmuError::DriverError)?;
        if value == 0xffff_ffff {
            return Err(SmuError::Failed);
        }
        Ok(value)
    }

    pub fn write(&self, address: u32, value: u32) -> Result<()> {
        self.hw
            .write_pci_config32(PciAddress::HOST_BRIDGE, SMN_INDEX_REG, address)
            .map_err(SmuError::DriverError)?;
        self.hw
            .write_pci_config32(PciAddress::HOST_BRIDGE, SMN_DATA_REG, value)
            .map_err(SmuError::DriverError)
    }
}

/// The command protocol over the mailboxes of one platform.
pub struct Mailbox {
    smn: Smn,
    layout: MailboxLayout,
    max_retries: u32,
}

impl Mailbox {
    pub fn new(smn: Smn, layout: MailboxLayout, max_retries: u32) -> Self {
        Mailbox {
            smn,
            layout,
            max_retries,
        }
    }

    pub fn layout(&self) -> &MailboxLayout {
        &self.layout
    }

    pub fn smn(&self) -> &Smn {
        &self.smn
    }

    /// Polls the response register until it is non-zero, returning it with the number of reads.
    fn wait_response(&self, rsp: u32) -> Result<(u32, u32)> {
        for attempt in 1..=self.max_retries {
            let status = self.smn.read(rsp)?;
            if status != 0 {
                return Ok((status, attempt));
            }
        }
        Err(SmuError::CmdTimeout)
    }

    /// Runs `function` on the mailbox, replacing `args` with the firmware's result words.
    ///
    /// A stale response from an earlier caller is drained before the command is posted.
    pub fn send_command(&self, kind: MailboxKind, function: u32, args: &mut Args) -> Result<()> {
        let addrs = *self.layout.addresses(kind);
        if !addrs.is_present() {
            return Err(SmuError::Unsupported);
        }

        let (_, drained) = self.wait_response(addrs.rsp)?;
        self.smn.write(addrs.rsp, 0)?;
        for (i, arg) in args.iter().enumerate() {
            self.smn.write(addrs.arg(i), *arg)?;
        }
        self.smn.write(addrs.cmd, function)?;

        let (status, waited) = self.wait_response(addrs.rsp)?;
        debug!(
            "{} fn {:#x}: status {:#x} after {} + {} polls",
            kind, function, status, drained, waited
        );
        if status != STATUS_OK {
            return Err(SmuError::from_response(status));
        }

        for (i, arg) in args.iter_mut().enumerate() {
            *arg = self.smn.read(addrs.arg(i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SmuSimulator;
    use crate::SmuCodename;

    fn mailbox(sim: Arc<SmuSimulator>, max_retries: u32) -> Mailbox {
        let layout = SmuCodename::Raphael.mailbox_layout().unwrap();
        Mailbox::new(Smn::new(sim), layout, max_retries)
    }

    #[test]
    fn arg_addresses_are_dword_spaced() {
        let addrs = MailboxAddresses {
            cmd: 1,
            rsp: 2,
            args: 0x100,
        };
        assert_eq!(addrs.arg(0), 0x100);
        assert_eq!(addrs.arg(5), 0x114);
        assert!(!MailboxAddresses::NONE.is_present());
        assert_eq!(args(3), [3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn stale_response_below_cap_succeeds() {
        for stalled in [0, 1, 7, 15] {
            let sim =
                Arc::new(SmuSimulator::new(SmuCodename::Raphael).with_smu_version(0x0054_3700));
            sim.stall(stalled);
            let mut result = args(1);
            mailbox(sim, 16)
                .send_command(MailboxKind::Mp1, 0x02, &mut result)
                .unwrap();
            assert_eq!(result[0], 0x0054_3700);
        }
    }

    #[test]
    fn stale_response_at_or_above_cap_times_out() {
        for stalled in [16, 17, 100] {
            let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
            sim.stall(stalled);
            let mut result = args(1);
            assert!(matches!(
                mailbox(sim, 16).send_command(MailboxKind::Mp1, 0x02, &mut result),
                Err(SmuError::CmdTimeout)
            ));
        }
    }

    #[test]
    fn slow_completion_times_out() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        sim.set_completion_delay(16);
        let mut result = args(1);
        assert!(matches!(
            mailbox(sim.clone(), 16).send_command(MailboxKind::Mp1, 0x02, &mut result),
            Err(SmuError::CmdTimeout)
        ));

        sim.set_completion_delay(15);
        mailbox(sim, 16)
            .send_command(MailboxKind::Mp1, 0x02, &mut result)
            .unwrap();
    }

    #[test]
    fn rejected_commands_surface_firmware_status() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        let mut result = args(0);
        assert!(matches!(
            mailbox(sim.clone(), 16).send_command(MailboxKind::Rsmu, 0x7f, &mut result),
            Err(SmuError::UnknownCmd)
        ));
        sim.reject(MailboxKind::Rsmu, 0x04, 0xfc);
        assert!(matches!(
            mailbox(sim, 16).send_command(MailboxKind::Rsmu, 0x04, &mut result),
            Err(SmuError::RejectedBusy)
        ));
    }

    #[test]
    fn missing_mailbox_is_unsupported() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Renoir));
        let layout = SmuCodename::Renoir.mailbox_layout().unwrap();
        let mut result = args(0);
        assert!(matches!(
            Mailbox::new(Smn::new(sim), layout, 16).send_command(
                MailboxKind::Hsmp,
                0x01,
                &mut result
            ),
            Err(SmuError::Unsupported)
        ));
    }

    #[test]
    fn all_ones_read_is_a_failure() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        let smn = Smn::new(sim.clone());
        smn.write(0x5_9800, 0xffff_ffff).unwrap();
        assert!(matches!(smn.read(0x5_9800), Err(SmuError::Failed)));
        smn.write(0x5_9800, 0x1234).unwrap();
        assert_eq!(smn.read(0x5_9800).unwrap(), 0x1234);
    }
}

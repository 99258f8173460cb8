// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::sync::Arc;

use cpuid::ProcessorIdentity;
use hwaccess::{HardwareAccess, PciAddress};

use crate::codename::{SmuCodename, TableBaseCommand};
use crate::mailbox::{args, Args, Mailbox, MailboxKind, MailboxLayout, Smn, DEFAULT_MAX_RETRIES};
use crate::pm_table::{table_size, PmTable};
use crate::{Result, SmuError};

const AMD_PCI_VENDOR: u32 = 0x1022;
const MP1_GET_SMU_VERSION: u32 = 0x02;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SmuConfig {
    /// Response register polls per phase of a command.
    pub max_retries: u32,
}

impl Default for SmuConfig {
    fn default() -> Self {
        SmuConfig {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// An initialized connection to the SMU of the running platform.
///
/// Construction resolves the codename, checks the host bridge and reads the
/// firmware version. The power management table is set up separately with
/// [`SmuSession::init_pm_table`] since not every platform publishes one.
pub struct SmuSession {
    codename: SmuCodename,
    mailbox: Mailbox,
    pci_id: u32,
    smu_version: u32,
    table: Option<PmTable>,
}

impl SmuSession {
    pub fn new(
        hw: Arc<dyn HardwareAccess>,
        id: &ProcessorIdentity,
        config: SmuConfig,
    ) -> Result<Self> {
        let codename = SmuCodename::from_identity(id)?;
        Self::with_codename(hw, codename, config)
    }

    pub fn with_codename(
        hw: Arc<dyn HardwareAccess>,
        codename: SmuCodename,
        config: SmuConfig,
    ) -> Result<Self> {
        if config.max_retries == 0 {
            return Err(SmuError::InvalidArgument);
        }

        let pci_id = hw
            .read_pci_config32(PciAddress::HOST_BRIDGE, 0)
            .map_err(SmuError::DriverError)?;
        if pci_id & 0xffff != AMD_PCI_VENDOR {
            debug!("Host bridge {:08x} is not an AMD device", pci_id);
            return Err(SmuError::CpuNotSupported);
        }

        let layout = codename.mailbox_layout()?;
        debug!(
            "{}: RSMU {:#x}/{:#x}/{:#x} MP1 {:#x}/{:#x}/{:#x} HSMP {:#x}/{:#x}/{:#x}",
            codename,
            layout.rsmu.cmd,
            layout.rsmu.rsp,
            layout.rsmu.args,
            layout.mp1.cmd,
            layout.mp1.rsp,
            layout.mp1.args,
            layout.hsmp.cmd,
            layout.hsmp.rsp,
            layout.hsmp.args
        );

        let mailbox = Mailbox::new(Smn::new(hw), layout, config.max_retries);
        let mut version = args(1);
        mailbox.send_command(MailboxKind::Mp1, MP1_GET_SMU_VERSION, &mut version)?;
        let smu_version = version[0];
        debug!("SMU version {}", format_version(smu_version));

        Ok(SmuSession {
            codename,
            mailbox,
            pci_id,
            smu_version,
            table: None,
        })
    }

    pub fn codename(&self) -> SmuCodename {
        self.codename
    }

    pub fn layout(&self) -> &MailboxLayout {
        self.mailbox.layout()
    }

    pub fn if_version(&self) -> u32 {
        self.mailbox.layout().if_version
    }

    /// Host bridge vendor and device id.
    pub fn pci_id(&self) -> u32 {
        self.pci_id
    }

    pub fn smu_version(&self) -> u32 {
        self.smu_version
    }

    pub fn smn(&self) -> &Smn {
        self.mailbox.smn()
    }

    pub fn send_command(&self, kind: MailboxKind, function: u32, args: &mut Args) -> Result<()> {
        self.mailbox.send_command(kind, function, args)
    }

    fn rsmu(&self, function: u32, mut args: Args) -> Result<Args> {
        self.mailbox.send_command(MailboxKind::Rsmu, function, &mut args)?;
        Ok(args)
    }

    fn table_base(&self) -> Result<u64> {
        match self.codename.table_base_command() {
            Some(TableBaseCommand::Single(function)) => {
                let mut request = args(1);
                request[1] = 1;
                let result = self.rsmu(function, request)?;
                Ok(((result[1] as u64) << 32) | result[0] as u64)
            }
            Some(TableBaseCommand::Pair(first, second)) => {
                self.rsmu(first, args(0))?;
                Ok(self.rsmu(second, args(0))?[0] as u64)
            }
            Some(TableBaseCommand::Split(a, b, c)) => {
                self.rsmu(a, args(3))?;
                let low = self.rsmu(c, args(3))?[0];
                self.rsmu(b, args(3))?;
                self.rsmu(a, args(5))?;
                let high = self.rsmu(c, args(5))?[0];
                Ok(((high as u64) << 32) | low as u64)
            }
            None => Err(SmuError::Unsupported),
        }
    }

    fn table_version(&self) -> Result<u32> {
        let function = self.codename.table_version_command().ok_or(SmuError::Unsupported)?;
        Ok(self.rsmu(function, args(0))?[0])
    }

    /// Locates the power management table and allocates the local copy.
    ///
    /// Calling it again re-reads the base and version and replaces the buffer.
    pub fn init_pm_table(&mut self) -> Result<()> {
        if !self.mailbox.layout().rsmu.is_present() {
            return Err(SmuError::Unsupported);
        }

        let base = self.table_base()?;
        let version = match self.table_version() {
            Ok(version) => version,
            // Older platforms have no version command; their size is fixed or the default.
            Err(SmuError::Unsupported) => 0,
            Err(e) => return Err(e),
        };
        let size = self
            .codename
            .fixed_table_size()
            .unwrap_or_else(|| table_size(version));
        debug!(
            "PM table at {:#x}, version {:#x}, {} bytes",
            base, version, size
        );

        self.table = Some(PmTable::new(base, version, size)?);
        Ok(())
    }

    /// Asks the firmware to publish a fresh table and copies it from physical memory.
    pub fn update_pm_table(&mut self) -> Result<()> {
        let (function, arg0) = self.codename.transfer_command().ok_or(SmuError::Unsupported)?;
        let base = match &self.table {
            Some(table) if table.base() != 0 => table.base(),
            _ => return Err(SmuError::Unsupported),
        };

        self.rsmu(function, args(arg0))?;

        let hw = self.mailbox.smn().hw().clone();
        let table = self.table.as_mut().ok_or(SmuError::NotInitialized)?;
        let buf = table.bytes_mut();
        let len = buf.len();
        let read = hw.read_physical_memory(base, buf).map_err(SmuError::DriverError)?;
        if read < len {
            return Err(SmuError::DriverError(hwaccess::Error::ShortRead {
                addr: base,
                read,
                len,
            }));
        }
        Ok(())
    }

    pub fn pm_table(&self) -> Result<&PmTable> {
        self.table.as_ref().ok_or(SmuError::NotInitialized)
    }

    pub fn pm_table_version(&self) -> Result<u32> {
        Ok(self.pm_table()?.version())
    }

    pub fn pm_table_size(&self) -> Result<usize> {
        Ok(self.pm_table()?.size())
    }

    pub fn stapm_limit(&self) -> Result<f32> {
        self.pm_table()?.stapm_limit()
    }

    pub fn stapm_value(&self) -> Result<f32> {
        self.pm_table()?.stapm_value()
    }

    pub fn fast_limit(&self) -> Result<f32> {
        self.pm_table()?.fast_limit()
    }

    pub fn fast_value(&self) -> Result<f32> {
        self.pm_table()?.fast_value()
    }

    pub fn slow_limit(&self) -> Result<f32> {
        self.pm_table()?.slow_limit()
    }

    pub fn slow_value(&self) -> Result<f32> {
        self.pm_table()?.slow_value()
    }

    pub fn core_temperature(&self, core: u32) -> Result<f32> {
        self.pm_table()?.core_temperature(core)
    }

    pub fn apu_temperature(&self) -> Result<f32> {
        self.pm_table()?.apu_temperature()
    }
}

/// `major.minor.patch` as reported by MP1.
pub fn format_version(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};
    use cpuid::{decode, CpuidLeaf, MatchPolicy, SampleBuilder};

    use super::*;
    use crate::mock::SmuSimulator;
    use crate::pm_table::{DEFAULT_TABLE_SIZE, FAST_LIMIT, SLOW_LIMIT};

    fn config() -> SmuConfig {
        SmuConfig { max_retries: 32 }
    }

    fn table_with(size: usize, values: &[(usize, f32)]) -> Vec<u8> {
        let mut bytes = vec![0u8; size];
        for (offset, value) in values {
            LittleEndian::write_f32(&mut bytes[*offset..], *value);
        }
        bytes
    }

    #[test]
    fn session_from_identity() {
        let raw = SampleBuilder::new()
            .vendor(b"AuthenticAMD")
            .max_basic(0x10)
            .max_extended(0x8000_0008)
            .signature(0x19, 0x61, 2)
            .leaf(0x8000_0001, CpuidLeaf::new(0, 4 << 28, 0, 0))
            .build();
        let id = decode(&raw, MatchPolicy::default()).unwrap();
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael).with_smu_version(0x0054_3a00));
        let session = SmuSession::new(sim, &id, config()).unwrap();
        assert_eq!(session.codename(), SmuCodename::Raphael);
        assert_eq!(session.if_version(), 11);
        assert_eq!(session.smu_version(), 0x0054_3a00);
        assert_eq!(format_version(session.smu_version()), "84.58.0");
        assert_eq!(session.pci_id() & 0xffff, 0x1022);
    }

    #[test]
    fn non_amd_host_bridge_is_rejected() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael).with_pci_id(0x1234_8086));
        assert!(matches!(
            SmuSession::with_codename(sim, SmuCodename::Raphael, config()),
            Err(SmuError::CpuNotSupported)
        ));
    }

    #[test]
    fn intel_identity_is_rejected() {
        let raw = SampleBuilder::new()
            .vendor(b"GenuineIntel")
            .max_basic(1)
            .signature(6, 0x97, 2)
            .build();
        let id = decode(&raw, MatchPolicy::default()).unwrap();
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        assert!(matches!(
            SmuSession::new(sim, &id, config()),
            Err(SmuError::CpuNotSupported)
        ));
    }

    #[test]
    fn zero_retries_are_invalid() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        assert!(matches!(
            SmuSession::with_codename(sim, SmuCodename::Raphael, SmuConfig { max_retries: 0 }),
            Err(SmuError::InvalidArgument)
        ));
    }

    #[test]
    fn table_access_needs_init() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        let session = SmuSession::with_codename(sim, SmuCodename::Raphael, config()).unwrap();
        assert!(matches!(session.fast_limit(), Err(SmuError::NotInitialized)));
    }

    #[test]
    fn single_call_base_and_transfer() {
        let bytes = table_with(
            0x944,
            &[(FAST_LIMIT, 88.0), (SLOW_LIMIT, 65.0), (0x360 + 8, 71.0)],
        );
        let sim = Arc::new(
            SmuSimulator::new(SmuCodename::Raphael).with_pm_table(0x1_dead_0000, 0x40_0005, &bytes),
        );
        let mut session = SmuSession::with_codename(sim, SmuCodename::Raphael, config()).unwrap();

        session.init_pm_table().unwrap();
        assert_eq!(session.pm_table_version().unwrap(), 0x40_0005);
        assert_eq!(session.pm_table_size().unwrap(), 0x944);
        assert_eq!(session.pm_table().unwrap().base(), 0x1_dead_0000);
        // Nothing is copied before the first update.
        assert_eq!(session.fast_limit().unwrap(), 0.0);

        session.update_pm_table().unwrap();
        assert_eq!(session.fast_limit().unwrap(), 88.0);
        assert_eq!(session.slow_limit().unwrap(), 65.0);
        assert_eq!(session.core_temperature(2).unwrap(), 71.0);
        assert!(matches!(session.apu_temperature(), Err(SmuError::Unsupported)));
        assert!(matches!(session.core_temperature(16), Err(SmuError::Unsupported)));
    }

    #[test]
    fn unknown_version_uses_default_size() {
        let bytes = table_with(DEFAULT_TABLE_SIZE, &[(FAST_LIMIT, 25.0)]);
        let sim = Arc::new(
            SmuSimulator::new(SmuCodename::Phoenix).with_pm_table(0x8000_0000, 0x7f_0001, &bytes),
        );
        let mut session = SmuSession::with_codename(sim, SmuCodename::Phoenix, config()).unwrap();
        session.init_pm_table().unwrap();
        assert_eq!(session.pm_table_size().unwrap(), DEFAULT_TABLE_SIZE);
        session.update_pm_table().unwrap();
        assert_eq!(session.fast_limit().unwrap(), 25.0);
    }

    #[test]
    fn pair_base_without_version_command() {
        let bytes = table_with(DEFAULT_TABLE_SIZE, &[(SLOW_LIMIT, 95.0)]);
        let sim = Arc::new(
            SmuSimulator::new(SmuCodename::PinnacleRidge).with_pm_table(0xd000_0000, 0, &bytes),
        );
        let mut session =
            SmuSession::with_codename(sim, SmuCodename::PinnacleRidge, config()).unwrap();
        session.init_pm_table().unwrap();
        assert_eq!(session.pm_table_version().unwrap(), 0);
        assert_eq!(session.pm_table_size().unwrap(), DEFAULT_TABLE_SIZE);
        session.update_pm_table().unwrap();
        assert_eq!(session.slow_limit().unwrap(), 95.0);
    }

    #[test]
    fn split_base_uses_fixed_size() {
        let bytes = table_with(0x6ac, &[(FAST_LIMIT, 30.0)]);
        let sim = Arc::new(
            SmuSimulator::new(SmuCodename::Picasso).with_pm_table(0x2_c000_1000, 0x1e_0004, &bytes),
        );
        let mut session = SmuSession::with_codename(sim, SmuCodename::Picasso, config()).unwrap();
        session.init_pm_table().unwrap();
        assert_eq!(session.pm_table().unwrap().base(), 0x2_c000_1000);
        assert_eq!(session.pm_table_size().unwrap(), 0x6ac);
        session.update_pm_table().unwrap();
        assert_eq!(session.fast_limit().unwrap(), 30.0);
    }

    #[test]
    fn short_memory_read_is_a_driver_error() {
        let bytes = table_with(0x100, &[]);
        let sim = Arc::new(
            SmuSimulator::new(SmuCodename::Raphael).with_pm_table(0x4000, 0x40_0005, &bytes),
        );
        let mut session = SmuSession::with_codename(sim, SmuCodename::Raphael, config()).unwrap();
        session.init_pm_table().unwrap();
        assert!(matches!(
            session.update_pm_table(),
            Err(SmuError::DriverError(hwaccess::Error::ShortRead { .. }))
        ));
    }

    #[test]
    fn zero_base_cannot_be_updated() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Vermeer));
        let mut session = SmuSession::with_codename(sim, SmuCodename::Vermeer, config()).unwrap();
        assert!(matches!(session.update_pm_table(), Err(SmuError::Unsupported)));
        session.init_pm_table().unwrap();
        assert!(matches!(session.update_pm_table(), Err(SmuError::Unsupported)));
    }

    #[test]
    fn version_stall_aborts_init() {
        let sim = Arc::new(SmuSimulator::new(SmuCodename::Raphael));
        sim.stall(32);
        assert!(matches!(
            SmuSession::with_codename(sim, SmuCodename::Raphael, config()),
            Err(SmuError::CmdTimeout)
        ));
    }
}

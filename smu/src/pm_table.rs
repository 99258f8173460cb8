// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use byteorder::{ByteOrder, LittleEndian};

use crate::{Result, SmuError};

/// Size used for table versions missing from [`TABLE_SIZES`]. It covers every known layout.
pub const DEFAULT_TABLE_SIZE: usize = 0x2000;

pub const STAPM_LIMIT: usize = 0x00;
pub const STAPM_VALUE: usize = 0x04;
pub const FAST_LIMIT: usize = 0x08;
pub const FAST_VALUE: usize = 0x0c;
pub const SLOW_LIMIT: usize = 0x10;
pub const SLOW_VALUE: usize = 0x14;

/// Offset of the integrated GPU temperature on APU layouts.
const APU_TEMPERATURE: usize = 0x5c;
const MAX_CORES: u32 = 16;

#[rustfmt::skip]
const TABLE_SIZES: &[(u32, usize)] = &[
    (0x00_0400, 0x948),
    (0x1e_0001, 0x568), (0x1e_0002, 0x580), (0x1e_0003, 0x578), (0x1e_0004, 0x608),
    (0x1e_0005, 0x608), (0x1e_000a, 0x608), (0x1e_0101, 0x608),
    (0x24_0003, 0x18ac), (0x24_0503, 0xd7c), (0x24_0603, 0xab0), (0x24_0703, 0x7e4),
    (0x24_0802, 0x7e0), (0x24_0803, 0x7e4), (0x24_0902, 0x514), (0x24_0903, 0x518),
    (0x2d_0008, 0x1ab0), (0x2d_0803, 0x894), (0x2d_0903, 0x594),
    (0x37_0000, 0x794), (0x37_0001, 0x884), (0x37_0002, 0x88c), (0x37_0003, 0x8ac),
    (0x37_0004, 0x8ac), (0x37_0005, 0x8c8),
    (0x38_0005, 0x1bb0), (0x38_0505, 0xf30), (0x38_0605, 0xc10), (0x38_0705, 0x8f0),
    (0x38_0804, 0x8a4), (0x38_0805, 0x8f0), (0x38_0904, 0x5a4), (0x38_0905, 0x5d0),
    (0x3f_0000, 0x7ac),
    (0x40_0001, 0x910), (0x40_0002, 0x928), (0x40_0003, 0x94c), (0x40_0004, 0x944),
    (0x40_0005, 0x944),
    (0x45_0004, 0xaa4), (0x45_0005, 0xab0),
    (0x4c_0003, 0xb18), (0x4c_0004, 0xb1c), (0x4c_0005, 0xaf8), (0x4c_0006, 0xafc),
    (0x4c_0007, 0xb00), (0x4c_0008, 0xaf0), (0x4c_0009, 0xb00),
    (0x54_0000, 0x828), (0x54_0001, 0x82c), (0x54_0002, 0x87c), (0x54_0003, 0x89c),
    (0x54_0004, 0x8bc), (0x54_0005, 0x8c8),
    (0x54_0100, 0x618), (0x54_0101, 0x61c), (0x54_0102, 0x66c), (0x54_0103, 0x68c),
    (0x54_0104, 0x6a8), (0x54_0105, 0x6b4), (0x54_0108, 0x6bc), (0x54_0208, 0x8d0),
    (0x5c_0002, 0x1e3c), (0x5c_0003, 0x1e48), (0x5c_0102, 0x1a14), (0x5c_0103, 0x1a20),
    (0x5c_0202, 0x15ec), (0x5c_0203, 0x15f8), (0x5c_0302, 0xd9c), (0x5c_0303, 0xda8),
    (0x5c_0402, 0x974), (0x5c_0403, 0x980),
    (0x5d_0008, 0xd54), (0x5d_0009, 0xd58),
    (0x62_0105, 0x724), (0x62_0205, 0x994), (0x62_1101, 0x724), (0x62_1102, 0x724),
    (0x62_1201, 0x994), (0x62_1202, 0x994),
    (0x64_0107, 0xdc0), (0x64_0108, 0xdc4), (0x64_0109, 0xdd4), (0x64_010a, 0xdd4),
    (0x64_010c, 0xddc), (0x64_0207, 0x100c), (0x64_0208, 0x1010), (0x64_0209, 0x1020),
    (0x64_020a, 0x1020), (0x64_020c, 0x1028),
    (0x65_0004, 0xb74), (0x65_0005, 0xb78),
];

/// `(first version, last version, base offset, cores)` of the per-core temperature array.
#[rustfmt::skip]
const CORE_TEMPERATURE: &[(u32, u32, usize, u32)] = &[
    (0x24_0803, 0x24_0803, 0x2cc, MAX_CORES),
    (0x24_0903, 0x24_0903, 0x28c, 8),
    (0x37_0000, 0x37_0004, 0x340, MAX_CORES),
    (0x37_0005, 0x37_0005, 0x35c, MAX_CORES),
    (0x38_0804, 0x38_0804, 0x324, MAX_CORES),
    (0x38_0805, 0x38_0805, 0x330, MAX_CORES),
    (0x38_0904, 0x38_0904, 0x2e4, 8),
    (0x38_0905, 0x38_0905, 0x2f0, 8),
    (0x3f_0000, 0x3f_0000, 0x258, 4),
    (0x40_0004, 0x40_0005, 0x360, MAX_CORES),
    (0x5d_0008, 0x5d_0008, 0xa38, MAX_CORES),
    (0x64_020c, 0x64_020c, 0xc10, MAX_CORES),
];

#[rustfmt::skip]
const APU_TEMPERATURE_VERSIONS: &[u32] = &[
    0x37_0000, 0x37_0001, 0x37_0002, 0x37_0003, 0x37_0004, 0x37_0005,
    0x3f_0000,
    0x40_0001, 0x40_0002, 0x40_0003, 0x40_0004, 0x40_0005,
    0x45_0004, 0x45_0005,
    0x4c_0006, 0x4c_0007, 0x4c_0008, 0x4c_0009,
    0x5d_0008,
    0x64_020c,
];

/// Byte size of a table layout, falling back to [`DEFAULT_TABLE_SIZE`].
pub fn table_size(version: u32) -> usize {
    TABLE_SIZES
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, size)| *size)
        .unwrap_or(DEFAULT_TABLE_SIZE)
}

pub fn core_temperature_offset(version: u32, core: u32) -> Result<usize> {
    let (_, _, base, cores) = CORE_TEMPERATURE
        .iter()
        .find(|(first, last, _, _)| (*first..=*last).contains(&version))
        .ok_or(SmuError::Unsupported)?;
    if core >= *cores {
        return Err(SmuError::Unsupported);
    }
    Ok(base + core as usize * 4)
}

pub fn apu_temperature_offset(version: u32) -> Result<usize> {
    if APU_TEMPERATURE_VERSIONS.contains(&version) {
        Ok(APU_TEMPERATURE)
    } else {
        Err(SmuError::Unsupported)
    }
}

/// Local copy of the firmware's power management table.
#[derive(Debug)]
pub struct PmTable {
    base: u64,
    version: u32,
    data: Vec<u8>,
}

impl PmTable {
    /// Allocates a zeroed buffer of `size` bytes.
    pub fn new(base: u64, version: u32, size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| SmuError::MappingError)?;
        data.resize(size, 0);
        Ok(PmTable { base, version, data })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copies the table into `buf`, which must hold at least [`PmTable::size`] bytes.
    pub fn copy_to(&self, buf: &mut [u8]) -> Result<usize> {
        let dst = buf.get_mut(..self.data.len()).ok_or(SmuError::InsufficientBuffer)?;
        dst.copy_from_slice(&self.data);
        Ok(self.data.len())
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32> {
        let end = offset.checked_add(4).ok_or(SmuError::InvalidArgument)?;
        let bytes = self.data.get(offset..end).ok_or(SmuError::InvalidArgument)?;
        Ok(LittleEndian::read_f32(bytes))
    }

    pub fn stapm_limit(&self) -> Result<f32> {
        self.read_f32(STAPM_LIMIT)
    }

    pub fn stapm_value(&self) -> Result<f32> {
        self.read_f32(STAPM_VALUE)
    }

    /// PL2.
    pub fn fast_limit(&self) -> Result<f32> {
        self.read_f32(FAST_LIMIT)
    }

    pub fn fast_value(&self) -> Result<f32> {
        self.read_f32(FAST_VALUE)
    }

    /// PL1.
    pub fn slow_limit(&self) -> Result<f32> {
        self.read_f32(SLOW_LIMIT)
    }

    pub fn slow_value(&self) -> Result<f32> {
        self.read_f32(SLOW_VALUE)
    }

    pub fn core_temperature(&self, core: u32) -> Result<f32> {
        self.read_f32(core_temperature_offset(self.version, core)?)
    }

    pub fn apu_temperature(&self) -> Result<f32> {
        self.read_f32(apu_temperature_offset(self.version)?)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn known_and_unknown_versions() {
        assert_eq!(table_size(0x40_0005), 0x944);
        assert_eq!(table_size(0x38_0905), 0x5d0);
        assert_eq!(table_size(0x64_020c), 0x1028);
        assert_eq!(table_size(0x12_3456), DEFAULT_TABLE_SIZE);
        assert_eq!(table_size(0), DEFAULT_TABLE_SIZE);
    }

    #[test]
    fn core_temperature_layouts() {
        assert_eq!(core_temperature_offset(0x37_0002, 0).unwrap(), 0x340);
        assert_eq!(core_temperature_offset(0x37_0005, 3).unwrap(), 0x35c + 12);
        assert_eq!(core_temperature_offset(0x38_0905, 7).unwrap(), 0x2f0 + 28);
        assert!(matches!(core_temperature_offset(0x38_0905, 8), Err(SmuError::Unsupported)));
        assert!(matches!(core_temperature_offset(0x3f_0000, 4), Err(SmuError::Unsupported)));
        assert!(matches!(core_temperature_offset(0x54_0005, 0), Err(SmuError::Unsupported)));
    }

    #[test]
    fn apu_temperature_layouts() {
        assert_eq!(apu_temperature_offset(0x45_0005).unwrap(), 0x5c);
        assert!(matches!(apu_temperature_offset(0x4c_0005), Err(SmuError::Unsupported)));
    }

    #[test]
    fn typed_reads() {
        let mut table = PmTable::new(0x1000, 0x37_0005, table_size(0x37_0005)).unwrap();
        LittleEndian::write_f32(&mut table.bytes_mut()[FAST_LIMIT..], 54.0);
        LittleEndian::write_f32(&mut table.bytes_mut()[SLOW_LIMIT..], 45.0);
        LittleEndian::write_f32(&mut table.bytes_mut()[0x35c + 4..], 61.5);
        LittleEndian::write_f32(&mut table.bytes_mut()[0x5c..], 48.25);

        assert_eq!(table.fast_limit().unwrap(), 54.0);
        assert_eq!(table.slow_limit().unwrap(), 45.0);
        assert_eq!(table.stapm_value().unwrap(), 0.0);
        assert_eq!(table.core_temperature(1).unwrap(), 61.5);
        assert_eq!(table.apu_temperature().unwrap(), 48.25);
    }

    #[test]
    fn copy_needs_room() {
        let table = PmTable::new(0, 0, 16).unwrap();
        let mut small = [0u8; 8];
        assert!(matches!(table.copy_to(&mut small), Err(SmuError::InsufficientBuffer)));
        let mut large = [0xffu8; 32];
        assert_eq!(table.copy_to(&mut large).unwrap(), 16);
        assert_eq!(large[15], 0);
        assert_eq!(large[16], 0xff);
    }

    proptest! {
        #[test]
        fn reads_never_leave_the_buffer(size in 0usize..64, offset in 0usize..128) {
            let table = PmTable::new(0, 0, size).unwrap();
            let result = table.read_f32(offset);
            if offset + 4 <= size {
                prop_assert!(result.is_ok());
            } else {
                prop_assert!(matches!(result, Err(SmuError::InvalidArgument)));
            }
        }
    }
}

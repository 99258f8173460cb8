// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

use std::{fmt, io, mem};

use serde::{Serialize, Serializer};

use crate::{Error, Result};

/// Bytes in an [`AffinityMask`].
pub const MASK_SETSIZE: usize = 64;
/// Logical processors an [`AffinityMask`] can describe.
pub const MASK_MAX_CPUS: usize = MASK_SETSIZE * 8;

/// Set of logical processors, one bit per processor index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffinityMask([u8; MASK_SETSIZE]);

impl Default for AffinityMask {
    fn default() -> Self {
        AffinityMask([0; MASK_SETSIZE])
    }
}

impl AffinityMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices beyond [`MASK_MAX_CPUS`] are ignored.
    pub fn set(&mut self, cpu: usize) {
        if let Some(byte) = self.0.get_mut(cpu / 8) {
            *byte |= 1 << (cpu % 8);
        }
    }

    pub fn clear(&mut self, cpu: usize) {
        if let Some(byte) = self.0.get_mut(cpu / 8) {
            *byte &= !(1 << (cpu % 8));
        }
    }

    pub fn get(&self, cpu: usize) -> bool {
        self.0
            .get(cpu / 8)
            .is_some_and(|byte| byte & (1 << (cpu % 8)) != 0)
    }

    pub fn count(&self) -> usize {
        self.0.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn intersects(&self, other: &AffinityMask) -> bool {
        self.0.iter().zip(other.0.iter()).any(|(a, b)| a & b != 0)
    }

    /// Set processor indices in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MASK_MAX_CPUS).filter(|cpu| self.get(*cpu))
    }

    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }
}

/// Upper-case hex, most significant byte first. Leading zero bytes are
/// skipped, but the four lowest bytes are always printed.
impl fmt::Display for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut printing = false;
        for (index, byte) in self.0.iter().enumerate().rev() {
            if printing || index < 4 || *byte != 0 {
                printing = true;
                write!(f, "{byte:02X}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AffinityMask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AffinityMask({self})")
    }
}

impl Serialize for AffinityMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Number of online logical processors.
pub fn processor_count() -> Result<usize> {
    // SAFETY: sysconf has no memory safety requirements.
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if count < 1 {
        return Err(Error::ProcessorCount(io::Error::last_os_error()));
    }
    Ok(count as usize)
}

fn current_affinity() -> Result<libc::cpu_set_t> {
    // SAFETY: cpu_set_t is a plain bit array for which all zeroes is valid.
    let mut set: libc::cpu_set_t = unsafe { mem::zeroed() };
    // SAFETY: the pointer and size describe the local set.
    let ret = unsafe { libc::sched_getaffinity(0, mem::size_of::<libc::cpu_set_t>(), &mut set) };
    if ret != 0 {
        return Err(Error::Affinity(io::Error::last_os_error()));
    }
    Ok(set)
}

fn set_affinity(set: &libc::cpu_set_t) -> io::Result<()> {
    // SAFETY: the pointer and size describe a valid, initialized set.
    let ret = unsafe { libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), set) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Pins the calling thread to one logical processor for the lifetime of the
/// guard. The previous affinity is restored on drop.
pub struct ScopedAffinity {
    saved: libc::cpu_set_t,
}

impl ScopedAffinity {
    pub fn pin(cpu: usize) -> Result<Self> {
        let saved = current_affinity()?;
        // SAFETY: the index is checked against the set size before the lookup.
        if cpu >= libc::CPU_SETSIZE as usize || !unsafe { libc::CPU_ISSET(cpu, &saved) } {
            return Err(Error::AffinityUnavailable(cpu));
        }

        // SAFETY: as above, all zeroes is a valid set.
        let mut target: libc::cpu_set_t = unsafe { mem::zeroed() };
        // SAFETY: cpu is below CPU_SETSIZE.
        unsafe {
            libc::CPU_ZERO(&mut target);
            libc::CPU_SET(cpu, &mut target);
        }
        set_affinity(&target).map_err(Error::Affinity)?;
        Ok(ScopedAffinity { saved })
    }
}

impl Drop for ScopedAffinity {
    fn drop(&mut self) {
        if let Err(e) = set_affinity(&self.saved) {
            warn!("Failed to restore thread affinity: {e}");
        }
    }
}

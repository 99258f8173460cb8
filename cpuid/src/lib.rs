// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! x86 processor identification
//!
//! Captures raw CPUID dumps per logical processor, decodes them into a
//! [`ProcessorIdentity`], resolves a microarchitecture codename and groups
//! the logical processors of the system by purpose.
//!

#[macro_use]
extern crate log;

pub mod affinity;
mod cache;
pub mod codename;
mod decode;
mod features;
mod hypervisor;
pub mod raw;
pub mod topology;
mod vendor;

use std::io;

pub use affinity::AffinityMask;
pub use cache::{CacheInfo, CacheLevel, Caches};
pub use codename::{Classification, MatchPolicy};
pub use decode::{decode, identify, Architecture, ProcessorIdentity};
pub use features::CpuFeatures;
pub use hypervisor::Hypervisor;
pub use raw::{acquire_sample, CpuidLeaf, CpuidReg, RawProcessorSample, SampleBuilder};
pub use topology::{build_topology, CpuPurpose, SystemTopology};
pub use vendor::Vendor;
use thiserror::Error;

#[derive(Error, Debug)]
///
///
pub enum Error {
    ///
    /// The CPUID instruction is not available
    ///
    #[error("CPUID instruction is not supported")]
    UnsupportedInstruction,
    ///
    /// The logical processor is outside the allowed affinity set
    ///
    #[error("Logical CPU {0} is not available for affinity pinning")]
    AffinityUnavailable(usize),
    ///
    /// The vendor signature matches no known vendor
    ///
    #[error("Unknown CPU vendor signature {0:?}")]
    UnknownVendor(String),
    ///
    /// Not even the first logical processor could be sampled
    ///
    #[error("No processor could be identified")]
    NoProcessor,
    ///
    /// The operating system did not report a processor count
    ///
    #[error("Failed to query the number of processors: {0}")]
    ProcessorCount(#[source] io::Error),
    ///
    /// Reading or changing the thread affinity failed
    ///
    #[error("Failed to change thread affinity: {0}")]
    Affinity(#[source] io::Error),
}

///
/// Result type for returning from a function
///
pub type Result<T> = std::result::Result<T, Error>;

/// Extracts bits `hi..=lo` of a CPUID register.
pub(crate) fn bits(value: u32, hi: u32, lo: u32) -> u32 {
    let width = hi - lo + 1;
    if width >= 32 {
        value
    } else {
        (value >> lo) & ((1u32 << width) - 1)
    }
}

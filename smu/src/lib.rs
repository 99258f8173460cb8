// Copyright © 2019 Intel Corporation
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Client for the AMD System Management Unit mailboxes
//!
//! The SMU is reached through the SMN index/data pair of the host bridge.
//! A session resolves the platform codename, the mailbox addresses and the
//! firmware version, and can then pull the power management table into a
//! local buffer.
//!
//! # Mailboxes
//!
//! - RSMU
//! - MP1
//! - HSMP (server and desktop parts from Matisse on)
//!

#[macro_use]
extern crate log;

/// Platform codenames and the per-platform command tables
pub mod codename;

/// SMN access and the command protocol
pub mod mailbox;

/// Firmware simulator for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Power management table layouts
pub mod pm_table;

/// Session state machine
mod session;

pub use codename::SmuCodename;
pub use mailbox::{Args, MailboxKind, DEFAULT_MAX_RETRIES};
pub use pm_table::PmTable;
pub use session::{format_version, SmuConfig, SmuSession};
use thiserror::Error;

#[derive(Error, Debug)]
///
///
pub enum SmuError {
    ///
    /// The firmware reported a generic failure, or an SMN read returned all ones
    ///
    #[error("Failed")]
    Failed,
    ///
    /// The firmware does not know the function id
    ///
    #[error("Unknown Command")]
    UnknownCmd,
    ///
    /// The firmware refused the command because a prerequisite is unmet
    ///
    #[error("Command Rejected - Prerequisite Unmet")]
    RejectedPrereq,
    ///
    /// The firmware is busy
    ///
    #[error("Command Rejected - Busy")]
    RejectedBusy,
    ///
    /// The response register did not become ready within the retry cap
    ///
    #[error("Command Timed Out")]
    CmdTimeout,
    ///
    /// The platform has no such mailbox, command or table layout
    ///
    #[error("Unsupported Platform or Feature")]
    Unsupported,
    ///
    /// The privileged access layer failed
    ///
    #[error("Driver Communication Error: {0}")]
    DriverError(#[source] hwaccess::Error),
    ///
    /// The processor is not a known SMU platform
    ///
    #[error("CPU Not Supported")]
    CpuNotSupported,
    ///
    /// The power management table has not been set up
    ///
    #[error("Library Not Initialized")]
    NotInitialized,
    ///
    /// Offset or index outside of the table
    ///
    #[error("Invalid Argument")]
    InvalidArgument,
    ///
    /// The table buffer could not be allocated
    ///
    #[error("Memory Mapping or Allocation Error")]
    MappingError,
    ///
    /// A caller supplied buffer is too small
    ///
    #[error("Insufficient Buffer")]
    InsufficientBuffer,
}

/// Status code of a completed command.
pub const STATUS_OK: u32 = 0x01;

impl SmuError {
    /// Numeric status code, as reported by the firmware or the driver.
    pub fn code(&self) -> u8 {
        match self {
            SmuError::Failed => 0xff,
            SmuError::UnknownCmd => 0xfe,
            SmuError::RejectedPrereq => 0xfd,
            SmuError::RejectedBusy => 0xfc,
            SmuError::CmdTimeout => 0xfb,
            SmuError::Unsupported => 0xf9,
            SmuError::DriverError(_) => 0xf6,
            SmuError::CpuNotSupported => 0xf5,
            SmuError::NotInitialized => 0xf4,
            SmuError::InvalidArgument => 0xf3,
            SmuError::MappingError => 0xf2,
            SmuError::InsufficientBuffer => 0xf1,
        }
    }

    /// Maps a non-OK response register value to an error.
    ///
    /// Values the firmware never documents collapse into `Failed`.
    pub fn from_response(status: u32) -> SmuError {
        match status {
            0xfe => SmuError::UnknownCmd,
            0xfd => SmuError::RejectedPrereq,
            0xfc => SmuError::RejectedBusy,
            _ => SmuError::Failed,
        }
    }
}

///
/// Result type for returning from a function
///
pub type Result<T> = std::result::Result<T, SmuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_and_messages() {
        let cases = [
            (SmuError::Failed, 0xff, "Failed"),
            (SmuError::UnknownCmd, 0xfe, "Unknown Command"),
            (SmuError::RejectedPrereq, 0xfd, "Command Rejected - Prerequisite Unmet"),
            (SmuError::RejectedBusy, 0xfc, "Command Rejected - Busy"),
            (SmuError::CmdTimeout, 0xfb, "Command Timed Out"),
            (SmuError::Unsupported, 0xf9, "Unsupported Platform or Feature"),
            (SmuError::CpuNotSupported, 0xf5, "CPU Not Supported"),
            (SmuError::NotInitialized, 0xf4, "Library Not Initialized"),
            (SmuError::InvalidArgument, 0xf3, "Invalid Argument"),
            (SmuError::MappingError, 0xf2, "Memory Mapping or Allocation Error"),
            (SmuError::InsufficientBuffer, 0xf1, "Insufficient Buffer"),
        ];
        for (err, code, message) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.to_string(), message);
        }

        let err = SmuError::DriverError(hwaccess::Error::Unsupported);
        assert_eq!(err.code(), 0xf6);
        assert!(err.to_string().starts_with("Driver Communication Error"));
    }

    #[test]
    fn firmware_status_mapping() {
        assert!(matches!(SmuError::from_response(0xfe), SmuError::UnknownCmd));
        assert!(matches!(SmuError::from_response(0xfd), SmuError::RejectedPrereq));
        assert!(matches!(SmuError::from_response(0xfc), SmuError::RejectedBusy));
        assert!(matches!(SmuError::from_response(0xff), SmuError::Failed));
        assert!(matches!(SmuError::from_response(0x42), SmuError::Failed));
    }
}

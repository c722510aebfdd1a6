// iio-source/src/errors.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//!
//! Error definitions for the IIO streaming source.

use std::ffi;
use thiserror::Error;

/// The Error type for the IIO source
#[derive(Error, Debug)]
pub enum Error {
    /// The requested device ID was not among the discovered devices.
    #[error("device not found: '{0}'")]
    NotFound(String),
    /// An operation was attempted in a state that does not allow it.
    #[error("{0}")]
    Precondition(&'static str),
    /// The bulk-transfer buffer could not be created or configured.
    #[error("buffer creation failed: {0}")]
    Resource(#[source] Box<Error>),
    /// Waiting for buffer readiness failed at the OS level.
    #[error("ppoll failed: {}", .0.desc())]
    Io(#[source] nix::Error),
    /// A refill returned a byte count that is not a whole number of scans.
    ///
    /// The hardware library never returns partial scans, so this is a bug
    /// in the collaborator rather than a recoverable condition.
    #[error("refill returned {bytes} bytes, not a multiple of the {step}-byte step")]
    PartialScan {
        /// Bytes returned from the refill
        bytes: usize,
        /// Bytes per scan across all enabled channels
        step: usize,
    },
    /// A channel delivered fewer samples from a refill than the refill
    /// holds, which would leave the ports out of step.
    #[error("channel '{channel}' read {samples} of {expected} samples")]
    ShortRead {
        /// The ID of the channel
        channel: String,
        /// Samples the channel delivered
        samples: usize,
        /// Samples in the refill
        expected: usize,
    },
    /// No control endpoint with the given name and kind is registered.
    #[error("no such endpoint: '{0}'")]
    NoSuchEndpoint(String),
    /// An unexpected NUL value returned from the C library.
    #[error("{0}")]
    NulError(#[from] ffi::NulError),
    /// A low-level Unix-style error
    #[error("{0}")]
    Nix(#[from] nix::Error),
    /// An error converting a value to/from a string representation.
    #[error("String conversion error")]
    StringConversionError,
    /// A device or channel index did not find a requested object
    #[error("Invalid index")]
    InvalidIndex,
    /// A generic error with a string explanation
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Determines if this is a fatal contract breach by the hardware
    /// collaborator, as opposed to an ordinary failure.
    pub fn is_contract_breach(&self) -> bool {
        matches!(self, Error::PartialScan { .. } | Error::ShortRead { .. })
    }
}

/// The default result type for the IIO source
pub type Result<T> = std::result::Result<T, Error>;

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

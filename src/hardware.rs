// iio-source/src/hardware.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The hardware collaborator.
//!
//! The source never talks to a kernel driver directly. Everything it needs
//! from the hardware library is captured by the traits in this module:
//! enumerating [`Device`]s from a [`Backend`], walking each device's
//! [`Channel`]s and attributes, and creating and refilling the per-device
//! [`Buffer`].
//!
//! Two implementations ship with the crate: the `libiio` wrapper in
//! [`crate::iio`] (behind the `libiio` feature), and the in-process
//! simulator in [`crate::sim`].
//!
//! Attribute values are opaque strings. Every read or write goes to the
//! hardware; nothing is cached on this side.

use std::{any::TypeId, fmt, os::unix::io::RawFd};

use crate::Result;

/// A source of IIO devices, such as a local or network context.
pub trait Backend {
    /// The type of device produced by this backend.
    type Device: Device;

    /// Gets all the devices currently known to the backend, in discovery
    /// order.
    fn devices(&self) -> Result<Vec<Self::Device>>;
}

/// An Industrial I/O device.
///
/// Handles are cheap to clone and refer to the same underlying device.
pub trait Device: Clone + fmt::Debug + 'static {
    /// The channel type of the device.
    type Channel: Channel<Buffer = Self::Buffer>;
    /// The buffer type created by the device.
    type Buffer: Buffer;

    /// Gets the device ID (e.g. <b><i>iio:device0</i></b>)
    fn id(&self) -> String;

    /// Gets the name of the device, if it has one.
    fn name(&self) -> Option<String>;

    /// Gets the names of the device-specific attributes, in order.
    fn attrs(&self) -> Vec<String>;

    /// Reads a device-specific attribute as a string
    fn attr_read_str(&self, attr: &str) -> Result<String>;

    /// Writes a device-specific attribute as a string
    fn attr_write_str(&self, attr: &str, val: &str) -> Result<()>;

    /// Gets the channels of the device, in discovery order.
    fn channels(&self) -> Vec<Self::Channel>;

    /// Creates a buffer for the device.
    ///
    /// `sample_count` The number of samples the buffer should hold
    /// `cyclic` Whether to enable cyclic mode
    fn create_buffer(&self, sample_count: usize, cyclic: bool) -> Result<Self::Buffer>;
}

/// A channel of an Industrial I/O device.
pub trait Channel: Clone + fmt::Debug + 'static {
    /// The buffer type that this channel reads from.
    type Buffer: Buffer;

    /// Retrieve the channel ID (e.g. <b><i>voltage0</i></b>)
    fn id(&self) -> String;

    /// Determines if this is an output channel.
    fn is_output(&self) -> bool;

    /// Determines if the channel is a scan element
    ///
    /// A scan element is a channel that can generate samples (for an
    /// input channel) or receive samples (for an output channel) after
    /// being enabled.
    fn is_scan_element(&self) -> bool;

    /// Gets the data format for the channel
    fn data_format(&self) -> DataFormat;

    /// Gets the names of the channel-specific attributes, in order.
    fn attrs(&self) -> Vec<String>;

    /// Reads a channel-specific attribute as a string
    fn attr_read_str(&self, attr: &str) -> Result<String>;

    /// Writes a channel-specific attribute as a string
    fn attr_write_str(&self, attr: &str, val: &str) -> Result<()>;

    /// Enable the channel
    ///
    /// Before creating a buffer, at least one channel of the device
    /// must be enabled.
    fn enable(&self);

    /// Disable the channel
    fn disable(&self);

    /// Determines if the channel is enabled
    fn is_enabled(&self) -> bool;

    /// Demultiplex and convert the channel's samples from the last refill
    /// into `dst`.
    ///
    /// At most `dst.len() / byte_length` samples are written. Returns the
    /// number of samples written.
    fn read(&self, buf: &Self::Buffer, dst: &mut [u8]) -> usize;
}

/// A device buffer for bulk transfers.
///
/// Dropping the buffer releases it in the hardware.
pub trait Buffer: fmt::Debug {
    /// Get the buffer capacity in number of samples from each channel.
    fn capacity(&self) -> usize;

    /// Gets a pollable file descriptor for the buffer.
    fn poll_fd(&self) -> Result<RawFd>;

    /// Make calls to [`Buffer::refill()`] blocking or not.
    fn set_blocking_mode(&self, blocking: bool) -> Result<()>;

    /// Fetch more samples from the hardware.
    ///
    /// Returns the number of bytes read.
    fn refill(&mut self) -> Result<usize>;

    /// Gets the number of bytes per sample across all the enabled scan
    /// channels of the buffer.
    fn step(&self) -> usize;
}

// --------------------------------------------------------------------------

/// The format of a data sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    /// Total length of the sample, in bits.
    pub length: u32,
    /// Length of valid data in the sample, in bits.
    pub bits: u32,
    /// Right-shift to apply when converting sample.
    pub shift: u32,
    /// Whether the sample is signed
    pub is_signed: bool,
    /// Whether the sample is in big-endian format
    pub is_big_endian: bool,
    /// Number of times length repeats
    pub repeat: u32,
}

impl DataFormat {
    /// Creates a format for a plain little-endian integer of the given
    /// width.
    pub fn integer(length: u32, is_signed: bool) -> Self {
        Self {
            length,
            bits: length,
            shift: 0,
            is_signed,
            is_big_endian: false,
            repeat: 1,
        }
    }

    /// The number of bytes required to hold a single sample from the channel.
    pub fn byte_length(&self) -> usize {
        let nbytes = (self.length / 8) * self.repeat.max(1);
        nbytes as usize
    }

    /// Gets the TypeId for a single sample from the channel.
    ///
    /// This will get the TypeId for a sample if it can fit into a standard
    /// integer type, signed or unsigned, of 8, 16, 32, or 64 bits.
    pub fn type_of(&self) -> Option<TypeId> {
        let nbytes = self.byte_length();

        if self.is_signed {
            match nbytes {
                1 => Some(TypeId::of::<i8>()),
                2 => Some(TypeId::of::<i16>()),
                4 => Some(TypeId::of::<i32>()),
                8 => Some(TypeId::of::<i64>()),
                _ => None,
            }
        }
        else {
            match nbytes {
                1 => Some(TypeId::of::<u8>()),
                2 => Some(TypeId::of::<u16>()),
                4 => Some(TypeId::of::<u32>()),
                8 => Some(TypeId::of::<u64>()),
                _ => None,
            }
        }
    }
}

/// Formats as a type name, like "int16" or "uint12x2".
impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_signed { "" } else { "u" };
        write!(f, "{}int{}", sign, self.length)?;
        if self.repeat > 1 {
            write!(f, "x{}", self.repeat)?;
        }
        Ok(())
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

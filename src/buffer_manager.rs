// iio-source/src/buffer_manager.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Lifecycle of the shared bulk-transfer buffer.
//!
//! A device has a single buffer, and all of its enabled scan channels are
//! captured into it together. Creating the buffer reserves it in the
//! hardware. At most one source per physical device may run with ports
//! enabled; this can't be checked here, and violating it leaves the
//! sources contending for the hardware. If the library itself refuses the
//! second reservation, that shows up as [`Error::Resource`].

use log::{debug, info};

use crate::{
    hardware::{Buffer, Channel, Device},
    Error, Result,
};

/// Owns the buffer for one source, if it has one.
#[derive(Debug)]
pub struct BufferManager<B> {
    buf: Option<B>,
    // Whether the channels were enabled by the last allocation
    enabled: bool,
}

impl<B> Default for BufferManager<B> {
    fn default() -> Self {
        Self {
            buf: None,
            enabled: false,
        }
    }
}

impl<B: Buffer> BufferManager<B> {
    /// Creates a manager with no buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the channels and, if streaming applies, creates the buffer.
    ///
    /// Every channel is enabled, scan element or not. A non-cyclic buffer
    /// of `capacity` samples is created in non-blocking mode only when at
    /// least one channel is a scan element and `ports_enabled` is set.
    /// Otherwise the manager holds no buffer, which is a normal state for
    /// an attribute-only source.
    ///
    /// Any buffer already held is released first. If the buffer can't be
    /// created or switched to non-blocking mode, nothing is left allocated
    /// and the channels are disabled again.
    pub fn allocate<D>(
        &mut self,
        dev: &D,
        channels: &[D::Channel],
        capacity: usize,
        ports_enabled: bool,
    ) -> Result<Option<&B>>
    where
        D: Device<Buffer = B>,
    {
        self.release(channels);

        let have_scan_elements = channels.iter().any(|c| c.is_scan_element());

        for chan in channels {
            chan.enable();
        }
        self.enabled = true;

        if !have_scan_elements || !ports_enabled {
            debug!(
                "No buffer for '{}' (scan elements: {}, ports: {})",
                dev.id(),
                have_scan_elements,
                ports_enabled
            );
            return Ok(None);
        }

        let buf = dev
            .create_buffer(capacity, false)
            .and_then(|buf| buf.set_blocking_mode(false).map(|_| buf));

        match buf {
            Ok(buf) => {
                info!(
                    "Created {}-sample buffer for '{}', step {} bytes",
                    capacity,
                    dev.id(),
                    buf.step()
                );
                self.buf = Some(buf);
                Ok(self.buf.as_ref())
            }
            Err(err) => {
                self.release(channels);
                Err(Error::Resource(Box::new(err)))
            }
        }
    }

    /// Destroys the buffer, if any, and disables the channels.
    ///
    /// This can be called any number of times. It does nothing if
    /// nothing is allocated.
    pub fn release<C: Channel>(&mut self, channels: &[C]) {
        if self.buf.take().is_some() {
            debug!("Released buffer");
        }
        if self.enabled {
            for chan in channels {
                chan.disable();
            }
            self.enabled = false;
        }
    }

    /// Determines if a buffer is held.
    pub fn is_allocated(&self) -> bool {
        self.buf.is_some()
    }

    /// Gets the buffer, if any.
    pub fn buffer(&self) -> Option<&B> {
        self.buf.as_ref()
    }

    /// Gets mutable access to the buffer, if any.
    pub fn buffer_mut(&mut self) -> Option<&mut B> {
        self.buf.as_mut()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

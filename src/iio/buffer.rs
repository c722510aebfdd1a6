// iio-source/src/iio/buffer.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Industrial I/O Buffers.
//!
//! A [`Buffer`] is always coupled to exactly one [`Device`], and it
//! captures every channel of that device that was enabled when it was
//! created. Buffers are dropped, and released in the hardware, when
//! their scope ends.

use std::os::unix::io::RawFd;

use super::{ffi, ssize_result, sys_result, Device};
use crate::{hardware, Result};

/// An Industrial I/O input buffer.
#[derive(Debug)]
pub struct Buffer {
    /// The underlying buffer from the C library
    pub(crate) buf: *mut ffi::iio_buffer,
    /// The buffer capacity (# samples from each channel)
    pub(crate) cap: usize,
    #[allow(dead_code)] // holds the device, and its context, alive for libiio safety.
    pub(crate) dev: Device,
}

impl hardware::Buffer for Buffer {
    fn capacity(&self) -> usize {
        self.cap
    }

    fn poll_fd(&self) -> Result<RawFd> {
        let ret = unsafe { ffi::iio_buffer_get_poll_fd(self.buf) };
        sys_result(ret, ret)
    }

    fn set_blocking_mode(&self, blocking: bool) -> Result<()> {
        let ret = unsafe { ffi::iio_buffer_set_blocking_mode(self.buf, blocking) };
        sys_result(ret, ())
    }

    fn refill(&mut self) -> Result<usize> {
        let ret = unsafe { ffi::iio_buffer_refill(self.buf) };
        ssize_result(ret as i64)
    }

    fn step(&self) -> usize {
        let step = unsafe { ffi::iio_buffer_step(self.buf) };
        step.max(0) as usize
    }
}

/// Destroy the underlying buffer when the object scope ends.
impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { ffi::iio_buffer_destroy(self.buf) }
    }
}

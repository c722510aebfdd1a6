// iio-source/src/iio/device.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Industrial I/O Devices
//!

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_uint},
};

use nix::errno::Errno;

use super::{cstring_opt, ffi, ssize_result, Buffer, Channel, Context, ATTR_BUF_SIZE};
use crate::{hardware, Error, Result};

/// An Industrial I/O Device
///
/// This can not be created directly. It is obtained from a context.
#[derive(Debug, Clone)]
pub struct Device {
    /// Pointer to the underlying IIO device object
    pub(crate) dev: *mut ffi::iio_device,
    /// Holds the context's lifetime for libiio safety.
    pub(crate) ctx: Context,
}

impl Device {
    /// Gets the context to which this device belongs
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }

    /// Gets the number of device-specific attributes
    pub fn num_attrs(&self) -> usize {
        let n = unsafe { ffi::iio_device_get_attrs_count(self.dev) };
        n as usize
    }

    /// Gets the name of the device-specific attribute at the index
    pub fn get_attr(&self, idx: usize) -> Result<String> {
        let pstr = unsafe { ffi::iio_device_get_attr(self.dev, idx as c_uint) };
        cstring_opt(pstr).ok_or(Error::InvalidIndex)
    }

    /// Gets the number of channels on the device
    pub fn num_channels(&self) -> usize {
        let n = unsafe { ffi::iio_device_get_channels_count(self.dev) };
        n as usize
    }

    /// Gets a channel by index
    pub fn get_channel(&self, idx: usize) -> Result<Channel> {
        let chan = unsafe { ffi::iio_device_get_channel(self.dev, idx as c_uint) };
        if chan.is_null() {
            return Err(Error::InvalidIndex);
        }
        Ok(Channel {
            chan,
            ctx: self.context(),
        })
    }
}

impl hardware::Device for Device {
    type Channel = Channel;
    type Buffer = Buffer;

    fn id(&self) -> String {
        let pstr = unsafe { ffi::iio_device_get_id(self.dev) };
        cstring_opt(pstr).unwrap_or_default()
    }

    fn name(&self) -> Option<String> {
        let pstr = unsafe { ffi::iio_device_get_name(self.dev) };
        cstring_opt(pstr)
    }

    fn attrs(&self) -> Vec<String> {
        (0..self.num_attrs())
            .filter_map(|i| self.get_attr(i).ok())
            .collect()
    }

    fn attr_read_str(&self, attr: &str) -> Result<String> {
        let mut buf = vec![0 as c_char; ATTR_BUF_SIZE];
        let attr = CString::new(attr)?;
        let ret = unsafe {
            ffi::iio_device_attr_read(self.dev, attr.as_ptr(), buf.as_mut_ptr(), buf.len())
        };
        ssize_result(ret as i64)?;
        let s = unsafe {
            CStr::from_ptr(buf.as_ptr())
                .to_str()
                .map_err(|_| Error::StringConversionError)?
        };
        Ok(s.into())
    }

    fn attr_write_str(&self, attr: &str, val: &str) -> Result<()> {
        let attr = CString::new(attr)?;
        let sval = CString::new(val)?;
        let ret = unsafe { ffi::iio_device_attr_write(self.dev, attr.as_ptr(), sval.as_ptr()) };
        ssize_result(ret as i64).map(|_| ())
    }

    fn channels(&self) -> Vec<Channel> {
        (0..self.num_channels())
            .filter_map(|i| self.get_channel(i).ok())
            .collect()
    }

    fn create_buffer(&self, sample_count: usize, cyclic: bool) -> Result<Buffer> {
        let buf = unsafe { ffi::iio_device_create_buffer(self.dev, sample_count, cyclic) };
        if buf.is_null() {
            return Err(Errno::last().into());
        }
        Ok(Buffer {
            buf,
            cap: sample_count,
            dev: self.clone(),
        })
    }
}

impl PartialEq for Device {
    /// Two devices are the same if they refer to the same underlying
    /// object in the library.
    fn eq(&self, other: &Device) -> bool {
        self.dev == other.dev
    }
}

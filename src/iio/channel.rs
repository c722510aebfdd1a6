// iio-source/src/iio/channel.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Industrial I/O Channels
//!

use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_uint, c_void},
};

use super::{cstring_opt, ffi, ssize_result, Buffer, Context, ATTR_BUF_SIZE};
use crate::{hardware, DataFormat, Error, Result};

/// An Industrial I/O Device Channel
#[derive(Debug, Clone)]
pub struct Channel {
    /// Pointer to the underlying IIO channel object
    pub(crate) chan: *mut ffi::iio_channel,
    #[allow(dead_code)] // looks like it's unused, but really it's holding the Device's lifetime for libiio safety.
    pub(crate) ctx: Context,
}

impl Channel {
    /// Gets the number of channel-specific attributes
    pub fn num_attrs(&self) -> usize {
        let n = unsafe { ffi::iio_channel_get_attrs_count(self.chan) };
        n as usize
    }

    /// Gets the channel-specific attribute at the index
    pub fn get_attr(&self, idx: usize) -> Result<String> {
        let pstr = unsafe { ffi::iio_channel_get_attr(self.chan, idx as c_uint) };
        cstring_opt(pstr).ok_or(Error::InvalidIndex)
    }
}

impl hardware::Channel for Channel {
    type Buffer = Buffer;

    fn id(&self) -> String {
        let pstr = unsafe { ffi::iio_channel_get_id(self.chan) };
        cstring_opt(pstr).unwrap_or_default()
    }

    fn is_output(&self) -> bool {
        unsafe { ffi::iio_channel_is_output(self.chan) }
    }

    fn is_scan_element(&self) -> bool {
        unsafe { ffi::iio_channel_is_scan_element(self.chan) }
    }

    fn data_format(&self) -> DataFormat {
        let fmt = unsafe { *ffi::iio_channel_get_data_format(self.chan) };
        DataFormat {
            length: u32::from(fmt.length),
            bits: u32::from(fmt.bits),
            shift: u32::from(fmt.shift),
            is_signed: fmt.is_signed,
            is_big_endian: fmt.is_be,
            repeat: u32::from(fmt.repeat),
        }
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
            ffi::iio_channel_attr_read(self.chan, attr.as_ptr(), buf.as_mut_ptr(), buf.len())
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
        let ret =
            unsafe { ffi::iio_channel_attr_write(self.chan, attr.as_ptr(), sval.as_ptr()) };
        ssize_result(ret as i64).map(|_| ())
    }

    fn enable(&self) {
        unsafe { ffi::iio_channel_enable(self.chan) };
    }

    fn disable(&self) {
        unsafe { ffi::iio_channel_disable(self.chan) };
    }

    fn is_enabled(&self) -> bool {
        unsafe { ffi::iio_channel_is_enabled(self.chan) }
    }

    fn read(&self, buf: &Buffer, dst: &mut [u8]) -> usize {
        let sz_item = self.data_format().byte_length();
        if sz_item == 0 {
            return 0;
        }
        let sz = unsafe {
            ffi::iio_channel_read(self.chan, buf.buf, dst.as_mut_ptr() as *mut c_void, dst.len())
        };
        sz / sz_item
    }
}

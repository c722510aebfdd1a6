// iio-source/src/iio/context.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Industrial I/O Contexts.
//!

use std::{ffi::CString, os::raw::c_uint, rc::Rc};

use nix::errno::Errno;

use super::{cstring_opt, ffi, Device};
use crate::{hardware, Error, Result};

/// An Industrial I/O Context
///
/// This maintains a reference counted pointer to the library's
/// `iio_context`. Once the Context and everything obtained from it have
/// been dropped, the underlying context is destroyed.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Rc<InnerContext>,
}

/// Holds the pointer to the C library context.
#[derive(Debug)]
struct InnerContext {
    ctx: *mut ffi::iio_context,
}

impl Drop for InnerContext {
    fn drop(&mut self) {
        unsafe { ffi::iio_context_destroy(self.ctx) };
    }
}

impl Context {
    /// Tries to create the default context from a local or remote IIO
    /// device, as selected by the `IIOD_REMOTE` environment variable.
    pub fn new() -> Result<Self> {
        let ctx = unsafe { ffi::iio_create_default_context() };
        Self::from_ptr(ctx)
    }

    /// Tries to create a context from the specified URI, such as
    /// "local:", "ip:192.168.2.1", or "usb:3.32.5".
    pub fn from_uri(uri: &str) -> Result<Self> {
        let uri = CString::new(uri)?;
        let ctx = unsafe { ffi::iio_create_context_from_uri(uri.as_ptr()) };
        Self::from_ptr(ctx)
    }

    fn from_ptr(ctx: *mut ffi::iio_context) -> Result<Self> {
        if ctx.is_null() {
            return Err(Errno::last().into());
        }
        Ok(Self {
            inner: Rc::new(InnerContext { ctx }),
        })
    }

    /// Get a description of the context
    pub fn description(&self) -> String {
        let pstr = unsafe { ffi::iio_context_get_description(self.inner.ctx) };
        cstring_opt(pstr).unwrap_or_default()
    }

    /// Get the number of devices in the context
    pub fn num_devices(&self) -> usize {
        let n = unsafe { ffi::iio_context_get_devices_count(self.inner.ctx) };
        n as usize
    }

    /// Gets a device by index
    pub fn get_device(&self, idx: usize) -> Result<Device> {
        let dev = unsafe { ffi::iio_context_get_device(self.inner.ctx, idx as c_uint) };
        if dev.is_null() {
            return Err(Error::InvalidIndex);
        }
        Ok(Device {
            dev,
            ctx: self.clone(),
        })
    }

    /// Gets an iterator for all the devices in the context.
    pub fn device_iter(&self) -> DeviceIterator {
        DeviceIterator { ctx: self, idx: 0 }
    }
}

impl hardware::Backend for Context {
    type Device = Device;

    fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.device_iter().collect())
    }
}

impl PartialEq for Context {
    /// Two contexts are the same if they refer to the same underlying
    /// object in the library.
    fn eq(&self, other: &Context) -> bool {
        self.inner.ctx == other.inner.ctx
    }
}

/// Iterator over the Devices in a Context
#[derive(Debug)]
pub struct DeviceIterator<'a> {
    ctx: &'a Context,
    idx: usize,
}

impl<'a> Iterator for DeviceIterator<'a> {
    type Item = Device;

    fn next(&mut self) -> Option<Self::Item> {
        match self.ctx.get_device(self.idx) {
            Ok(dev) => {
                self.idx += 1;
                Some(dev)
            }
            Err(_) => None,
        }
    }
}

// iio-source/src/iio/mod.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Industrial I/O hardware through _libiio_.
//!
//! These are thin wrappers around the C library objects that implement
//! the [hardware traits](crate::hardware). A [`Context`] is the
//! [`Backend`](crate::hardware::Backend); its devices, channels, and
//! buffers hold a reference-counted handle to it, so the underlying
//! `iio_context` lives as long as anything obtained from it.
//!
//! Since IIO doesn't provide any thread safety guarantees, none of these
//! objects are `Send` or `Sync`.

use std::{
    ffi::{CStr, CString},
    fmt,
    os::raw::{c_char, c_uint},
    slice, str,
};

use libiio_sys::{self as ffi};
use nix::errno::{self, Errno};

use crate::Result;

pub use self::buffer::*;
pub use self::channel::*;
pub use self::context::*;
pub use self::device::*;

mod buffer;
mod channel;
mod context;
mod device;

/// According to the IIO samples, internal buffers need to be big enough
/// for attributes coming back from the kernel.
const ATTR_BUF_SIZE: usize = 16384;

// --------------------------------------------------------------------------

/// Gets an optional string value from a C const char pointer.
/// If the pointer is NULL, this returns `None` otherwise it converts the
/// string and returns it.
fn cstring_opt(pstr: *const c_char) -> Option<String> {
    if pstr.is_null() {
        None
    }
    else {
        let name = unsafe { CStr::from_ptr(pstr) };
        Some(name.to_str().unwrap_or_default().to_string())
    }
}

pub(crate) fn sys_result<T>(ret: i32, result: T) -> Result<T> {
    if ret < 0 {
        Err(errno::from_i32(-ret).into())
    }
    else {
        Ok(result)
    }
}

/// Converts an `ssize_t` return into a byte count or an errno.
///
/// The value is widened, never truncated, before the sign check.
pub(crate) fn ssize_result(ret: i64) -> Result<usize> {
    if ret < 0 {
        Err(Errno::from_i32((-ret) as i32).into())
    }
    else {
        Ok(ret as usize)
    }
}

// --------------------------------------------------------------------------

/// A struct to hold version numbers
#[derive(Debug, PartialEq, Eq)]
pub struct Version {
    /// The Major version number
    pub major: u32,
    /// The Minor version number
    pub minor: u32,
    /// The git tag for the release
    pub git_tag: String,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} tag: {}", self.major, self.minor, self.git_tag)
    }
}

/// Gets the library version as (Major, Minor, Git Tag)
pub fn library_version() -> Version {
    let mut major: c_uint = 0;
    let mut minor: c_uint = 0;

    const BUF_SZ: usize = 8;
    let mut buf = vec![' ' as c_char; BUF_SZ];
    let pbuf = buf.as_mut_ptr();

    unsafe { ffi::iio_library_get_version(&mut major, &mut minor, pbuf) };

    // The tag may fill the buffer without a terminating NUL
    let git_tag = if buf.contains(&0) {
        unsafe { CStr::from_ptr(pbuf) }.to_string_lossy().into_owned()
    }
    else {
        let bytes = unsafe { slice::from_raw_parts(pbuf as *const u8, BUF_SZ) };
        str::from_utf8(bytes)
            .ok()
            .and_then(|s| CString::new(s).ok())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    Version {
        major: major as u32,
        minor: minor as u32,
        git_tag,
    }
}

// --------------------------------------------------------------------------

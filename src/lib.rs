// iio-source/src/lib.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//!
//! A streaming source for Linux Industrial I/O devices.
//!
//! This crate forwards the input channels of an IIO device, such as an
//! A/D converter, to a set of output sample streams that are pulled by an
//! external, cooperative scheduler. The channels, attributes and sample
//! types of the device aren't known until it is discovered, so the source
//! builds its control surface and its output ports at runtime:
//!
//! - Each device and channel attribute becomes a pair of named get/set
//!   endpoints in a [`ControlTable`].
//! - Each input channel that is a scan element becomes an [`OutputPort`]
//!   named by the channel ID.
//! - Each scheduler tick runs one [`work()`](IioSource::work) cycle: wait
//!   for the device buffer with a bounded timeout, refill it, and
//!   demultiplex the same number of samples into every port.
//!
//! The hardware is reached through the traits in [`hardware`]. The
//! `libiio` feature provides an implementation on top of _libiio_, and
//! [`sim`] provides a simulated device for testing.
//!
//! For more information, see:
//!
//!   [IIO Wiki](https://wiki.analog.com/software/linux/docs/iio/iio)
//!
//!   [libiio Wiki](https://wiki.analog.com/resources/tools-software/linux-software/libiio)
//!

// Lints
#![deny(
    missing_docs,
    missing_debug_implementations,
    unstable_features,
    unused_import_braces
)]
#![warn(missing_copy_implementations, unused_qualifications)]

pub use crate::channel_set::*;
pub use crate::errors::*;
pub use crate::hardware::*;
pub use crate::port::*;
pub use crate::projection::*;
pub use crate::source::*;
pub use crate::stream::*;

pub mod buffer_manager;
pub mod channel_set;
pub mod errors;
pub mod hardware;
pub mod port;
pub mod projection;
pub mod sim;
pub mod source;
pub mod stream;

#[cfg(feature = "libiio")]
pub mod iio;

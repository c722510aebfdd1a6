// iio-source/src/port.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Output ports and per-tick scheduling information.

use std::time::Duration;

use crate::hardware::DataFormat;

/// What the scheduler grants the source for one work tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkInfo {
    /// The longest the tick may wait for data.
    pub max_timeout: Duration,
    /// The minimum free space, in elements, across all the output ports.
    pub min_out_elements: usize,
}

impl WorkInfo {
    /// Creates scheduling info for a tick.
    pub fn new(max_timeout: Duration, min_out_elements: usize) -> Self {
        Self {
            max_timeout,
            min_out_elements,
        }
    }

    /// Creates scheduling info from a timeout in nanoseconds.
    pub fn from_nanos(max_timeout_ns: u64, min_out_elements: usize) -> Self {
        Self::new(Duration::from_nanos(max_timeout_ns), min_out_elements)
    }
}

// --------------------------------------------------------------------------

/// A typed output stream for one channel.
///
/// Samples are produced in place, directly into the port's storage, in
/// the channel's native format. The host drains them with
/// [`OutputPort::consume()`] or [`OutputPort::take()`].
#[derive(Debug)]
pub struct OutputPort {
    name: String,
    format: DataFormat,
    data: Vec<u8>,
    capacity: usize,
    total: u64,
}

impl OutputPort {
    /// Creates an empty port that can hold `capacity` elements.
    pub fn new(name: &str, format: DataFormat, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            format,
            data: Vec::new(),
            capacity,
            total: 0,
        }
    }

    /// Gets the name of the port, which is the ID of its channel.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets the format of the elements in the port.
    pub fn format(&self) -> DataFormat {
        self.format
    }

    /// Gets the number of elements the port can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gets the number of elements waiting to be consumed.
    pub fn elements(&self) -> usize {
        match self.format.byte_length() {
            0 => 0,
            n => self.data.len() / n,
        }
    }

    /// Gets the number of elements that can be produced before the port
    /// is full.
    pub fn free(&self) -> usize {
        self.capacity.saturating_sub(self.elements())
    }

    /// Gets the total number of elements ever produced into the port.
    pub fn total_produced(&self) -> u64 {
        self.total
    }

    /// Gets the raw bytes of the waiting elements.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Removes `n` elements from the front of the port.
    pub fn consume(&mut self, n: usize) {
        let nbytes = (n * self.format.byte_length()).min(self.data.len());
        self.data.drain(..nbytes);
    }

    /// Removes and returns all the waiting elements.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Produces up to `max` elements in place.
    ///
    /// The closure gets room for `max` elements at the end of the port,
    /// but never more than the port has free, and returns how many it
    /// filled. Returns the number produced.
    pub(crate) fn produce_with<F>(&mut self, max: usize, fill: F) -> usize
    where
        F: FnOnce(&mut [u8]) -> usize,
    {
        let max = max.min(self.free());
        let size = self.format.byte_length();
        let start = self.data.len();
        self.data.resize(start + max * size, 0);

        let n = fill(&mut self.data[start..]).min(max);
        self.data.truncate(start + n * size);
        self.total += n as u64;
        n
    }

    /// Withdraws the `n` most recently produced elements.
    pub(crate) fn retract(&mut self, n: usize) {
        let n = n.min(self.elements());
        let len = self.data.len() - n * self.format.byte_length();
        self.data.truncate(len);
        self.total -= n as u64;
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_info_from_nanos() {
        let info = WorkInfo::from_nanos(1_500_000_000, 64);
        assert_eq!(info.max_timeout, Duration::from_millis(1500));
        assert_eq!(info.min_out_elements, 64);
    }

    #[test]
    fn produce_and_consume() {
        let mut port = OutputPort::new("voltage0", DataFormat::integer(16, false), 8);
        assert_eq!(port.free(), 8);

        let n = port.produce_with(4, |dst| {
            assert_eq!(dst.len(), 8);
            dst[..6].copy_from_slice(&[1, 0, 2, 0, 3, 0]);
            3
        });
        assert_eq!(n, 3);
        assert_eq!(port.elements(), 3);
        assert_eq!(port.free(), 5);
        assert_eq!(port.as_bytes(), &[1, 0, 2, 0, 3, 0]);

        port.consume(1);
        assert_eq!(port.as_bytes(), &[2, 0, 3, 0]);
        assert_eq!(port.take(), vec![2, 0, 3, 0]);
        assert_eq!(port.elements(), 0);
        assert_eq!(port.total_produced(), 3);
    }

    #[test]
    fn produce_stops_at_capacity() {
        let mut port = OutputPort::new("voltage0", DataFormat::integer(16, false), 4);
        assert_eq!(port.produce_with(3, |dst| dst.len() / 2), 3);

        let n = port.produce_with(3, |dst| {
            assert_eq!(dst.len(), 2);
            1
        });
        assert_eq!(n, 1);
        assert_eq!(port.elements(), port.capacity());
        assert_eq!(port.produce_with(3, |dst| dst.len() / 2), 0);
    }

    #[test]
    fn retract_recent() {
        let mut port = OutputPort::new("voltage0", DataFormat::integer(16, false), 8);
        port.produce_with(3, |dst| {
            dst.copy_from_slice(&[1, 0, 2, 0, 3, 0]);
            3
        });
        port.retract(2);
        assert_eq!(port.as_bytes(), &[1, 0]);
        assert_eq!(port.total_produced(), 1);
    }

    #[test]
    fn produce_nothing() {
        let mut port = OutputPort::new("voltage0", DataFormat::integer(32, true), 8);
        assert_eq!(port.produce_with(0, |dst| dst.len()), 0);
        assert!(port.as_bytes().is_empty());
    }
}

// iio-source/src/sim.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Simulated Industrial I/O hardware.
//!
//! This is an in-process implementation of the [hardware
//! traits](crate::hardware) that needs no kernel driver or library. It is
//! used by the unit tests and by the `riio_source` utility's `--sim` mode.
//!
//! Each [`SimBuffer`] owns a non-blocking pipe. Its read end is the
//! buffer's pollable file descriptor, and the buffer becomes readable each
//! time [`SimDevice::signal_ready()`] is called, one refill per signal.
//! A refill generates a full buffer of samples for every enabled scan
//! channel. Sample `n` of the channel at position `p` in the device has
//! the value `n * (p + 1)`, truncated to the channel's width and stored
//! little-endian.

use std::{
    cell::{Cell, RefCell},
    os::unix::io::RawFd,
    rc::Rc,
};

use nix::{
    errno::Errno,
    fcntl::OFlag,
    unistd,
};

use crate::{
    hardware::{Backend, Buffer, Channel, DataFormat, Device},
    Error, Result,
};

// Far above any descriptor the process has open.
const STALE_FD: RawFd = RawFd::MAX;

/// A simulated context holding a fixed list of devices.
#[derive(Debug, Clone, Default)]
pub struct SimContext {
    devices: Vec<SimDevice>,
}

impl SimContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device to the context.
    pub fn with_device(mut self, dev: SimDevice) -> Self {
        self.devices.push(dev);
        self
    }
}

impl Backend for SimContext {
    type Device = SimDevice;

    fn devices(&self) -> Result<Vec<SimDevice>> {
        Ok(self.devices.clone())
    }
}

// --------------------------------------------------------------------------

/// Counters for the hardware calls made on a simulated device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimStats {
    /// The number of buffers successfully created.
    pub buffers_created: usize,
    /// The number of buffers currently alive.
    pub live_buffers: usize,
    /// The number of refill calls on any buffer.
    pub refills: usize,
    /// The number of times a buffer's poll descriptor was requested.
    pub poll_fd_requests: usize,
}

#[derive(Debug)]
struct DeviceState {
    id: String,
    name: Option<String>,
    attrs: Vec<(String, String)>,
    channels: Vec<SimChannel>,
    fail_buffer: bool,
    forced_refill: Option<usize>,
    refill_error: Option<Errno>,
    poll_fd_error: Option<Errno>,
    stale_poll_fd: bool,
    // Write end of the live buffer's readiness pipe
    ready_fd: Option<RawFd>,
    stats: SimStats,
}

/// A simulated device.
///
/// Clones share the same underlying state, so a test can keep a handle
/// to inspect and poke the device after handing it to a context.
#[derive(Debug, Clone)]
pub struct SimDevice {
    inner: Rc<RefCell<DeviceState>>,
}

impl SimDevice {
    /// Creates a device with the specified ID and no attributes or channels.
    pub fn new(id: &str) -> Self {
        let state = DeviceState {
            id: id.to_string(),
            name: None,
            attrs: Vec::new(),
            channels: Vec::new(),
            fail_buffer: false,
            forced_refill: None,
            refill_error: None,
            poll_fd_error: None,
            stale_poll_fd: false,
            ready_fd: None,
            stats: SimStats::default(),
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Sets the device name.
    pub fn with_name(self, name: &str) -> Self {
        self.inner.borrow_mut().name = Some(name.to_string());
        self
    }

    /// Adds a device attribute with an initial value.
    pub fn with_attr(self, name: &str, val: &str) -> Self {
        self.inner
            .borrow_mut()
            .attrs
            .push((name.to_string(), val.to_string()));
        self
    }

    /// Removes a device attribute, as if the driver stopped exposing it.
    pub fn remove_attr(&self, name: &str) {
        self.inner.borrow_mut().attrs.retain(|(n, _)| n != name);
    }

    /// Adds a channel to the device.
    pub fn with_channel(self, chan: SimChannel) -> Self {
        {
            let mut state = self.inner.borrow_mut();
            chan.inner.borrow_mut().position = state.channels.len();
            state.channels.push(chan);
        }
        self
    }

    /// Finds a channel by ID.
    ///
    /// Input channels are preferred when an input and an output channel
    /// share the ID.
    pub fn find_channel(&self, id: &str) -> Option<SimChannel> {
        let state = self.inner.borrow();
        let mut chans = state.channels.iter().filter(|c| c.id() == id);
        let first = chans.next()?.clone();
        if first.is_output() {
            if let Some(input) = chans.find(|c| !c.is_output()) {
                return Some(input.clone());
            }
        }
        Some(first)
    }

    /// Makes subsequent buffer creation fail, or succeed again.
    pub fn fail_buffer_creation(&self, fail: bool) {
        self.inner.borrow_mut().fail_buffer = fail;
    }

    /// Makes the next refill report the given number of bytes rather than
    /// a full buffer.
    pub fn force_refill_bytes(&self, bytes: usize) {
        self.inner.borrow_mut().forced_refill = Some(bytes);
    }

    /// Makes the next refill fail with the given error, after it has
    /// consumed its readiness signal.
    pub fn fail_next_refill(&self, err: Errno) {
        self.inner.borrow_mut().refill_error = Some(err);
    }

    /// Makes requests for a buffer's poll descriptor fail, or succeed
    /// again with `None`.
    pub fn fail_poll_fd(&self, err: Option<Errno>) {
        self.inner.borrow_mut().poll_fd_error = err;
    }

    /// Makes buffers hand out a descriptor that isn't open, as if the
    /// driver had torn it down.
    pub fn stale_poll_fd(&self, stale: bool) {
        self.inner.borrow_mut().stale_poll_fd = stale;
    }

    /// Makes the live buffer readable for one refill.
    pub fn signal_ready(&self) -> Result<()> {
        let fd = self
            .inner
            .borrow()
            .ready_fd
            .ok_or_else(|| Error::General("no live buffer".into()))?;
        unistd::write(fd, &[1])?;
        Ok(())
    }

    /// Gets the current hardware call counters.
    pub fn stats(&self) -> SimStats {
        self.inner.borrow().stats
    }
}

impl Device for SimDevice {
    type Channel = SimChannel;
    type Buffer = SimBuffer;

    fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    fn name(&self) -> Option<String> {
        self.inner.borrow().name.clone()
    }

    fn attrs(&self) -> Vec<String> {
        self.inner
            .borrow()
            .attrs
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn attr_read_str(&self, attr: &str) -> Result<String> {
        read_attr(&self.inner.borrow().attrs, attr)
    }

    fn attr_write_str(&self, attr: &str, val: &str) -> Result<()> {
        write_attr(&mut self.inner.borrow_mut().attrs, attr, val)
    }

    fn channels(&self) -> Vec<SimChannel> {
        self.inner.borrow().channels.clone()
    }

    fn create_buffer(&self, sample_count: usize, cyclic: bool) -> Result<SimBuffer> {
        let mut state = self.inner.borrow_mut();

        if state.fail_buffer || state.stats.live_buffers > 0 {
            return Err(Errno::EBUSY.into());
        }
        if sample_count == 0 || cyclic {
            return Err(Errno::EINVAL.into());
        }

        let mut layout = Vec::new();
        let mut step = 0;
        for chan in state.channels.iter().filter(|c| !c.is_output()) {
            let ch = chan.inner.borrow();
            let size = ch.format.byte_length();
            if ch.scan && ch.enabled && size > 0 {
                layout.push(Slot {
                    id: ch.id.clone(),
                    position: ch.position,
                    offset: step,
                    size,
                });
                step += size;
            }
        }

        // The library refuses to create a buffer with nothing enabled.
        if layout.is_empty() {
            return Err(Errno::EINVAL.into());
        }

        let (rd, wr) = unistd::pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;

        state.ready_fd = Some(wr);
        state.stats.buffers_created += 1;
        state.stats.live_buffers += 1;

        Ok(SimBuffer {
            dev: self.clone(),
            cap: sample_count,
            layout,
            step,
            data: Vec::new(),
            rd,
            wr,
            blocking: Cell::new(true),
            total: 0,
        })
    }
}

fn read_attr(attrs: &[(String, String)], attr: &str) -> Result<String> {
    attrs
        .iter()
        .find(|(name, _)| name == attr)
        .map(|(_, val)| val.clone())
        .ok_or_else(|| Errno::ENOENT.into())
}

fn write_attr(attrs: &mut [(String, String)], attr: &str, val: &str) -> Result<()> {
    let entry = attrs
        .iter_mut()
        .find(|(name, _)| name == attr)
        .ok_or(Errno::ENOENT)?;
    entry.1 = val.to_string();
    Ok(())
}

// --------------------------------------------------------------------------

#[derive(Debug)]
struct ChannelState {
    id: String,
    output: bool,
    scan: bool,
    format: DataFormat,
    attrs: Vec<(String, String)>,
    enabled: bool,
    position: usize,
    read_limit: Option<usize>,
}

/// A simulated device channel.
#[derive(Debug, Clone)]
pub struct SimChannel {
    inner: Rc<RefCell<ChannelState>>,
}

impl SimChannel {
    /// Creates an input scan-element channel with the given sample format.
    pub fn new(id: &str, format: DataFormat) -> Self {
        let state = ChannelState {
            id: id.to_string(),
            output: false,
            scan: true,
            format,
            attrs: Vec::new(),
            enabled: false,
            position: 0,
            read_limit: None,
        };
        Self {
            inner: Rc::new(RefCell::new(state)),
        }
    }

    /// Makes this an output channel.
    pub fn output(self) -> Self {
        self.inner.borrow_mut().output = true;
        self
    }

    /// Makes this a channel that is only accessible through attributes.
    pub fn attribute_only(self) -> Self {
        self.inner.borrow_mut().scan = false;
        self
    }

    /// Adds a channel attribute with an initial value.
    pub fn with_attr(self, name: &str, val: &str) -> Self {
        self.inner
            .borrow_mut()
            .attrs
            .push((name.to_string(), val.to_string()));
        self
    }

    /// Caps the number of samples each read delivers, as a misbehaving
    /// driver might.
    pub fn limit_reads(&self, limit: Option<usize>) {
        self.inner.borrow_mut().read_limit = limit;
    }

    /// The value the simulator generates for sample `n` of this channel.
    pub fn sample_value(&self, n: u64) -> u64 {
        let ch = self.inner.borrow();
        let val = n.wrapping_mul(ch.position as u64 + 1);
        match ch.format.byte_length() {
            nbytes @ 1..=7 => val & ((1u64 << (8 * nbytes)) - 1),
            _ => val,
        }
    }
}

impl Channel for SimChannel {
    type Buffer = SimBuffer;

    fn id(&self) -> String {
        self.inner.borrow().id.clone()
    }

    fn is_output(&self) -> bool {
        self.inner.borrow().output
    }

    fn is_scan_element(&self) -> bool {
        self.inner.borrow().scan
    }

    fn data_format(&self) -> DataFormat {
        self.inner.borrow().format
    }

    fn attrs(&self) -> Vec<String> {
        self.inner
            .borrow()
            .attrs
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn attr_read_str(&self, attr: &str) -> Result<String> {
        read_attr(&self.inner.borrow().attrs, attr)
    }

    fn attr_write_str(&self, attr: &str, val: &str) -> Result<()> {
        write_attr(&mut self.inner.borrow_mut().attrs, attr, val)
    }

    fn enable(&self) {
        self.inner.borrow_mut().enabled = true;
    }

    fn disable(&self) {
        self.inner.borrow_mut().enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }

    fn read(&self, buf: &SimBuffer, dst: &mut [u8]) -> usize {
        let id = self.id();
        let slot = match buf.layout.iter().find(|s| s.id == id) {
            Some(slot) => slot,
            None => return 0,
        };

        let avail = buf.data.len() / buf.step;
        let mut n = avail.min(dst.len() / slot.size);
        if let Some(limit) = self.inner.borrow().read_limit {
            n = n.min(limit);
        }

        for (i, out) in dst.chunks_exact_mut(slot.size).take(n).enumerate() {
            let start = i * buf.step + slot.offset;
            out.copy_from_slice(&buf.data[start..start + slot.size]);
        }
        n
    }
}

// --------------------------------------------------------------------------

// Placement of one enabled channel within a scan.
#[derive(Debug)]
struct Slot {
    id: String,
    position: usize,
    offset: usize,
    size: usize,
}

/// A simulated device buffer.
#[derive(Debug)]
pub struct SimBuffer {
    dev: SimDevice,
    cap: usize,
    layout: Vec<Slot>,
    step: usize,
    data: Vec<u8>,
    rd: RawFd,
    wr: RawFd,
    blocking: Cell<bool>,
    // Samples generated per channel so far
    total: u64,
}

impl SimBuffer {
    /// Determines if refills block until data is available.
    pub fn is_blocking(&self) -> bool {
        self.blocking.get()
    }

    /// Consumes one readiness token from the pipe, if any.
    fn take_token(&self) -> Result<bool> {
        let mut tok = [0u8; 1];
        match unistd::read(self.rd, &mut tok) {
            Ok(n) => Ok(n > 0),
            Err(Errno::EAGAIN) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

impl Buffer for SimBuffer {
    fn capacity(&self) -> usize {
        self.cap
    }

    fn poll_fd(&self) -> Result<RawFd> {
        let mut state = self.dev.inner.borrow_mut();
        state.stats.poll_fd_requests += 1;
        if let Some(err) = state.poll_fd_error {
            return Err(err.into());
        }
        Ok(if state.stale_poll_fd { STALE_FD } else { self.rd })
    }

    fn set_blocking_mode(&self, blocking: bool) -> Result<()> {
        self.blocking.set(blocking);
        Ok(())
    }

    fn refill(&mut self) -> Result<usize> {
        self.dev.inner.borrow_mut().stats.refills += 1;

        if !self.take_token()? && !self.blocking.get() {
            return Err(Errno::EAGAIN.into());
        }
        if let Some(err) = self.dev.inner.borrow_mut().refill_error.take() {
            return Err(err.into());
        }

        let forced = self.dev.inner.borrow_mut().forced_refill.take();
        let bytes = forced.unwrap_or(self.cap * self.step);
        let nsamples = bytes / self.step;

        let chans = self.dev.channels();
        self.data.clear();
        self.data.resize(bytes, 0);

        for i in 0..nsamples {
            let n = self.total + i as u64;
            for slot in &self.layout {
                let val = chans[slot.position].sample_value(n);
                let start = i * self.step + slot.offset;
                let le = val.to_le_bytes();
                let len = slot.size.min(le.len());
                self.data[start..start + len].copy_from_slice(&le[..len]);
            }
        }
        self.total += nsamples as u64;
        Ok(bytes)
    }

    fn step(&self) -> usize {
        self.step
    }
}

/// Releases the simulated reservation and closes the pipe.
impl Drop for SimBuffer {
    fn drop(&mut self) {
        let _ = unistd::close(self.rd);
        let _ = unistd::close(self.wr);
        let mut state = self.dev.inner.borrow_mut();
        state.ready_fd = None;
        state.stats.live_buffers -= 1;
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

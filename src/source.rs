// iio-source/src/source.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The IIO source: an input device forwarded to output sample streams.
//!
//! An [`IioSource`] is driven by an external scheduler through four hooks:
//! construction, [`activate()`](IioSource::activate),
//! [`deactivate()`](IioSource::deactivate) and
//! [`work()`](IioSource::work). It moves through these states:
//!
//! ```text
//!  Unconfigured                     (no device; introspection only)
//!  Configured --activate--> Active --deactivate--> Idle
//!                             ^                     |
//!                             +------activate-------+
//! ```
//!
//! Only one source with ports enabled may be active per physical device,
//! since it reserves the device's buffer.

use std::fmt;

use log::{debug, info};

use crate::{
    buffer_manager::BufferManager,
    channel_set::ChannelSet,
    hardware::{Backend, Device},
    port::{OutputPort, WorkInfo},
    projection::ControlTable,
    stream::{self, WorkStatus},
    Error, Result,
};

/// The default number of samples obtained per refill.
pub const DFLT_BUFFER_SIZE: usize = 2048;

/// How many refills' worth of samples each output port holds.
const PORT_DEPTH: usize = 2;

/// The construction parameters for a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// The ID of the device. Empty for an introspection-only source.
    pub device_id: String,
    /// The IDs of the channels to use. Empty for all input channels.
    pub channel_ids: Vec<String>,
    /// Whether to create output ports and reserve the device buffer.
    pub enable_ports: bool,
    /// The number of samples to obtain per refill.
    pub buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            channel_ids: Vec::new(),
            enable_ports: true,
            buffer_size: DFLT_BUFFER_SIZE,
        }
    }
}

impl SourceConfig {
    /// Creates a default configuration for the device.
    pub fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            ..Self::default()
        }
    }

    /// Restricts the source to the specified channels.
    pub fn channel_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_ids = ids.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Enables or disables the output ports.
    pub fn enable_ports(mut self, on: bool) -> Self {
        self.enable_ports = on;
        self
    }

    /// Sets the number of samples per refill.
    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = n;
        self
    }
}

/// The lifecycle state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// No device is bound.
    Unconfigured,
    /// The device is discovered but not streaming.
    Configured,
    /// Activated; the buffer is held, if one applies.
    Active,
    /// Deactivated; the buffer is released.
    Idle,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// --------------------------------------------------------------------------

/// A source that streams the input channels of one device.
#[derive(Debug)]
pub struct IioSource<D: Device> {
    dev: Option<D>,
    config: SourceConfig,
    state: SourceState,
    controls: ControlTable,
    channels: ChannelSet<D::Channel>,
    buffers: BufferManager<D::Buffer>,
}

impl<D: Device> IioSource<D> {
    /// Creates a source from the devices of a backend.
    ///
    /// With an empty device ID the source is unconfigured: it has no
    /// channels, ports or controls, and can't be activated. Otherwise the
    /// device must match one of the backend's devices exactly.
    pub fn new<B>(backend: &B, config: SourceConfig) -> Result<Self>
    where
        B: Backend<Device = D>,
    {
        if config.buffer_size == 0 {
            return Err(Error::Precondition("buffer size must be positive"));
        }
        let port_capacity = config
            .buffer_size
            .checked_mul(PORT_DEPTH)
            .ok_or(Error::Precondition("buffer size too large"))?;

        let mut controls = ControlTable::new();

        if config.device_id.is_empty() {
            debug!("Creating unconfigured source");
            return Ok(Self {
                dev: None,
                config,
                state: SourceState::Unconfigured,
                controls,
                channels: ChannelSet::empty(),
                buffers: BufferManager::new(),
            });
        }

        let dev = backend
            .devices()?
            .into_iter()
            .find(|d| d.id() == config.device_id)
            .ok_or_else(|| Error::NotFound(config.device_id.clone()))?;

        controls.project_device(&dev);

        let channels = ChannelSet::build(
            &dev,
            &config.channel_ids,
            config.enable_ports,
            port_capacity,
            &mut controls,
        );

        info!(
            "Configured source for '{}': channels {:?}, {} port(s), {} control(s)",
            config.device_id,
            channels.ids(),
            channels.ports().len(),
            controls.len()
        );

        Ok(Self {
            dev: Some(dev),
            config,
            state: SourceState::Configured,
            controls,
            channels,
            buffers: BufferManager::new(),
        })
    }

    /// Gets the lifecycle state.
    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Gets the configuration the source was created with.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Gets the device, unless the source is unconfigured.
    pub fn device(&self) -> Option<&D> {
        self.dev.as_ref()
    }

    /// Gets the IDs of the tracked channels.
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.ids()
    }

    /// Gets the table of attribute control endpoints.
    pub fn controls(&self) -> &ControlTable {
        &self.controls
    }

    /// Gets the output ports.
    pub fn outputs(&self) -> &[OutputPort] {
        self.channels.ports()
    }

    /// Finds an output port by name.
    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.channels.port(name)
    }

    /// Finds an output port by name, for draining.
    pub fn output_mut(&mut self, name: &str) -> Option<&mut OutputPort> {
        self.channels.port_mut(name)
    }

    /// Determines if the source currently holds the device buffer.
    pub fn has_buffer(&self) -> bool {
        self.buffers.is_allocated()
    }

    /// The least free space across the output ports.
    ///
    /// This is what a scheduler without its own buffer accounting can pass
    /// as [`WorkInfo::min_out_elements`]. With no ports it is zero.
    pub fn min_out_elements(&self) -> usize {
        self.outputs()
            .iter()
            .map(|p| p.free())
            .min()
            .unwrap_or(0)
    }

    /// Starts streaming.
    ///
    /// Enables the tracked channels and, if any of them are scan elements
    /// and ports are enabled, reserves the device buffer. Valid only when
    /// configured or idle; otherwise the state is left as is.
    pub fn activate(&mut self) -> Result<()> {
        let dev = match (self.state, &self.dev) {
            (SourceState::Configured | SourceState::Idle, Some(dev)) => dev,
            (SourceState::Active, _) => {
                return Err(Error::Precondition("source is already active"))
            }
            _ => return Err(Error::Precondition("no device specified")),
        };

        self.buffers.allocate(
            dev,
            self.channels.channels(),
            self.config.buffer_size,
            self.config.enable_ports,
        )?;

        info!(
            "Activated '{}'{}",
            self.config.device_id,
            if self.has_buffer() { " with buffer" } else { "" }
        );
        self.state = SourceState::Active;
        Ok(())
    }

    /// Stops streaming and releases the device buffer.
    ///
    /// This is a no-op unless the source is active, so it is safe to call
    /// more than once.
    pub fn deactivate(&mut self) {
        if self.state != SourceState::Active {
            return;
        }
        self.buffers.release(self.channels.channels());
        info!("Deactivated '{}'", self.config.device_id);
        self.state = SourceState::Idle;
    }

    /// Runs one scheduler tick.
    ///
    /// This does nothing unless the source is active and holds a buffer.
    /// It blocks for no longer than `info.max_timeout`.
    pub fn work(&mut self, info: &WorkInfo) -> Result<WorkStatus> {
        if self.state != SourceState::Active {
            return Ok(WorkStatus::Idle);
        }
        stream::run_cycle(&mut self.buffers, &mut self.channels, info)
    }
}

/// Releases the buffer if the source is dropped while active.
impl<D: Device> Drop for IioSource<D> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        projection::{EndpointKind, Scope},
        sim::{SimChannel, SimContext, SimDevice},
        Channel, DataFormat,
    };
    use nix::errno::Errno;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(10);

    fn dev0() -> SimDevice {
        SimDevice::new("dev0")
            .with_name("adc")
            .with_attr("gain", "1")
            .with_attr("mode", "normal")
            .with_channel(
                SimChannel::new("ch0", DataFormat::integer(16, true))
                    .with_attr("raw", "10")
                    .with_attr("scale", "0.25"),
            )
            .with_channel(
                SimChannel::new("ch1", DataFormat::integer(16, true))
                    .with_attr("raw", "20")
                    .with_attr("scale", "0.25"),
            )
    }

    fn ctx(dev: &SimDevice) -> SimContext {
        SimContext::new()
            .with_device(SimDevice::new("other"))
            .with_device(dev.clone())
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_refill_on_every_port() {
        let dev = dev0();
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        assert_eq!(src.state(), SourceState::Configured);

        src.activate().unwrap();
        assert_eq!(src.state(), SourceState::Active);
        assert!(src.has_buffer());

        dev.signal_ready().unwrap();
        let st = src.work(&WorkInfo::new(TICK, 4096)).unwrap();
        assert_eq!(st, WorkStatus::Produced(2048));
        assert_eq!(src.output("ch0").unwrap().elements(), 2048);
        assert_eq!(src.output("ch1").unwrap().elements(), 2048);
    }

    #[test]
    fn device_and_channel_controls() {
        let dev = dev0();
        let src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        let tbl = src.controls();

        assert_eq!(tbl.count(&Scope::Device, EndpointKind::Get), 2);
        assert_eq!(tbl.count(&Scope::Device, EndpointKind::Set), 2);
        for ch in ["ch0", "ch1"] {
            let scope = Scope::Channel(ch.into());
            assert_eq!(tbl.count(&scope, EndpointKind::Get), 2);
            assert_eq!(tbl.count(&scope, EndpointKind::Set), 2);
        }

        tbl.set("setdeviceAttribute[gain]", "8").unwrap();
        assert_eq!(tbl.get("deviceAttribute[gain]").unwrap(), "8");
        assert_eq!(tbl.get("channelAttribute[ch1][raw]").unwrap(), "20");
    }

    #[test]
    fn channel_filter_hides_others() {
        let dev = dev0();
        let cfg = SourceConfig::new("dev0").channel_ids(["ch0"]);
        let src = IioSource::new(&ctx(&dev), cfg).unwrap();

        assert_eq!(src.channel_ids(), ids(&["ch0"]));
        assert!(src.output("ch0").is_some());
        assert!(src.output("ch1").is_none());
        assert!(src.controls().contains("channelAttribute[ch0][raw]"));
        assert!(src
            .controls()
            .names()
            .iter()
            .all(|name| !name.contains("[ch1]")));
    }

    #[test]
    fn unconfigured_cannot_activate() {
        let mut src = IioSource::new(&ctx(&dev0()), SourceConfig::default()).unwrap();
        assert_eq!(src.state(), SourceState::Unconfigured);
        assert!(src.device().is_none());
        assert!(src.controls().is_empty());

        assert!(matches!(src.activate(), Err(Error::Precondition(_))));
        assert_eq!(src.state(), SourceState::Unconfigured);
        assert_eq!(src.work(&WorkInfo::new(TICK, 4096)).unwrap(), WorkStatus::Idle);
    }

    #[test]
    fn missing_device() {
        let res = IioSource::new(&ctx(&dev0()), SourceConfig::new("missing"));
        assert!(matches!(res, Err(Error::NotFound(id)) if id == "missing"));
    }

    #[test]
    fn zero_buffer_size_rejected() {
        let cfg = SourceConfig::new("dev0").buffer_size(0);
        let res = IioSource::new(&ctx(&dev0()), cfg);
        assert!(matches!(res, Err(Error::Precondition(_))));
    }

    #[test]
    fn oversized_buffer_rejected() {
        let cfg = SourceConfig::new("dev0").buffer_size(usize::MAX / 2 + 1);
        let res = IioSource::new(&ctx(&dev0()), cfg);
        assert!(matches!(res, Err(Error::Precondition("buffer size too large"))));

        // The largest size whose ports still fit is accepted
        let cfg = SourceConfig::new("dev0").buffer_size(usize::MAX / 2);
        let src = IioSource::new(&ctx(&dev0()), cfg).unwrap();
        assert_eq!(src.output("ch0").unwrap().capacity(), usize::MAX / 2 * 2);
    }

    #[test]
    fn ports_disabled_is_attribute_only() {
        let dev = dev0();
        let cfg = SourceConfig::new("dev0").enable_ports(false);
        let mut src = IioSource::new(&ctx(&dev), cfg).unwrap();
        assert!(src.outputs().is_empty());
        assert_eq!(src.controls().len(), 12);

        src.activate().unwrap();
        assert!(!src.has_buffer());
        for _ in 0..3 {
            let st = src.work(&WorkInfo::new(Duration::from_secs(5), 1 << 20)).unwrap();
            assert_eq!(st, WorkStatus::Idle);
        }
        assert_eq!(dev.stats().buffers_created, 0);
        assert_eq!(dev.stats().poll_fd_requests, 0);
    }

    #[test]
    fn attribute_only_channels_never_stream() {
        let dev = SimDevice::new("dev0")
            .with_attr("gain", "1")
            .with_channel(
                SimChannel::new("temp", DataFormat::integer(16, true))
                    .attribute_only()
                    .with_attr("input", "23000"),
            );
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        src.activate().unwrap();
        assert!(!src.has_buffer());
        assert!(dev.find_channel("temp").unwrap().is_enabled());
        assert_eq!(src.work(&WorkInfo::new(TICK, 4096)).unwrap(), WorkStatus::Idle);
        assert_eq!(src.controls().get("channelAttribute[temp][input]").unwrap(), "23000");
    }

    #[test]
    fn backpressure_never_polls() {
        let dev = dev0();
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        src.activate().unwrap();

        let st = src.work(&WorkInfo::new(TICK, 2047)).unwrap();
        assert_eq!(st, WorkStatus::Backpressured);
        assert_eq!(dev.stats().poll_fd_requests, 0);
        assert_eq!(dev.stats().refills, 0);
    }

    #[test]
    fn timeout_then_data() {
        let dev = dev0();
        let cfg = SourceConfig::new("dev0").buffer_size(16);
        let mut src = IioSource::new(&ctx(&dev), cfg).unwrap();
        src.activate().unwrap();

        let info = WorkInfo::new(TICK, src.min_out_elements());
        assert_eq!(info.min_out_elements, 32);
        assert_eq!(src.work(&info).unwrap(), WorkStatus::Yielded);
        assert_eq!(dev.stats().refills, 0);

        dev.signal_ready().unwrap();
        assert_eq!(src.work(&info).unwrap(), WorkStatus::Produced(16));
        assert_eq!(src.min_out_elements(), 16);
    }

    #[test]
    fn ports_never_overfill() {
        let dev = dev0();
        let cfg = SourceConfig::new("dev0").buffer_size(16);
        let mut src = IioSource::new(&ctx(&dev), cfg).unwrap();
        src.activate().unwrap();

        let info = WorkInfo::new(TICK, 16);
        let mut statuses = Vec::new();
        for _ in 0..5 {
            dev.signal_ready().unwrap();
            statuses.push(src.work(&info).unwrap());
            for port in src.outputs() {
                assert!(port.elements() <= port.capacity());
            }
        }
        assert_eq!(
            statuses,
            vec![
                WorkStatus::Produced(16),
                WorkStatus::Produced(16),
                WorkStatus::Backpressured,
                WorkStatus::Backpressured,
                WorkStatus::Backpressured,
            ]
        );
        assert_eq!(src.output("ch0").unwrap().elements(), 32);
    }

    #[test]
    fn wait_failure_surfaces_from_work() {
        let dev = dev0();
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        src.activate().unwrap();

        dev.stale_poll_fd(true);
        let res = src.work(&WorkInfo::new(TICK, 4096));
        assert!(matches!(res, Err(Error::Io(Errno::EBADF))));
        assert_eq!(src.state(), SourceState::Active);

        dev.stale_poll_fd(false);
        dev.signal_ready().unwrap();
        dev.fail_next_refill(Errno::EAGAIN);
        assert_eq!(src.work(&WorkInfo::new(TICK, 4096)).unwrap(), WorkStatus::Yielded);

        dev.signal_ready().unwrap();
        assert_eq!(
            src.work(&WorkInfo::new(TICK, 4096)).unwrap(),
            WorkStatus::Produced(2048)
        );
    }

    #[test]
    fn deactivate_twice() {
        let dev = dev0();
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        src.activate().unwrap();
        assert!(matches!(src.activate(), Err(Error::Precondition(_))));

        src.deactivate();
        assert_eq!(src.state(), SourceState::Idle);
        assert_eq!(dev.stats().live_buffers, 0);
        assert!(!dev.find_channel("ch0").unwrap().is_enabled());

        src.deactivate();
        assert_eq!(src.state(), SourceState::Idle);
        assert_eq!(dev.stats().buffers_created, 1);
        assert_eq!(src.work(&WorkInfo::new(TICK, 4096)).unwrap(), WorkStatus::Idle);
    }

    #[test]
    fn reactivate_from_idle() {
        let dev = dev0();
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
        src.activate().unwrap();
        src.deactivate();
        src.activate().unwrap();
        assert_eq!(src.state(), SourceState::Active);
        assert_eq!(dev.stats().buffers_created, 2);
        assert_eq!(dev.stats().live_buffers, 1);
    }

    #[test]
    fn buffer_failure_keeps_state() {
        let dev = dev0();
        dev.fail_buffer_creation(true);
        let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();

        assert!(matches!(src.activate(), Err(Error::Resource(_))));
        assert_eq!(src.state(), SourceState::Configured);
        assert!(!src.has_buffer());

        dev.fail_buffer_creation(false);
        src.activate().unwrap();
        assert!(src.has_buffer());
    }

    #[test]
    fn second_source_cannot_reserve() {
        let dev = dev0();
        let ctx = ctx(&dev);
        let mut first = IioSource::new(&ctx, SourceConfig::new("dev0")).unwrap();
        let mut second = IioSource::new(&ctx, SourceConfig::new("dev0")).unwrap();

        first.activate().unwrap();
        assert!(matches!(second.activate(), Err(Error::Resource(_))));
    }

    #[test]
    fn drop_releases_buffer() {
        let dev = dev0();
        {
            let mut src = IioSource::new(&ctx(&dev), SourceConfig::new("dev0")).unwrap();
            src.activate().unwrap();
            assert_eq!(dev.stats().live_buffers, 1);
        }
        assert_eq!(dev.stats().live_buffers, 0);
    }
}

// iio-source/src/channel_set.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The set of channels tracked by a source.

use log::debug;

use crate::{
    hardware::{Channel, Device},
    port::OutputPort,
    projection::ControlTable,
};

/// The input channels of a device selected for a source, along with the
/// output ports declared for them.
#[derive(Debug)]
pub struct ChannelSet<C> {
    channels: Vec<C>,
    // One per scan channel, in the same order, when ports are enabled.
    ports: Vec<OutputPort>,
}

impl<C> ChannelSet<C> {
    /// Creates a set with no channels.
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
            ports: Vec::new(),
        }
    }
}

impl<C: Channel> ChannelSet<C> {
    /// Selects the channels of a device.
    ///
    /// Output channels are never tracked. With an empty `filter` every
    /// input channel is tracked, otherwise only those whose ID is in the
    /// filter. Either way they keep the device's discovery order.
    ///
    /// When `ports_enabled` is set, each tracked scan element gets an
    /// output port named by the channel ID, holding `port_capacity`
    /// elements. The attributes of every tracked channel are projected
    /// into `controls`.
    pub fn build<D>(
        dev: &D,
        filter: &[String],
        ports_enabled: bool,
        port_capacity: usize,
        controls: &mut ControlTable,
    ) -> Self
    where
        D: Device<Channel = C>,
    {
        let mut channels = Vec::new();
        let mut ports = Vec::new();

        for chan in dev.channels() {
            if chan.is_output() {
                continue;
            }
            let id = chan.id();
            if !filter.is_empty() && !filter.contains(&id) {
                continue;
            }

            if chan.is_scan_element() && ports_enabled {
                ports.push(OutputPort::new(&id, chan.data_format(), port_capacity));
            }
            controls.project_channel(&chan);
            channels.push(chan);
        }

        for id in filter {
            if !channels.iter().any(|c| c.id() == *id) {
                debug!("No input channel '{}' on device '{}'", id, dev.id());
            }
        }

        Self { channels, ports }
    }

    /// Gets the tracked channels.
    pub fn channels(&self) -> &[C] {
        &self.channels
    }

    /// Gets the IDs of the tracked channels.
    pub fn ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id()).collect()
    }

    /// Determines if any of the tracked channels is a scan element.
    pub fn has_scan_elements(&self) -> bool {
        self.channels.iter().any(|c| c.is_scan_element())
    }

    /// Gets the output ports.
    pub fn ports(&self) -> &[OutputPort] {
        &self.ports
    }

    /// Finds an output port by name.
    pub fn port(&self, name: &str) -> Option<&OutputPort> {
        self.ports.iter().find(|p| p.name() == name)
    }

    /// Finds an output port by name, for draining.
    pub fn port_mut(&mut self, name: &str) -> Option<&mut OutputPort> {
        self.ports.iter_mut().find(|p| p.name() == name)
    }

    /// Gets the output ports, in scan channel order, for writing.
    pub(crate) fn ports_mut(&mut self) -> &mut [OutputPort] {
        &mut self.ports
    }

    /// Pairs each scan channel with its output port.
    pub(crate) fn scan_outputs_mut(&mut self) -> impl Iterator<Item = (&C, &mut OutputPort)> {
        self.channels
            .iter()
            .filter(|c| c.is_scan_element())
            .zip(self.ports.iter_mut())
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sim::{SimChannel, SimDevice},
        DataFormat,
    };

    fn dev() -> SimDevice {
        SimDevice::new("dev0")
            .with_channel(SimChannel::new("ch0", DataFormat::integer(16, true)).with_attr("raw", "1"))
            .with_channel(
                SimChannel::new("temp", DataFormat::integer(16, true))
                    .attribute_only()
                    .with_attr("input", "23000"),
            )
            .with_channel(SimChannel::new("out0", DataFormat::integer(16, true)).output())
            .with_channel(SimChannel::new("ch1", DataFormat::integer(32, false)).with_attr("raw", "2"))
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_inputs_without_filter() {
        let mut tbl = ControlTable::new();
        let set = ChannelSet::build(&dev(), &[], true, 16, &mut tbl);

        assert_eq!(set.ids(), ids(&["ch0", "temp", "ch1"]));
        assert!(set.has_scan_elements());

        let ports: Vec<_> = set.ports().iter().map(|p| p.name()).collect();
        assert_eq!(ports, vec!["ch0", "ch1"]);
        assert_eq!(set.port("ch1").unwrap().format(), DataFormat::integer(32, false));
        assert_eq!(set.port("ch1").unwrap().capacity(), 16);

        // Attribute-only channels are still projected
        assert!(tbl.contains("channelAttribute[temp][input]"));
        assert!(!tbl.contains("channelAttribute[out0][raw]"));
        assert_eq!(tbl.len(), 6);
    }

    #[test]
    fn filter_keeps_discovery_order() {
        let mut tbl = ControlTable::new();
        let filter = ids(&["ch1", "out0", "missing", "ch0"]);
        let set = ChannelSet::build(&dev(), &filter, true, 16, &mut tbl);

        assert_eq!(set.ids(), ids(&["ch0", "ch1"]));
        assert!(!tbl.contains("channelAttribute[temp][input]"));
        assert!(tbl.contains("setChannelAttribute[ch1][raw]"));
    }

    #[test]
    fn no_ports_when_disabled() {
        let mut tbl = ControlTable::new();
        let mut set = ChannelSet::build(&dev(), &[], false, 16, &mut tbl);

        assert!(set.ports().is_empty());
        assert!(set.has_scan_elements());
        assert_eq!(set.scan_outputs_mut().count(), 0);
        assert_eq!(tbl.len(), 6);
    }

    #[test]
    fn scan_outputs_pair_by_name() {
        let mut tbl = ControlTable::new();
        let mut set = ChannelSet::build(&dev(), &[], true, 16, &mut tbl);

        for (chan, port) in set.scan_outputs_mut() {
            assert_eq!(chan.id(), port.name());
        }
    }
}

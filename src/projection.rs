// iio-source/src/projection.rs
//
// Copyright (c) 2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Attribute projection onto named control endpoints.
//!
//! The number and names of a device's attributes aren't known until the
//! device is discovered, so the control surface is a runtime table rather
//! than a fixed set of methods. Each attribute gets a getter and a setter
//! endpoint, named:
//!
//! | Owner   | Getter                              | Setter                                 |
//! |---------|-------------------------------------|----------------------------------------|
//! | device  | `deviceAttribute[<attr>]`           | `setdeviceAttribute[<attr>]`           |
//! | channel | `channelAttribute[<chan>][<attr>]`  | `setChannelAttribute[<chan>][<attr>]`  |
//!
//! Every getter is also registered as a probe, so a host can poll it.
//! Values are opaque strings passed straight through to the hardware.

use std::{collections::HashMap, fmt};

use log::trace;

use crate::{
    hardware::{Channel, Device},
    Error, Result,
};

/// The owner of a projected attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A device-level attribute
    Device,
    /// An attribute of the channel with the given ID
    Channel(String),
}

impl Scope {
    /// Gets the name of the getter endpoint for an attribute in this scope.
    pub fn getter_name(&self, attr: &str) -> String {
        match self {
            Scope::Device => format!("deviceAttribute[{}]", attr),
            Scope::Channel(id) => format!("channelAttribute[{}][{}]", id, attr),
        }
    }

    /// Gets the name of the setter endpoint for an attribute in this scope.
    pub fn setter_name(&self, attr: &str) -> String {
        match self {
            Scope::Device => format!("setdeviceAttribute[{}]", attr),
            Scope::Channel(id) => format!("setChannelAttribute[{}][{}]", id, attr),
        }
    }
}

type Getter = Box<dyn Fn() -> Result<String>>;
type Setter = Box<dyn Fn(&str) -> Result<()>>;

enum Accessor {
    Get(Getter),
    Set(Setter),
}

/// The kind of access an endpoint provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Reads the attribute
    Get,
    /// Writes the attribute
    Set,
}

/// A named accessor bound to one attribute of one owner.
pub struct Endpoint {
    scope: Scope,
    attr: String,
    accessor: Accessor,
}

impl Endpoint {
    /// Gets the owner of the attribute.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Gets the name of the attribute.
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Gets the kind of access.
    pub fn kind(&self) -> EndpointKind {
        match self.accessor {
            Accessor::Get(_) => EndpointKind::Get,
            Accessor::Set(_) => EndpointKind::Set,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("scope", &self.scope)
            .field("attr", &self.attr)
            .field("kind", &self.kind())
            .finish()
    }
}

// --------------------------------------------------------------------------

/// The runtime table of control endpoints for one source.
#[derive(Debug, Default)]
pub struct ControlTable {
    endpoints: HashMap<String, Endpoint>,
    probes: Vec<String>,
}

impl ControlTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Projects all the device-level attributes of a device.
    pub fn project_device<D: Device>(&mut self, dev: &D) {
        for attr in dev.attrs() {
            let (d1, a1) = (dev.clone(), attr.clone());
            let (d2, a2) = (dev.clone(), attr.clone());
            self.register(
                Scope::Device,
                &attr,
                Box::new(move || d1.attr_read_str(&a1)),
                Box::new(move |val: &str| d2.attr_write_str(&a2, val)),
            );
        }
    }

    /// Projects all the attributes of a channel.
    pub fn project_channel<C: Channel>(&mut self, chan: &C) {
        let scope = Scope::Channel(chan.id());
        for attr in chan.attrs() {
            let (c1, a1) = (chan.clone(), attr.clone());
            let (c2, a2) = (chan.clone(), attr.clone());
            self.register(
                scope.clone(),
                &attr,
                Box::new(move || c1.attr_read_str(&a1)),
                Box::new(move |val: &str| c2.attr_write_str(&a2, val)),
            );
        }
    }

    fn register(&mut self, scope: Scope, attr: &str, getter: Getter, setter: Setter) {
        let get_name = scope.getter_name(attr);
        let set_name = scope.setter_name(attr);
        trace!("Registering '{}' and '{}'", get_name, set_name);

        self.endpoints.insert(
            get_name.clone(),
            Endpoint {
                scope: scope.clone(),
                attr: attr.to_string(),
                accessor: Accessor::Get(getter),
            },
        );
        self.endpoints.insert(
            set_name,
            Endpoint {
                scope,
                attr: attr.to_string(),
                accessor: Accessor::Set(setter),
            },
        );
        if !self.probes.contains(&get_name) {
            self.probes.push(get_name);
        }
    }

    /// Invokes a getter endpoint, reading the attribute from the hardware.
    pub fn get(&self, name: &str) -> Result<String> {
        match self.endpoints.get(name).map(|ep| &ep.accessor) {
            Some(Accessor::Get(getter)) => getter(),
            _ => Err(Error::NoSuchEndpoint(name.to_string())),
        }
    }

    /// Invokes a setter endpoint, writing the value to the hardware
    /// unmodified.
    pub fn set(&self, name: &str, val: &str) -> Result<()> {
        match self.endpoints.get(name).map(|ep| &ep.accessor) {
            Some(Accessor::Set(setter)) => setter(val),
            _ => Err(Error::NoSuchEndpoint(name.to_string())),
        }
    }

    /// Looks up an endpoint by name.
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Determines if an endpoint with the name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Gets the names of all the endpoints, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.endpoints.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Gets the names of the endpoints registered as probes, in
    /// registration order.
    pub fn probes(&self) -> &[String] {
        &self.probes
    }

    /// Gets the number of endpoints in the table.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Determines if the table has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Counts the endpoints of a given kind in a scope.
    pub fn count(&self, scope: &Scope, kind: EndpointKind) -> usize {
        self.endpoints
            .values()
            .filter(|ep| ep.scope == *scope && ep.kind() == kind)
            .count()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

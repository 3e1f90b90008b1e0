//! Device catalog: property/command/parameter definitions
//!
//! The catalog is an external collaborator. The engine never invents device
//! metadata; it only looks definitions up to validate references at compile
//! time. [`MemoryCatalog`] is the in-process implementation used for tests
//! and embedding.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// A reference in a routine that the catalog cannot resolve
///
/// Raised at compile time; a routine with a bad reference is rejected and
/// never scheduled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown property {property} on device {device}")]
    UnknownProperty { device: String, property: String },

    #[error("unknown command {command} on device {device}")]
    UnknownCommand { device: String, command: String },

    #[error("unknown parameter {param} for command {command} on device {device}")]
    UnknownParameter {
        device: String,
        command: String,
        param: String,
    },
}

/// Definition of a device property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDef {
    /// Unit-of-measure id
    pub uom: u16,

    /// Display precision
    #[serde(default)]
    pub precision: u8,

    /// Minimum valid value, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Maximum valid value, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Enumerated value labels, for index-valued properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<u32, String>,
}

impl PropertyDef {
    /// A plain numeric property with no bounds
    pub fn numeric(uom: u16, precision: u8) -> Self {
        Self {
            uom,
            precision,
            min: None,
            max: None,
            values: BTreeMap::new(),
        }
    }
}

/// Definition of a command parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    /// Parameter id
    pub id: String,

    /// Unit-of-measure id
    pub uom: u16,

    /// Display precision
    #[serde(default)]
    pub precision: u8,

    /// Minimum valid value, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Maximum valid value, if bounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Definition of a device command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandDef {
    /// Accepted parameters
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
}

impl CommandDef {
    /// A command taking no parameters
    pub fn bare() -> Self {
        Self::default()
    }

    /// Add an unbounded parameter
    pub fn with_param(mut self, id: impl Into<String>, uom: u16) -> Self {
        self.parameters.push(ParamDef {
            id: id.into(),
            uom,
            precision: 0,
            min: None,
            max: None,
        });
        self
    }

    /// Look up a parameter definition by id
    pub fn param(&self, id: &str) -> Option<&ParamDef> {
        self.parameters.iter().find(|p| p.id == id)
    }
}

/// Resolves device ids to property/command/parameter definitions
pub trait DeviceCatalog: Send + Sync {
    /// Whether the device exists at all
    fn has_device(&self, device: &str) -> bool;

    /// Look up a property definition
    fn property(&self, device: &str, property: &str) -> Option<PropertyDef>;

    /// Look up a command definition
    fn command(&self, device: &str, command: &str) -> Option<CommandDef>;
}

/// In-memory catalog for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    devices: HashSet<String>,
    properties: HashMap<(String, String), PropertyDef>,
    commands: HashMap<(String, String), CommandDef>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with no properties or commands yet
    pub fn add_device(&mut self, device: impl Into<String>) -> &mut Self {
        self.devices.insert(device.into());
        self
    }

    /// Register a property on a device
    pub fn add_property(
        &mut self,
        device: impl Into<String>,
        property: impl Into<String>,
        def: PropertyDef,
    ) -> &mut Self {
        let device = device.into();
        self.devices.insert(device.clone());
        self.properties.insert((device, property.into()), def);
        self
    }

    /// Register a command on a device
    pub fn add_command(
        &mut self,
        device: impl Into<String>,
        command: impl Into<String>,
        def: CommandDef,
    ) -> &mut Self {
        let device = device.into();
        self.devices.insert(device.clone());
        self.commands.insert((device, command.into()), def);
        self
    }
}

impl DeviceCatalog for MemoryCatalog {
    fn has_device(&self, device: &str) -> bool {
        self.devices.contains(device)
    }

    fn property(&self, device: &str, property: &str) -> Option<PropertyDef> {
        self.properties
            .get(&(device.to_string(), property.to_string()))
            .cloned()
    }

    fn command(&self, device: &str, command: &str) -> Option<CommandDef> {
        self.commands
            .get(&(device.to_string(), command.to_string()))
            .cloned()
    }
}

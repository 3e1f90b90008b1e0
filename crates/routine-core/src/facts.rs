//! Fact types: control events, change notifications, and the fact snapshot
//!
//! The engine never reads ambient state. Every evaluation receives an
//! immutable [`FactSnapshot`] capturing property values, the control events
//! of the current evaluation epoch, and "now". Change notifications arrive
//! as [`FactChange`] values in one of three classes: property updates,
//! control events, and clock ticks.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::value::NumericLiteral;

/// A command parameter: opaque id plus a numeric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter id as defined by the device catalog
    pub id: String,

    /// Parameter value with uom/precision metadata
    #[serde(flatten)]
    pub value: NumericLiteral,
}

/// A physically or remotely issued device command, as observed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    /// Device that received the command
    pub device: String,

    /// Command id
    pub command: String,

    /// Command parameters, in the order they were issued
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// When the event was observed
    pub received_at: DateTime<Local>,
}

impl ControlEvent {
    /// Create an event observed now
    pub fn new(device: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            command: command.into(),
            parameters: Vec::new(),
            received_at: Local::now(),
        }
    }

    /// Add a parameter
    pub fn with_parameter(mut self, id: impl Into<String>, value: NumericLiteral) -> Self {
        self.parameters.push(Parameter {
            id: id.into(),
            value,
        });
        self
    }
}

/// The three classes of fact change that drive re-evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactClass {
    Property,
    Control,
    Tick,
}

/// A change notification from the fact source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactChange {
    /// A device property changed value
    Property {
        device: String,
        property: String,
        value: f64,
    },

    /// A control event was observed
    Control(ControlEvent),

    /// Periodic clock tick, for schedule boundaries
    Tick { at: DateTime<Local> },
}

impl FactChange {
    /// The event class this change belongs to
    pub fn class(&self) -> FactClass {
        match self {
            FactChange::Property { .. } => FactClass::Property,
            FactChange::Control(_) => FactClass::Control,
            FactChange::Tick { .. } => FactClass::Tick,
        }
    }
}

/// An immutable snapshot of all facts needed for one evaluation epoch
///
/// Control events are scoped to the epoch: a snapshot only carries the events
/// that arrived since the previous epoch ended, which is what makes control
/// conditions edge-triggered.
#[derive(Debug, Clone)]
pub struct FactSnapshot {
    properties: HashMap<(String, String), f64>,
    control_events: Vec<ControlEvent>,
    now: DateTime<Local>,
}

impl FactSnapshot {
    /// Create an empty snapshot at the given instant
    pub fn new(now: DateTime<Local>) -> Self {
        Self {
            properties: HashMap::new(),
            control_events: Vec::new(),
            now,
        }
    }

    /// The snapshot's "now"
    pub fn now(&self) -> DateTime<Local> {
        self.now
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        device: impl Into<String>,
        property: impl Into<String>,
        value: f64,
    ) -> Self {
        self.properties
            .insert((device.into(), property.into()), value);
        self
    }

    /// Add a control event to the current epoch
    pub fn with_control_event(mut self, event: ControlEvent) -> Self {
        self.control_events.push(event);
        self
    }

    /// Look up a property value, if the fact source has one
    pub fn property(&self, device: &str, property: &str) -> Option<f64> {
        self.properties
            .get(&(device.to_string(), property.to_string()))
            .copied()
    }

    /// Control events observed in the current epoch, oldest first
    pub fn control_events(&self) -> &[ControlEvent] {
        &self.control_events
    }

    /// The most recent control event for a device+command in this epoch
    pub fn last_control_event(&self, device: &str, command: &str) -> Option<&ControlEvent> {
        self.control_events
            .iter()
            .rev()
            .find(|e| e.device == device && e.command == command)
    }
}

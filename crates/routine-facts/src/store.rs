//! Current-value fact store with evaluation epochs
//!
//! The store is the engine's view of the fact source: the latest value of
//! every property it has heard about, plus the control events of the epoch
//! currently being evaluated. Applying a change updates the store and
//! republishes the change on the bus.
//!
//! Control events are cleared when an epoch ends, which is what makes
//! control conditions edge-triggered: a snapshot taken in a later epoch no
//! longer contains the event. Only events the epoch's snapshot actually
//! captured are cleared; an event applied while an evaluation is already in
//! flight carries over into the next epoch instead of being dropped.

use chrono::{DateTime, Local};
use dashmap::DashMap;
use routine_core::{ControlEvent, FactChange, FactSnapshot};
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::bus::FactBus;

/// Control events of the current epoch plus the snapshot watermark
#[derive(Default)]
struct EpochEvents {
    /// Events applied this epoch, oldest first
    events: Vec<ControlEvent>,
    /// How many of them the most recent snapshot captured
    seen: usize,
}

/// Tracks property values and per-epoch control events
pub struct FactStore {
    /// Latest value per (device, property)
    properties: DashMap<(String, String), f64>,
    epoch_events: Mutex<EpochEvents>,
    /// Bus to republish applied changes on
    bus: Arc<FactBus>,
}

impl FactStore {
    /// Create a store publishing onto the given bus
    pub fn new(bus: Arc<FactBus>) -> Self {
        Self {
            properties: DashMap::new(),
            epoch_events: Mutex::new(EpochEvents::default()),
            bus,
        }
    }

    /// Apply a fact change and republish it
    pub fn apply(&self, change: FactChange) {
        match &change {
            FactChange::Property {
                device,
                property,
                value,
            } => {
                trace!(device, property, value, "property updated");
                self.properties
                    .insert((device.clone(), property.clone()), *value);
            }
            FactChange::Control(event) => {
                trace!(device = %event.device, command = %event.command, "control event recorded");
                self.epoch_events
                    .lock()
                    .expect("epoch event lock poisoned")
                    .events
                    .push(event.clone());
            }
            FactChange::Tick { .. } => {}
        }
        self.bus.publish(change);
    }

    /// Current value of a property, if known
    pub fn property(&self, device: &str, property: &str) -> Option<f64> {
        self.properties
            .get(&(device.to_string(), property.to_string()))
            .map(|v| *v)
    }

    /// Build an immutable snapshot of the current epoch at the given instant
    ///
    /// Marks the captured control events so [`end_epoch`] drops exactly
    /// those; events applied after this call stay for the next snapshot.
    ///
    /// [`end_epoch`]: FactStore::end_epoch
    pub fn snapshot(&self, now: DateTime<Local>) -> FactSnapshot {
        let mut snap = FactSnapshot::new(now);
        for entry in self.properties.iter() {
            let (device, property) = entry.key();
            snap = snap.with_property(device.clone(), property.clone(), *entry.value());
        }
        let mut epoch = self
            .epoch_events
            .lock()
            .expect("epoch event lock poisoned");
        for event in epoch.events.iter() {
            snap = snap.with_control_event(event.clone());
        }
        epoch.seen = epoch.events.len();
        snap
    }

    /// Close the current epoch, dropping the control events its snapshot saw
    pub fn end_epoch(&self) {
        let mut epoch = self
            .epoch_events
            .lock()
            .expect("epoch event lock poisoned");
        if epoch.seen > 0 {
            debug!(count = epoch.seen, "ending evaluation epoch");
            let seen = epoch.seen;
            epoch.events.drain(..seen);
            epoch.seen = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routine_core::NumericLiteral;

    fn store() -> FactStore {
        FactStore::new(Arc::new(FactBus::new()))
    }

    #[test]
    fn test_property_updates_keep_latest() {
        let store = store();
        store.apply(FactChange::Property {
            device: "dev1".into(),
            property: "ST".into(),
            value: 70.0,
        });
        store.apply(FactChange::Property {
            device: "dev1".into(),
            property: "ST".into(),
            value: 76.0,
        });

        assert_eq!(store.property("dev1", "ST"), Some(76.0));
        assert_eq!(store.snapshot(Local::now()).property("dev1", "ST"), Some(76.0));
    }

    #[test]
    fn test_control_events_are_epoch_scoped() {
        let store = store();
        let event = ControlEvent::new("switch1", "DON")
            .with_parameter("level", NumericLiteral::new(100.0, 51));
        store.apply(FactChange::Control(event));

        let snap = store.snapshot(Local::now());
        assert!(snap.last_control_event("switch1", "DON").is_some());

        store.end_epoch();
        let snap = store.snapshot(Local::now());
        assert!(snap.last_control_event("switch1", "DON").is_none());
    }

    #[test]
    fn test_event_applied_mid_epoch_survives_into_next() {
        let store = store();
        store.apply(FactChange::Control(ControlEvent::new("switch1", "DON")));
        let snap = store.snapshot(Local::now());
        assert!(snap.last_control_event("switch1", "DON").is_some());

        // Arrives while the snapshot above is being evaluated
        store.apply(FactChange::Control(ControlEvent::new("keypad", "DON")));
        store.end_epoch();

        // The late press is still there for the next epoch; the one the
        // snapshot captured is gone
        let next = store.snapshot(Local::now());
        assert!(next.last_control_event("keypad", "DON").is_some());
        assert!(next.last_control_event("switch1", "DON").is_none());

        store.end_epoch();
        let after = store.snapshot(Local::now());
        assert!(after.last_control_event("keypad", "DON").is_none());
    }

    #[test]
    fn test_end_epoch_without_snapshot_drops_nothing() {
        let store = store();
        store.apply(FactChange::Control(ControlEvent::new("switch1", "DON")));
        store.end_epoch();

        let snap = store.snapshot(Local::now());
        assert!(snap.last_control_event("switch1", "DON").is_some());
    }

    #[tokio::test]
    async fn test_apply_republishes_on_bus() {
        let bus = Arc::new(FactBus::new());
        let store = FactStore::new(bus.clone());
        let mut rx = bus.subscribe_all();

        store.apply(FactChange::Property {
            device: "dev1".into(),
            property: "ST".into(),
            value: 1.0,
        });

        assert!(matches!(
            rx.recv().await.unwrap(),
            FactChange::Property { .. }
        ));
    }
}

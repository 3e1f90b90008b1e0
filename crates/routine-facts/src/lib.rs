//! Fact layer for the routine automation engine
//!
//! Two pieces: the [`FactBus`], a typed pub/sub broadcast of fact changes,
//! and the [`FactStore`], which tracks current property values and the
//! control events of the running evaluation epoch, and builds the immutable
//! snapshots that condition evaluation consumes.

mod bus;
mod store;

pub use bus::{FactBus, SharedFactBus};
pub use store::FactStore;

//! Core types for the routine automation engine
//!
//! This crate provides the fundamental types shared by every other crate in
//! the workspace: numeric literals with unit-of-measure metadata, control
//! events, the immutable fact snapshot that all condition evaluation runs
//! against, and the traits for the engine's external collaborators (device
//! catalog, command sink, astronomical time source).

mod astro;
mod catalog;
mod facts;
mod sink;
mod value;

pub use astro::{AstroError, AstroSource, FixedAstro};
pub use catalog::{
    CommandDef, DeviceCatalog, MemoryCatalog, ParamDef, PropertyDef, ReferenceError,
};
pub use facts::{ControlEvent, FactChange, FactClass, FactSnapshot, Parameter};
pub use sink::{CommandCall, CommandSink, SinkError};
pub use value::{CompareOp, NumericLiteral};

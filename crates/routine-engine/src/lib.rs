//! Routine automation engine
//!
//! Ties the pieces together: routine definitions compile into a trigger AST
//! plus then/else programs, the fact layer feeds evaluation epochs, and the
//! runtime fires and cancels sequencers as trigger results transition.
//!
//! # Key Types
//!
//! - [`RoutineConfig`] / [`Routine`] - Definition and its compiled form
//! - [`Engine`] - Owns routines, the fact store, and the evaluation loop
//! - [`EngineConfig`] - Tick period and channel sizing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use routine_core::{FixedAstro, CommandSink};
//! use routine_engine::{Engine, EngineConfig, RoutineConfig};
//! use chrono::NaiveTime;
//!
//! # fn sink() -> Arc<dyn CommandSink> { unimplemented!() }
//! # fn definition() -> RoutineConfig { unimplemented!() }
//! # async fn run() {
//! let astro = Arc::new(FixedAstro::new(
//!     NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
//!     NaiveTime::from_hms_opt(19, 45, 0).unwrap(),
//! ));
//! let engine = Arc::new(Engine::new(sink(), astro, EngineConfig::default()));
//! engine.add_routine(definition()).unwrap();
//! engine.spawn_ticker();
//! engine.clone().spawn().await.unwrap();
//! # }
//! ```

pub mod config;
pub mod routine;
pub mod runtime;

pub use config::EngineConfig;
pub use routine::{Branch, Routine, RoutineConfig, RoutineError};
pub use runtime::{Engine, RoutineInfo};

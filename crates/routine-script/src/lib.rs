//! Action program model and sequencer
//!
//! A routine branch carries a flat array of action tokens: device commands,
//! timed waits, and repeat markers. [`Program::compile`] validates and
//! segments the array; [`spawn`] runs it on a dedicated task with strict
//! ordering, randomized waits and repeat counts, and immediate cancellation
//! at every suspension point.
//!
//! # Key Types
//!
//! - [`ActionToken`] - One element of the action array
//! - [`Program`] - Validated, segmented program
//! - [`SequencerHandle`] - Cancel and observe a running program
//! - [`SequencerState`] - Lifecycle of one execution

pub mod action;
pub mod sequencer;

pub use action::{ActionToken, Period, Program, ProgramError, RepeatKind, Scope, Step};
pub use sequencer::{spawn, SequencerHandle, SequencerState};

//! Trigger expression engine
//!
//! Routine trigger conditions arrive as flat token arrays mixing
//! subexpressions (state comparisons, control-event matches, schedules) with
//! logic operators and parentheses. This crate validates and compiles those
//! arrays into a boolean AST, evaluates the AST against a fact snapshot, and
//! resolves schedule subexpressions into concrete instants and intervals.
//!
//! # Key Types
//!
//! - [`ExprToken`] - One element of the flat token array
//! - [`Ast`] - Compiled boolean expression tree
//! - [`Evaluator`] - Evaluates an AST against a [`routine_core::FactSnapshot`]
//! - [`ScheduleExpr`] - The five schedule shapes

pub mod compile;
pub mod eval;
pub mod schedule;
pub mod token;

pub use compile::{check_references, compile, Ast, CompileError, Leaf};
pub use eval::{Evaluation, Evaluator};
pub use schedule::{
    resolve, DaySet, DurationSpec, ScheduleError, ScheduleExpr, TimeAnchor, TimeOfDay,
};
pub use token::{ControlMatch, Equality, ExprToken, StateCompare, Subexpr};

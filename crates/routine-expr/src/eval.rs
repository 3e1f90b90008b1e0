//! Condition evaluation
//!
//! Evaluates a compiled AST against an immutable fact snapshot. Evaluation
//! never fails on a well-formed AST: a missing fact makes its leaf false, a
//! broken astronomical source makes schedule leaves false until it recovers.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

use routine_core::{AstroSource, FactSnapshot};

use crate::compile::{Ast, Leaf};
use crate::schedule;
use crate::token::{ControlMatch, Equality, StateCompare, Subexpr};

/// Result of evaluating a trigger expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The expression's boolean result
    pub result: bool,

    /// Indices of the leaves that were evaluated and came out true,
    /// for audit and debugging
    pub matched: Vec<usize>,
}

/// Evaluates compiled trigger expressions against fact snapshots
///
/// Holds the outage latch for the astronomical source so the outage is
/// logged once, not once per evaluation cycle.
pub struct Evaluator {
    astro_down: AtomicBool,
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            astro_down: AtomicBool::new(false),
        }
    }

    /// Evaluate an AST with standard short-circuit AND/OR semantics
    pub fn evaluate(
        &self,
        ast: &Ast,
        snapshot: &FactSnapshot,
        astro: &dyn AstroSource,
    ) -> Evaluation {
        let mut matched = Vec::new();
        let result = self.eval_node(ast, snapshot, astro, &mut matched);
        Evaluation { result, matched }
    }

    fn eval_node(
        &self,
        ast: &Ast,
        snapshot: &FactSnapshot,
        astro: &dyn AstroSource,
        matched: &mut Vec<usize>,
    ) -> bool {
        match ast {
            Ast::Leaf(leaf) => {
                let value = self.eval_leaf(leaf, snapshot, astro);
                if value {
                    matched.push(leaf.index);
                }
                value
            }
            Ast::And(l, r) => {
                self.eval_node(l, snapshot, astro, matched)
                    && self.eval_node(r, snapshot, astro, matched)
            }
            Ast::Or(l, r) => {
                self.eval_node(l, snapshot, astro, matched)
                    || self.eval_node(r, snapshot, astro, matched)
            }
        }
    }

    fn eval_leaf(&self, leaf: &Leaf, snapshot: &FactSnapshot, astro: &dyn AstroSource) -> bool {
        match &leaf.expr {
            Subexpr::State(s) => self.eval_state(s, snapshot),
            Subexpr::Control(c) => eval_control(c, snapshot),
            Subexpr::Schedule(s) => match schedule::resolve(s, snapshot.now(), astro) {
                Ok(active) => {
                    if self.astro_down.swap(false, Ordering::Relaxed) {
                        info!("astronomical source recovered");
                    }
                    active
                }
                Err(err) => {
                    // Log once per outage, not per cycle
                    if !self.astro_down.swap(true, Ordering::Relaxed) {
                        warn!(%err, "schedule resolution unavailable; schedule conditions are false until recovery");
                    }
                    false
                }
            },
        }
    }

    fn eval_state(&self, cond: &StateCompare, snapshot: &FactSnapshot) -> bool {
        let Some(value) = snapshot.property(&cond.device, &cond.property) else {
            debug!(
                device = %cond.device,
                property = %cond.property,
                "no fact for property; condition is false"
            );
            return false;
        };
        let result = cond.op.compare(value, cond.literal.value);
        trace!(
            device = %cond.device,
            property = %cond.property,
            value,
            op = %cond.op,
            literal = cond.literal.value,
            result,
            "state comparison"
        );
        result
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Did a matching control event arrive this epoch?
///
/// Every event of the epoch is considered, not just the most recent one per
/// device+command, so `isnot` holds exactly when no matching event occurred.
fn eval_control(cond: &ControlMatch, snapshot: &FactSnapshot) -> bool {
    let matches = snapshot.control_events().iter().any(|event| {
        event.device == cond.device
            && event.command == cond.command
            && cond.parameters.iter().all(|want| {
                event
                    .parameters
                    .iter()
                    .any(|got| got.id == want.id && got.value.value == want.value.value)
            })
    });

    match cond.equality {
        Equality::Is => matches,
        Equality::IsNot => !matches,
    }
}

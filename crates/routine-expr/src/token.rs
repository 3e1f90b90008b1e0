//! Expression token types
//!
//! A trigger expression is a flat, ordered array of tokens: subexpressions
//! (state comparisons, control-event matches, schedules) interleaved with
//! logic operators and parentheses. The token array is the wire format; only
//! the compiler interprets it.

use serde::{Deserialize, Serialize};

use routine_core::{CompareOp, NumericLiteral, Parameter};

use crate::schedule::ScheduleExpr;

/// State comparison: compare a device property against a numeric literal
///
/// Change-of-state (COS) condition. The comparison is exact on the stored
/// value; the literal's uom/precision are formatting metadata only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCompare {
    /// Device id
    pub device: String,

    /// Property id on the device
    pub property: String,

    /// Comparison operator
    pub op: CompareOp,

    /// Literal to compare against
    #[serde(flatten)]
    pub literal: NumericLiteral,
}

/// Whether a control match asserts the event happened or did not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Equality {
    Is,
    IsNot,
}

/// Control-event match: did a command event arrive this evaluation epoch?
///
/// Change-of-control (COC) condition. Edge-triggered: true only for the
/// epoch in which the event occurred, then reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMatch {
    /// Device the command was issued to
    pub device: String,

    /// Assert presence or absence of the event
    pub equality: Equality,

    /// Command id
    pub command: String,

    /// Parameters that must all match (by id, exact value)
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// One token of a flat trigger expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprToken {
    /// State comparison subexpression
    State(StateCompare),

    /// Control-event subexpression
    Control(ControlMatch),

    /// Schedule subexpression
    Schedule(ScheduleExpr),

    /// Binary AND operator
    And,

    /// Binary OR operator
    Or,

    /// Opening parenthesis
    Lparen,

    /// Closing parenthesis
    Rparen,
}

impl ExprToken {
    /// Whether this token is a subexpression (an AST leaf)
    pub fn is_subexpr(&self) -> bool {
        matches!(
            self,
            ExprToken::State(_) | ExprToken::Control(_) | ExprToken::Schedule(_)
        )
    }

    /// Whether this token is a binary operator
    pub fn is_operator(&self) -> bool {
        matches!(self, ExprToken::And | ExprToken::Or)
    }
}

/// An atomic subexpression, detached from the token stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subexpr {
    State(StateCompare),
    Control(ControlMatch),
    Schedule(ScheduleExpr),
}

impl Subexpr {
    /// Convert back into a token
    pub fn into_token(self) -> ExprToken {
        match self {
            Subexpr::State(s) => ExprToken::State(s),
            Subexpr::Control(c) => ExprToken::Control(c),
            Subexpr::Schedule(s) => ExprToken::Schedule(s),
        }
    }
}

impl TryFrom<ExprToken> for Subexpr {
    type Error = ExprToken;

    fn try_from(token: ExprToken) -> Result<Self, ExprToken> {
        match token {
            ExprToken::State(s) => Ok(Subexpr::State(s)),
            ExprToken::Control(c) => Ok(Subexpr::Control(c)),
            ExprToken::Schedule(s) => Ok(Subexpr::Schedule(s)),
            other => Err(other),
        }
    }
}

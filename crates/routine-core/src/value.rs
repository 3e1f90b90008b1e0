//! Numeric literals and comparison operators
//!
//! Every numeric value exchanged with the device network carries a
//! unit-of-measure id and a display precision. Comparisons are always exact
//! on the stored value; uom and precision only affect formatting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numeric value with unit-of-measure metadata
///
/// The `value` field is the authoritative number. `uom` and `precision` travel
/// with it for display formatting and never participate in comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericLiteral {
    /// The numeric value, at full precision
    pub value: f64,

    /// Unit-of-measure id from the device catalog
    pub uom: u16,

    /// Number of decimal places for display
    #[serde(default)]
    pub precision: u8,
}

impl NumericLiteral {
    /// Create a literal with a uom and default (zero) precision
    pub fn new(value: f64, uom: u16) -> Self {
        Self {
            value,
            uom,
            precision: 0,
        }
    }

    /// Set the display precision
    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Render the value with its display precision
    pub fn display(&self) -> String {
        format!("{:.*}", self.precision as usize, self.value)
    }
}

impl fmt::Display for NumericLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Comparison operator for state conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    /// Apply the operator to a snapshot value (lhs) and a literal (rhs)
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }

    /// Symbol as it appears in routine payloads
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

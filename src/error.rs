//! Error types for dualgrad

use thiserror::Error;

use crate::op::Op;

/// Result type alias using dualgrad's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable failures of the checked operations; invariant violations in the
/// graph itself panic instead
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
  /// An operand lies outside the domain of the operation
  #[error("domain error in `{op}`: {reason} (operand {operand})")]
  Domain {
    /// The offending operation
    op: Op,
    /// The operand that failed the check
    operand: f64,
    /// Human readable description of the violated domain
    reason: &'static str,
  },

  /// A driver produced an infinite or NaN result
  #[error("{what} is not finite: {value}")]
  NonFinite {
    /// Which quantity was checked, "value" or "gradient"
    what: &'static str,
    /// The offending number
    value: f64,
  },
}

//!
//! # op
//!
//! Operation kinds and their local derivative rules. Both representations
//! dispatch through here: the graph calls [`Op::partials`] when pulling a
//! gradient back through a node, dual numbers call it to push their tangent
//! forward, so every rule is written exactly once.
//!

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::error::{Error, Result};

/// Local partial derivatives of an operation, one per operand
pub(crate) type Partials = SmallVec<[f64; 2]>;

/// Operation identifier recorded on every node of the graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
  /// Input variable, no operands
  Leaf,
  /// Raw number promoted into the graph, no operands
  Constant,
  Add,
  Sub,
  Mul,
  Div,
  /// Power with a fixed real exponent; the exponent is not differentiated
  Powf(f64),
  Exp,
  Ln,
  Sin,
  Cos,
  Tan,
}

impl Op {
  /// Number of operands the operation consumes
  #[inline]
  pub fn arity(&self) -> usize {
    match self {
      Op::Leaf | Op::Constant => 0,
      Op::Add | Op::Sub | Op::Mul | Op::Div => 2,
      Op::Powf(_) | Op::Exp | Op::Ln | Op::Sin | Op::Cos | Op::Tan => 1,
    }
  }

  /// Diagnostic tag; `Powf` drops its exponent here, use `Display` to keep it
  pub fn label(&self) -> &'static str {
    match self {
      Op::Leaf => "leaf",
      Op::Constant => "const",
      Op::Add => "+",
      Op::Sub => "-",
      Op::Mul => "*",
      Op::Div => "/",
      Op::Powf(_) => "**",
      Op::Exp => "exp",
      Op::Ln => "ln",
      Op::Sin => "sin",
      Op::Cos => "cos",
      Op::Tan => "tan",
    }
  }

  /// Forward computation over operand values, plain IEEE-754 semantics
  ///
  /// Panics if called on a leaf or constant, those carry their own value
  #[inline]
  pub(crate) fn forward(&self, operands: &[f64]) -> f64 {
    debug_assert_eq!(operands.len(), self.arity());
    match *self {
      Op::Leaf | Op::Constant => panic!("`{self}` has no forward computation"),
      Op::Add => operands[0] + operands[1],
      Op::Sub => operands[0] - operands[1],
      Op::Mul => operands[0] * operands[1],
      Op::Div => operands[0] / operands[1],
      Op::Powf(n) => operands[0].powf(n),
      Op::Exp => operands[0].exp(),
      Op::Ln => operands[0].ln(),
      Op::Sin => operands[0].sin(),
      Op::Cos => operands[0].cos(),
      Op::Tan => operands[0].tan(),
    }
  }

  /// d(output)/d(operand) for each operand, evaluated at the given operand
  /// values
  #[inline]
  pub(crate) fn partials(&self, operands: &[f64]) -> Partials {
    debug_assert_eq!(operands.len(), self.arity());
    match *self {
      Op::Leaf | Op::Constant => SmallVec::new(),
      Op::Add => smallvec![1.0, 1.0],
      Op::Sub => smallvec![1.0, -1.0],
      Op::Mul => smallvec![operands[1], operands[0]],
      Op::Div => {
        let (a, b) = (operands[0], operands[1]);
        smallvec![1.0 / b, -a / (b * b)]
      }
      Op::Powf(n) => smallvec![n * operands[0].powf(n - 1.0)],
      Op::Exp => smallvec![operands[0].exp()],
      Op::Ln => smallvec![1.0 / operands[0]],
      Op::Sin => smallvec![operands[0].cos()],
      Op::Cos => smallvec![-operands[0].sin()],
      Op::Tan => {
        let t = operands[0].tan();
        smallvec![1.0 + t * t]
      }
    }
  }

  /// Reject operands on which the forward computation leaves the real domain
  ///
  /// NaN operands, and a NaN exponent, are rejected for every operation;
  /// infinities are left to IEEE-754, which defines all of these results.
  pub(crate) fn check_domain(&self, operands: &[f64]) -> Result<()> {
    debug_assert_eq!(operands.len(), self.arity());
    let nan = match *self {
      Op::Powf(n) if n.is_nan() => Some(n),
      _ => operands.iter().copied().find(|v| v.is_nan()),
    };
    if let Some(operand) = nan {
      return Err(Error::Domain {
        op: *self,
        operand,
        reason: "not a number",
      });
    }
    let violation = match *self {
      Op::Div if operands[1] == 0.0 => Some((operands[1], "division by zero")),
      Op::Ln if operands[0] <= 0.0 => Some((operands[0], "logarithm of a non-positive value")),
      Op::Powf(n) if operands[0] < 0.0 && n.is_finite() && n.fract() != 0.0 => Some((
        operands[0],
        "negative base with a non-integer exponent",
      )),
      Op::Powf(n) if operands[0] == 0.0 && n < 0.0 => {
        Some((operands[0], "zero base with a negative exponent"))
      }
      _ => None,
    };
    match violation {
      Some((operand, reason)) => Err(Error::Domain {
        op: *self,
        operand,
        reason,
      }),
      None => Ok(()),
    }
  }
}

impl fmt::Display for Op {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Op::Powf(n) => write!(f, "**{n}"),
      op => f.write_str(op.label()),
    }
  }
}

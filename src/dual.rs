//! Dual numbers for forward-mode automatic differentiation.
//!
//! A dual number `real + dual·ε` with `ε² = 0` carries a value together with
//! its derivative with respect to one seeded input. Every operation pushes the
//! tangent forward through the same local partials the graph uses, so the
//! chain rule falls out of composition and nothing is retained.
//!
//! ```
//! use dualgrad::Dual;
//!
//! // f(x) = x³ at x = 2
//! let x = Dual::variable(2.0);
//! let f = x * x * x;
//!
//! assert_eq!(f.real, 8.0);
//! assert_eq!(f.dual, 12.0);
//! ```

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use smallvec::SmallVec;

use crate::error::Result;
use crate::op::Op;

/// A value and its derivative with respect to the seeded input
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual {
  /// The primal value
  pub real: f64,
  /// The derivative (tangent)
  pub dual: f64,
}

impl Dual {
  #[inline]
  pub fn new(real: f64, dual: f64) -> Self {
    Self { real, dual }
  }

  /// The differentiation variable, seeded with dx/dx = 1
  #[inline]
  pub fn variable(real: f64) -> Self {
    Self { real, dual: 1.0 }
  }

  /// A constant, derivative 0
  #[inline]
  pub fn constant(real: f64) -> Self {
    Self { real, dual: 0.0 }
  }

  /// Forward value plus the chain rule: the sum over operands of the local
  /// partial times the operand's tangent
  ///
  /// Operands without a tangent contribute nothing, even where their partial
  /// is infinite.
  fn apply(op: Op, operands: &[Dual]) -> Self {
    let reals: SmallVec<[f64; 2]> = operands.iter().map(|d| d.real).collect();
    let dual = op
      .partials(&reals)
      .into_iter()
      .zip(operands)
      .filter(|(_, operand)| operand.dual != 0.0)
      .map(|(partial, operand)| partial * operand.dual)
      .sum();
    Self {
      real: op.forward(&reals),
      dual,
    }
  }

  fn try_apply(op: Op, operands: &[Dual]) -> Result<Self> {
    let reals: SmallVec<[f64; 2]> = operands.iter().map(|d| d.real).collect();
    op.check_domain(&reals)?;
    Ok(Self::apply(op, operands))
  }

  /// `self^n` for a fixed exponent `n`
  #[inline]
  pub fn powf(self, n: f64) -> Self {
    Self::apply(Op::Powf(n), &[self])
  }

  #[inline]
  pub fn exp(self) -> Self {
    Self::apply(Op::Exp, &[self])
  }

  #[inline]
  pub fn ln(self) -> Self {
    Self::apply(Op::Ln, &[self])
  }

  #[inline]
  pub fn sin(self) -> Self {
    Self::apply(Op::Sin, &[self])
  }

  #[inline]
  pub fn cos(self) -> Self {
    Self::apply(Op::Cos, &[self])
  }

  #[inline]
  pub fn tan(self) -> Self {
    Self::apply(Op::Tan, &[self])
  }

  /// Multiplicative inverse, `1/(b + b′ε) = 1/b - (b′/b²)ε`
  #[inline]
  pub fn recip(self) -> Self {
    Self::constant(1.0) / self
  }

  pub fn try_div(self, rhs: impl Into<Dual>) -> Result<Self> {
    Self::try_apply(Op::Div, &[self, rhs.into()])
  }

  pub fn try_ln(self) -> Result<Self> {
    Self::try_apply(Op::Ln, &[self])
  }

  pub fn try_powf(self, n: f64) -> Result<Self> {
    Self::try_apply(Op::Powf(n), &[self])
  }
}

impl From<f64> for Dual {
  #[inline(always)]
  fn from(real: f64) -> Self {
    Self::constant(real)
  }
}

impl fmt::Display for Dual {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} + {}ε", self.real, self.dual)
  }
}

/// The derivative carried by the result of a forward-mode evaluation
///
/// Plain numbers carry none; a function that drops the dual representation
/// yields a derivative of zero instead of failing.
pub trait Tangent {
  fn tangent(&self) -> f64;
}

impl Tangent for Dual {
  #[inline(always)]
  fn tangent(&self) -> f64 {
    self.dual
  }
}

impl Tangent for f64 {
  #[inline(always)]
  fn tangent(&self) -> f64 {
    0.0
  }
}

impl Add for Dual {
  type Output = Dual;

  #[inline]
  fn add(self, other: Self) -> Self::Output {
    Self::apply(Op::Add, &[self, other])
  }
}

impl Add<f64> for Dual {
  type Output = Dual;

  #[inline(always)]
  fn add(self, other: f64) -> Self::Output {
    self + Dual::constant(other)
  }
}

impl Add<Dual> for f64 {
  type Output = Dual;

  #[inline(always)]
  fn add(self, other: Dual) -> Self::Output {
    Dual::constant(self) + other
  }
}

impl Sub for Dual {
  type Output = Dual;

  #[inline]
  fn sub(self, other: Self) -> Self::Output {
    Self::apply(Op::Sub, &[self, other])
  }
}

impl Sub<f64> for Dual {
  type Output = Dual;

  #[inline(always)]
  fn sub(self, other: f64) -> Self::Output {
    self - Dual::constant(other)
  }
}

impl Sub<Dual> for f64 {
  type Output = Dual;

  #[inline(always)]
  fn sub(self, other: Dual) -> Self::Output {
    Dual::constant(self) - other
  }
}

impl Mul for Dual {
  type Output = Dual;

  #[inline]
  fn mul(self, other: Self) -> Self::Output {
    Self::apply(Op::Mul, &[self, other])
  }
}

impl Mul<f64> for Dual {
  type Output = Dual;

  #[inline(always)]
  fn mul(self, other: f64) -> Self::Output {
    self * Dual::constant(other)
  }
}

impl Mul<Dual> for f64 {
  type Output = Dual;

  #[inline(always)]
  fn mul(self, other: Dual) -> Self::Output {
    Dual::constant(self) * other
  }
}

impl Div for Dual {
  type Output = Dual;

  #[inline]
  fn div(self, other: Self) -> Self::Output {
    Self::apply(Op::Div, &[self, other])
  }
}

impl Div<f64> for Dual {
  type Output = Dual;

  #[inline(always)]
  fn div(self, other: f64) -> Self::Output {
    self / Dual::constant(other)
  }
}

impl Div<Dual> for f64 {
  type Output = Dual;

  #[inline(always)]
  fn div(self, other: Dual) -> Self::Output {
    Dual::constant(self) / other
  }
}

impl Neg for Dual {
  type Output = Dual;

  #[inline(always)]
  fn neg(self) -> Self::Output {
    Dual::new(-self.real, -self.dual)
  }
}

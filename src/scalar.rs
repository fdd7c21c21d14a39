//!
//! # scalar
//!
//! The capability every differentiable representation shares. Functions
//! written against [`Scalar`] run unchanged on plain `f64`, on [`Dual`] and on
//! [`GraphNode`], which is how the same expression is differentiated in either
//! mode.
//!
//! Reflected arithmetic (`f64 op S`) is implemented for each concrete type but
//! cannot be expressed as a bound here, so generic code keeps the scalar on
//! the left: `x * 2.0` rather than `2.0 * x`.
//!

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::dual::Dual;
use crate::tape::GraphNode;

/// A scalar supporting the primitive operations
pub trait Scalar:
  Copy
  + Add<Output = Self>
  + Sub<Output = Self>
  + Mul<Output = Self>
  + Div<Output = Self>
  + Neg<Output = Self>
  + Add<f64, Output = Self>
  + Sub<f64, Output = Self>
  + Mul<f64, Output = Self>
  + Div<f64, Output = Self>
{
  /// The primal value
  fn value(&self) -> f64;

  fn exp(self) -> Self;

  /// Natural logarithm
  fn ln(self) -> Self;

  fn sin(self) -> Self;

  fn cos(self) -> Self;

  fn tan(self) -> Self;

  /// Power with a fixed, non-differentiated exponent
  fn powf(self, n: f64) -> Self;
}

impl Scalar for f64 {
  #[inline(always)]
  fn value(&self) -> f64 {
    *self
  }

  #[inline(always)]
  fn exp(self) -> Self {
    f64::exp(self)
  }

  #[inline(always)]
  fn ln(self) -> Self {
    f64::ln(self)
  }

  #[inline(always)]
  fn sin(self) -> Self {
    f64::sin(self)
  }

  #[inline(always)]
  fn cos(self) -> Self {
    f64::cos(self)
  }

  #[inline(always)]
  fn tan(self) -> Self {
    f64::tan(self)
  }

  #[inline(always)]
  fn powf(self, n: f64) -> Self {
    f64::powf(self, n)
  }
}

impl Scalar for Dual {
  #[inline(always)]
  fn value(&self) -> f64 {
    self.real
  }

  #[inline(always)]
  fn exp(self) -> Self {
    Dual::exp(self)
  }

  #[inline(always)]
  fn ln(self) -> Self {
    Dual::ln(self)
  }

  #[inline(always)]
  fn sin(self) -> Self {
    Dual::sin(self)
  }

  #[inline(always)]
  fn cos(self) -> Self {
    Dual::cos(self)
  }

  #[inline(always)]
  fn tan(self) -> Self {
    Dual::tan(self)
  }

  #[inline(always)]
  fn powf(self, n: f64) -> Self {
    Dual::powf(self, n)
  }
}

impl<'t> Scalar for GraphNode<'t> {
  #[inline(always)]
  fn value(&self) -> f64 {
    GraphNode::value(self)
  }

  #[inline(always)]
  fn exp(self) -> Self {
    GraphNode::exp(self)
  }

  #[inline(always)]
  fn ln(self) -> Self {
    GraphNode::ln(self)
  }

  #[inline(always)]
  fn sin(self) -> Self {
    GraphNode::sin(self)
  }

  #[inline(always)]
  fn cos(self) -> Self {
    GraphNode::cos(self)
  }

  #[inline(always)]
  fn tan(self) -> Self {
    GraphNode::tan(self)
  }

  #[inline(always)]
  fn powf(self, n: f64) -> Self {
    GraphNode::powf(self, n)
  }
}

#[inline(always)]
pub fn exp<S: Scalar>(x: S) -> S {
  x.exp()
}

/// Natural logarithm
#[inline(always)]
pub fn ln<S: Scalar>(x: S) -> S {
  x.ln()
}

/// Same as [`ln`]
#[inline(always)]
pub fn log<S: Scalar>(x: S) -> S {
  x.ln()
}

#[inline(always)]
pub fn sin<S: Scalar>(x: S) -> S {
  x.sin()
}

#[inline(always)]
pub fn cos<S: Scalar>(x: S) -> S {
  x.cos()
}

#[inline(always)]
pub fn tan<S: Scalar>(x: S) -> S {
  x.tan()
}

#[inline(always)]
pub fn powf<S: Scalar>(x: S, n: f64) -> S {
  x.powf(n)
}

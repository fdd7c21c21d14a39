//!
//! # dualgrad
//!
//! Scalar automatic differentiation in two modes sharing one set of local
//! derivative rules:
//!
//! - **Reverse mode**: a [`Tape`] records every operation on [`GraphNode`]s;
//!   [`GraphNode::backward`] walks the recorded DAG in reverse topological
//!   order and accumulates gradients into every reachable node
//! - **Forward mode**: a [`Dual`] number carries its derivative along with its
//!   value; nothing is recorded
//!
//! The drivers [`grad`] and [`forward_grad`] hide both behind a plain
//! `f64 -> f64` derivative:
//!
//! ```
//! use dualgrad::{forward_grad, grad, Dual};
//!
//! let df = grad(|x| x * x + 2.0 * x + 1.0);
//! assert_eq!(df(2.0), 6.0);
//!
//! let df = forward_grad(|x: Dual| x * x * x);
//! assert_eq!(df(2.0), 12.0);
//! ```
//!
//! Or use a [`Tape`] directly, reading gradients off any node afterwards:
//!
//! ```
//! use dualgrad::Tape;
//!
//! let tape = Tape::new();
//! let x = tape.var(2.0);
//! let y = tape.var(3.0);
//! let z = x * y + y;
//! z.backward();
//!
//! assert_eq!(z.value(), 9.0);
//! assert_eq!(x.gradient(), 3.0);
//! assert_eq!(y.gradient(), 3.0);
//! ```
//!
//! Functions written against [`Scalar`] can be differentiated in either mode.
//! Only operations on the differentiable representation are seen: a value
//! computed on plain `f64`s and fed back in is a constant as far as the
//! derivative is concerned.
//!

pub mod dual;
pub mod error;
pub mod op;
pub mod scalar;
pub mod tape;

pub use dual::{Dual, Tangent};
pub use error::{Error, Result};
pub use op::Op;
pub use scalar::{cos, exp, ln, log, powf, sin, tan, Scalar};
pub use tape::{GraphNode, Operand, Tape};

/// Derivative of `f` by reverse mode
///
/// Every call records `f` on a fresh tape, runs one backward pass from the
/// output and returns the gradient of the input leaf. Generic functions are
/// passed through a closure, `grad(|x| f(x))`, so the tape lifetime stays
/// higher-ranked.
pub fn grad<F>(f: F) -> impl Fn(f64) -> f64
where
  F: for<'t> Fn(GraphNode<'t>) -> GraphNode<'t>,
{
  let value_and_grad = value_and_grad(f);
  move |x| value_and_grad(x).1
}

/// Value and derivative of `f` from a single forward and backward pass
pub fn value_and_grad<F>(f: F) -> impl Fn(f64) -> (f64, f64)
where
  F: for<'t> Fn(GraphNode<'t>) -> GraphNode<'t>,
{
  move |x| {
    let tape = Tape::new();
    let input = tape.var(x);
    let output = f(input);
    output.backward();
    (output.value(), input.gradient())
  }
}

/// Same as [`grad`], failing when the value or the derivative is not finite
pub fn try_grad<F>(f: F) -> impl Fn(f64) -> Result<f64>
where
  F: for<'t> Fn(GraphNode<'t>) -> GraphNode<'t>,
{
  let value_and_grad = value_and_grad(f);
  move |x| {
    let (value, gradient) = value_and_grad(x);
    if !value.is_finite() {
      return Err(Error::NonFinite {
        what: "value",
        value,
      });
    }
    if !gradient.is_finite() {
      return Err(Error::NonFinite {
        what: "gradient",
        value: gradient,
      });
    }
    Ok(gradient)
  }
}

/// Derivative of `f` by forward mode
///
/// The input is seeded as `Dual::variable(x)`; the derivative is the tangent
/// of whatever `f` returns, which is 0 when `f` returns a plain number.
pub fn forward_grad<F, R>(f: F) -> impl Fn(f64) -> f64
where
  F: Fn(Dual) -> R,
  R: Tangent,
{
  move |x| f(Dual::variable(x)).tangent()
}

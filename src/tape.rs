//!
//! # tape
//!
//! Reverse-mode engine. A [`Tape`] is an arena of nodes, a [`GraphNode`] is a
//! cheap handle into it (value, index, and a borrow of the tape). Every
//! operation appends a strictly new node whose operands all sit at smaller
//! indices, so the recorded graph is a DAG by construction.
//!

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::ptr;

use bit_set::BitSet;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::Result;
use crate::op::Op;

type NodeIndex = usize;

type Operands = SmallVec<[NodeIndex; 2]>;

#[derive(Debug, Clone, PartialEq)]
struct Node {
  op: Op,
  operands: Operands,
  value: f64,
  gradient: f64,
}

/// Arena holding every node recorded so far
///
/// Nodes are never removed individually; they live until the tape is cleared
/// or dropped, and `clear` takes `&mut self` so no handle can outlive them.
#[derive(Debug, Default)]
pub struct Tape {
  nodes: RefCell<Vec<Node>>,
}

impl Tape {
  pub fn new() -> Self {
    Self {
      nodes: RefCell::new(Vec::new()),
    }
  }

  /// Create an input leaf
  #[inline]
  pub fn var(&self, value: f64) -> GraphNode<'_> {
    self.push(Op::Leaf, Operands::new(), value)
  }

  /// Create a constant leaf; gradients still flow into it, they are simply
  /// never read
  #[inline]
  pub fn constant(&self, value: f64) -> GraphNode<'_> {
    self.push(Op::Constant, Operands::new(), value)
  }

  /// Number of recorded nodes
  pub fn len(&self) -> usize {
    self.nodes.borrow().len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.borrow().is_empty()
  }

  /// Drop every node, keeping the allocation for the next computation
  pub fn clear(&mut self) {
    let nodes = self.nodes.get_mut();
    debug!("clearing tape of {} nodes", nodes.len());
    nodes.clear();
  }

  /// Reset the gradient of every node on the tape to zero
  pub fn zero_grad(&self) {
    let mut nodes = self.nodes.borrow_mut();
    debug!("zeroing gradients of {} nodes", nodes.len());
    for node in nodes.iter_mut() {
      node.gradient = 0.0;
    }
  }

  #[inline]
  pub fn add<'t>(&'t self, a: impl Operand<'t>, b: impl Operand<'t>) -> GraphNode<'t> {
    self.binary(Op::Add, a, b)
  }

  #[inline]
  pub fn sub<'t>(&'t self, a: impl Operand<'t>, b: impl Operand<'t>) -> GraphNode<'t> {
    self.binary(Op::Sub, a, b)
  }

  #[inline]
  pub fn mul<'t>(&'t self, a: impl Operand<'t>, b: impl Operand<'t>) -> GraphNode<'t> {
    self.binary(Op::Mul, a, b)
  }

  #[inline]
  pub fn div<'t>(&'t self, a: impl Operand<'t>, b: impl Operand<'t>) -> GraphNode<'t> {
    self.binary(Op::Div, a, b)
  }

  /// `a^n` for a fixed exponent `n`, which is not itself differentiated
  #[inline]
  pub fn powf<'t>(&'t self, a: impl Operand<'t>, n: f64) -> GraphNode<'t> {
    self.unary(Op::Powf(n), a)
  }

  #[inline]
  pub fn exp<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.unary(Op::Exp, a)
  }

  /// Natural logarithm
  #[inline]
  pub fn ln<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.unary(Op::Ln, a)
  }

  #[inline]
  pub fn sin<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.unary(Op::Sin, a)
  }

  #[inline]
  pub fn cos<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.unary(Op::Cos, a)
  }

  #[inline]
  pub fn tan<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.unary(Op::Tan, a)
  }

  /// Negation is multiplication by the constant -1
  #[inline]
  pub fn neg<'t>(&'t self, a: impl Operand<'t>) -> GraphNode<'t> {
    self.binary(Op::Mul, a, -1.0)
  }

  #[inline]
  fn unary<'t>(&'t self, op: Op, a: impl Operand<'t>) -> GraphNode<'t> {
    let a = a.into_node(self);
    self.apply(op, &[a])
  }

  #[inline]
  fn binary<'t>(&'t self, op: Op, a: impl Operand<'t>, b: impl Operand<'t>) -> GraphNode<'t> {
    let a = a.into_node(self);
    let b = b.into_node(self);
    self.apply(op, &[a, b])
  }

  /// Record `op` over already promoted operands
  fn apply<'t>(&'t self, op: Op, operands: &[GraphNode<'t>]) -> GraphNode<'t> {
    let values: SmallVec<[f64; 2]> = operands.iter().map(|n| n.value).collect();
    let value = op.forward(&values);
    let indices = operands.iter().map(|n| self.own(n)).collect();
    self.push(op, indices, value)
  }

  /// Same as `apply`, rejecting operands outside the operation's domain
  fn try_apply<'t>(&'t self, op: Op, operands: &[GraphNode<'t>]) -> Result<GraphNode<'t>> {
    let values: SmallVec<[f64; 2]> = operands.iter().map(|n| n.value).collect();
    op.check_domain(&values)?;
    Ok(self.apply(op, operands))
  }

  /// Index of a node, asserting that it was recorded on this tape
  #[inline]
  fn own(&self, node: &GraphNode<'_>) -> NodeIndex {
    assert!(
      ptr::eq(node.tape, self),
      "operand node {} was recorded on a different tape",
      node.index
    );
    node.index
  }

  #[inline]
  fn push(&self, op: Op, operands: Operands, value: f64) -> GraphNode<'_> {
    let mut nodes = self.nodes.borrow_mut();
    let index = nodes.len();
    debug_assert!(operands.iter().all(|&operand| operand < index));
    nodes.push(Node {
      op,
      operands,
      value,
      gradient: 0.0,
    });
    GraphNode {
      value,
      index,
      tape: self,
    }
  }

  /// Post-order of the subgraph reachable from `root`; replayed in reverse it
  /// visits every node after all of its consumers
  ///
  /// Panics if the traversal ever re-enters a node still on the current path.
  fn topological_subgraph(&self, root: NodeIndex) -> Vec<NodeIndex> {
    let nodes = self.nodes.borrow();
    let mut stack = vec![(root, false)];
    let mut order = Vec::new();
    let mut visited = BitSet::with_capacity(nodes.len());
    // nodes whose operands are still being explored, i.e. the current dfs path
    let mut open = BitSet::with_capacity(nodes.len());

    while let Some((index, operands_done)) = stack.pop() {
      if operands_done {
        open.remove(index);
        order.push(index);
      } else if visited.insert(index) {
        open.insert(index);
        stack.push((index, true));
        // push in reverse so the first operand is explored first
        for &operand in nodes[index].operands.iter().rev() {
          assert!(
            !open.contains(operand),
            "cycle detected: node {operand} is an operand of its own descendant {index}"
          );
          if !visited.contains(operand) {
            stack.push((operand, false));
          }
        }
      }
    }

    order
  }
}

/// Conversion applied to every operand at the boundary of a combining
/// operation; raw numbers become constant leaves
pub trait Operand<'t> {
  /// Value the operand will have once promoted
  fn operand_value(&self) -> f64;

  fn into_node(self, tape: &'t Tape) -> GraphNode<'t>;
}

impl<'t> Operand<'t> for GraphNode<'t> {
  #[inline(always)]
  fn operand_value(&self) -> f64 {
    self.value
  }

  #[inline(always)]
  fn into_node(self, _tape: &'t Tape) -> GraphNode<'t> {
    self
  }
}

impl<'t> Operand<'t> for &GraphNode<'t> {
  #[inline(always)]
  fn operand_value(&self) -> f64 {
    self.value
  }

  #[inline(always)]
  fn into_node(self, _tape: &'t Tape) -> GraphNode<'t> {
    *self
  }
}

impl<'t> Operand<'t> for f64 {
  #[inline(always)]
  fn operand_value(&self) -> f64 {
    *self
  }

  #[inline(always)]
  fn into_node(self, tape: &'t Tape) -> GraphNode<'t> {
    tape.constant(self)
  }
}

/// A node in the computational graph
///
/// Handles are `Copy`; the value is cached on the handle, the gradient lives on
/// the tape and is read through [`GraphNode::gradient`].
#[derive(Clone, Copy)]
pub struct GraphNode<'t> {
  value: f64,
  index: NodeIndex,
  tape: &'t Tape,
}

impl<'t> GraphNode<'t> {
  #[inline(always)]
  pub fn value(&self) -> f64 {
    self.value
  }

  /// Gradient accumulated by backward passes so far
  #[inline]
  pub fn gradient(&self) -> f64 {
    self.tape.nodes.borrow()[self.index].gradient
  }

  #[inline]
  pub fn op(&self) -> Op {
    self.tape.nodes.borrow()[self.index].op
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.op().arity() == 0
  }

  /// The tape this node was recorded on
  #[inline(always)]
  pub fn tape(&self) -> &'t Tape {
    self.tape
  }

  /// Handles to the operands, in the order they were passed to the operation
  pub fn operands(&self) -> SmallVec<[GraphNode<'t>; 2]> {
    let nodes = self.tape.nodes.borrow();
    nodes[self.index]
      .operands
      .iter()
      .map(|&index| GraphNode {
        value: nodes[index].value,
        index,
        tape: self.tape,
      })
      .collect()
  }

  /// Propagate d(self)/d(node) to every node reachable from `self`
  ///
  /// The root's gradient is seeded to 1; every other reachable node has this
  /// pass's derivative added to its gradient, so repeated passes accumulate
  /// unless the caller zeroes gradients in between.
  pub fn backward(&self) {
    let subgraph = self.tape.topological_subgraph(self.index);
    trace!(
      "backward from node {} over {} nodes",
      self.index,
      subgraph.len()
    );

    let mut nodes = self.tape.nodes.borrow_mut();
    let mut deltas = FxHashMap::with_capacity_and_hasher(subgraph.len(), Default::default());
    deltas.insert(self.index, 1.0);

    for index in subgraph.into_iter().rev() {
      // read phase, a node outside every consumer's path receives nothing
      let upstream = match deltas.get(&index) {
        Some(&v) => v,
        None => continue,
      };

      let node = &nodes[index];
      let values: SmallVec<[f64; 2]> = node.operands.iter().map(|&i| nodes[i].value).collect();

      // write phase, accumulate into operands
      for (&operand, partial) in node.operands.iter().zip(node.op.partials(&values)) {
        *deltas.entry(operand).or_insert(0.0) += partial * upstream;
      }
    }

    for (index, delta) in deltas {
      if index == self.index {
        nodes[index].gradient = 1.0;
      } else {
        nodes[index].gradient += delta;
      }
    }
  }

  /// Reset the gradient of every node reachable from `self`
  pub fn zero_grad(&self) {
    let subgraph = self.tape.topological_subgraph(self.index);
    debug!("zeroing gradients of {} reachable nodes", subgraph.len());
    let mut nodes = self.tape.nodes.borrow_mut();
    for index in subgraph {
      nodes[index].gradient = 0.0;
    }
  }

  #[inline]
  pub fn powf(self, n: f64) -> Self {
    self.tape.powf(self, n)
  }

  #[inline]
  pub fn exp(self) -> Self {
    self.tape.exp(self)
  }

  #[inline]
  pub fn ln(self) -> Self {
    self.tape.ln(self)
  }

  #[inline]
  pub fn sin(self) -> Self {
    self.tape.sin(self)
  }

  #[inline]
  pub fn cos(self) -> Self {
    self.tape.cos(self)
  }

  #[inline]
  pub fn tan(self) -> Self {
    self.tape.tan(self)
  }

  /// Division that fails instead of producing an infinity or NaN
  ///
  /// The divisor is checked before a raw number is promoted, so a rejected
  /// division records nothing.
  pub fn try_div(self, rhs: impl Operand<'t>) -> Result<Self> {
    Op::Div.check_domain(&[self.value, rhs.operand_value()])?;
    let rhs = rhs.into_node(self.tape);
    Ok(self.tape.apply(Op::Div, &[self, rhs]))
  }

  /// Natural logarithm that fails on non-positive values
  pub fn try_ln(self) -> Result<Self> {
    self.tape.try_apply(Op::Ln, &[self])
  }

  /// Power that fails where the real result is undefined
  pub fn try_powf(self, n: f64) -> Result<Self> {
    self.tape.try_apply(Op::Powf(n), &[self])
  }
}

impl fmt::Debug for GraphNode<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let nodes = self.tape.nodes.borrow();
    let node = &nodes[self.index];
    f.debug_struct("GraphNode")
      .field("value", &self.value)
      .field("gradient", &node.gradient)
      .field("op", &format_args!("{}", node.op))
      .field("index", &self.index)
      .finish()
  }
}

impl<'t> Add for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn add(self, other: Self) -> Self::Output {
    self.tape.add(self, other)
  }
}

impl<'t> Add<f64> for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn add(self, other: f64) -> Self::Output {
    self.tape.add(self, other)
  }
}

impl<'t> Add<GraphNode<'t>> for f64 {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn add(self, other: GraphNode<'t>) -> Self::Output {
    other.tape.add(self, other)
  }
}

impl<'t> Sub for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn sub(self, other: Self) -> Self::Output {
    self.tape.sub(self, other)
  }
}

impl<'t> Sub<f64> for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn sub(self, other: f64) -> Self::Output {
    self.tape.sub(self, other)
  }
}

impl<'t> Sub<GraphNode<'t>> for f64 {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn sub(self, other: GraphNode<'t>) -> Self::Output {
    other.tape.sub(self, other)
  }
}

impl<'t> Mul for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn mul(self, other: Self) -> Self::Output {
    self.tape.mul(self, other)
  }
}

impl<'t> Mul<f64> for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn mul(self, other: f64) -> Self::Output {
    self.tape.mul(self, other)
  }
}

impl<'t> Mul<GraphNode<'t>> for f64 {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn mul(self, other: GraphNode<'t>) -> Self::Output {
    other.tape.mul(self, other)
  }
}

impl<'t> Div for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn div(self, other: Self) -> Self::Output {
    self.tape.div(self, other)
  }
}

impl<'t> Div<f64> for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn div(self, other: f64) -> Self::Output {
    self.tape.div(self, other)
  }
}

impl<'t> Div<GraphNode<'t>> for f64 {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn div(self, other: GraphNode<'t>) -> Self::Output {
    other.tape.div(self, other)
  }
}

impl<'t> Neg for GraphNode<'t> {
  type Output = GraphNode<'t>;

  #[inline(always)]
  fn neg(self) -> Self::Output {
    self.tape.neg(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  use approx::assert_relative_eq;

  use crate::error::Error;

  mod node {
    use super::*;

    const PAIRS: [(f64, f64); 5] = [(3.0, 4.0), (-2.5, 0.0), (0.0, -7.0), (1.25, -0.5), (-3.0, -4.0)];

    #[test]
    fn value() {
      let tape = Tape::new();
      let a = tape.var(1.3);
      assert_eq!(a.value(), 1.3);
      assert_eq!(a.gradient(), 0.0);
      assert!(a.is_leaf());
      assert_eq!(a.op(), Op::Leaf);
    }

    #[test]
    fn add_var() {
      for (x, y) in PAIRS {
        let tape = Tape::new();
        let a = tape.var(x);
        let b = tape.var(y);
        let c = a + b;
        assert_eq!(c.value(), x + y);
        c.backward();
        // dc/da = 1
        // dc/db = 1
        assert_eq!(a.gradient(), 1.0);
        assert_eq!(b.gradient(), 1.0);
      }
    }

    #[test]
    fn add_f64() {
      let tape = Tape::new();
      let a = tape.var(3.0);
      let c = a + 5.0;
      assert_eq!(c.value(), 3.0 + 5.0);
      c.backward();
      assert_eq!(a.gradient(), 1.0);
      // the raw number was promoted to a constant leaf
      assert_eq!(c.operands()[1].op(), Op::Constant);
      assert_eq!(c.operands()[1].value(), 5.0);
    }

    #[test]
    fn sub_var() {
      let tape = Tape::new();
      let a = tape.var(7.0);
      let b = tape.var(4.0);
      let c = a - b;
      assert_eq!(c.value(), 7.0 - 4.0);
      c.backward();
      // dc/da = 1
      // dc/db = -1
      assert_eq!(a.gradient(), 1.0);
      assert_eq!(b.gradient(), -1.0);
    }

    #[test]
    fn reflected_sub() {
      let tape = Tape::new();
      let a = tape.var(7.0);
      let c = 10.0 - a;
      assert_eq!(c.value(), 3.0);
      c.backward();
      assert_eq!(a.gradient(), -1.0);
    }

    #[test]
    fn mul_var() {
      for (x, y) in PAIRS {
        let tape = Tape::new();
        let a = tape.var(x);
        let b = tape.var(y);
        let c = a * b;
        assert_eq!(c.value(), x * y);
        c.backward();
        // dc/da = b
        // dc/db = a
        assert_eq!(a.gradient(), y);
        assert_eq!(b.gradient(), x);
      }
    }

    #[test]
    fn reflected_mul() {
      let tape = Tape::new();
      let a = tape.var(3.0);
      let c = 5.0 * a;
      let d = a * 5.0;
      assert_eq!(c.value(), d.value());
      c.backward();
      assert_eq!(a.gradient(), 5.0);
    }

    #[test]
    fn div_var() {
      let tape = Tape::new();
      let a = tape.var(6.0);
      let b = tape.var(3.0);
      let c = a / b;
      assert_eq!(c.value(), 6.0 / 3.0);
      c.backward();
      // dc/da = 1/b
      // dc/db = -a/b^2
      assert_eq!(a.gradient(), 1.0 / 3.0);
      assert_eq!(b.gradient(), -6.0 / (3.0 * 3.0));
    }

    #[test]
    fn reflected_div() {
      let tape = Tape::new();
      let a = tape.var(4.0);
      let c = 2.0 / a;
      assert_eq!(c.value(), 0.5);
      c.backward();
      // d(2/a)/da = -2/a^2
      assert_eq!(a.gradient(), -2.0 / 16.0);
    }

    #[test]
    fn neg() {
      let tape = Tape::new();
      let a = tape.var(2.5);
      let c = -a;
      assert_eq!(c.value(), -2.5);
      assert_eq!(c.op(), Op::Mul);
      c.backward();
      assert_eq!(a.gradient(), -1.0);
    }

    #[test]
    fn powf() {
      let tape = Tape::new();
      let a = tape.var(2.0);
      let b = a.powf(3.0);
      assert_eq!(b.value(), f64::powf(2.0, 3.0));
      b.backward();
      // db/da = 3a^(3-1)
      assert_eq!(a.gradient(), 3.0 * f64::powf(2.0, 3.0 - 1.0));
    }

    #[test]
    fn exp() {
      let tape = Tape::new();
      let a = tape.var(1.3);
      let b = a.exp();
      assert_eq!(b.value(), f64::exp(1.3));
      b.backward();
      assert_eq!(a.gradient(), f64::exp(1.3));
    }

    #[test]
    fn ln() {
      let tape = Tape::new();
      let a = tape.var(5.6);
      let b = a.ln();
      assert_eq!(b.value(), f64::ln(5.6));
      b.backward();
      assert_eq!(a.gradient(), 1.0 / 5.6);
    }

    #[test]
    fn sin() {
      let tape = Tape::new();
      let a = tape.var(1.3);
      let b = a.sin();
      assert_eq!(b.value(), f64::sin(1.3));
      b.backward();
      assert_eq!(a.gradient(), f64::cos(1.3));
    }

    #[test]
    fn cos() {
      let tape = Tape::new();
      let a = tape.var(3.1);
      let b = a.cos();
      assert_eq!(b.value(), f64::cos(3.1));
      b.backward();
      assert_eq!(a.gradient(), -f64::sin(3.1));
    }

    #[test]
    fn tan() {
      let tape = Tape::new();
      let a = tape.var(5.6);
      let b = a.tan();
      assert_eq!(b.value(), f64::tan(5.6));
      b.backward();
      // sec^2(a), computed as 1 + tan^2(a)
      assert_relative_eq!(a.gradient(), 1.0 / f64::cos(5.6).powi(2), max_relative = 1e-12);
    }

    #[test]
    fn debug() {
      let tape = Tape::new();
      let a = tape.var(2.0);
      let b = a.powf(2.0);
      let s = format!("{b:?}");
      assert!(s.contains("value: 4.0"));
      assert!(s.contains("op: **2"));
    }
  }

  mod checked {
    use super::*;

    #[test]
    fn try_div() {
      let tape = Tape::new();
      let a = tape.var(1.0);
      let before = tape.len();
      assert!(matches!(
        a.try_div(0.0),
        Err(Error::Domain { op: Op::Div, .. })
      ));
      // neither the divisor nor the division was recorded
      assert_eq!(tape.len(), before);
      let zero = tape.constant(0.0);
      assert!(a.try_div(&zero).is_err());
      assert_eq!(tape.len(), before + 1);
      let c = a.try_div(4.0).unwrap();
      assert_eq!(c.value(), 0.25);
      // constant and quotient
      assert_eq!(tape.len(), before + 3);
    }

    #[test]
    fn try_ln() {
      let tape = Tape::new();
      assert!(tape.var(-2.0).try_ln().is_err());
      assert!(tape.var(0.0).try_ln().is_err());
      let b = tape.var(1.0).try_ln().unwrap();
      assert_eq!(b.value(), 0.0);
    }

    #[test]
    fn try_powf() {
      let tape = Tape::new();
      assert!(tape.var(-8.0).try_powf(1.0 / 3.0).is_err());
      assert!(tape.var(0.0).try_powf(-1.0).is_err());
      assert_eq!(tape.var(-2.0).try_powf(2.0).unwrap().value(), 4.0);
    }

    #[test]
    fn unchecked_follows_ieee() {
      let tape = Tape::new();
      let a = tape.var(1.0);
      assert_eq!((a / 0.0).value(), f64::INFINITY);
      assert!(tape.var(-1.0).ln().value().is_nan());
    }
  }

  mod backward {
    use super::*;

    #[test]
    fn fan_out() {
      let tape = Tape::new();
      let x = tape.var(2.0);
      let y = tape.var(3.0);
      let z = x * y + y;
      assert_eq!(z.value(), 9.0);
      z.backward();
      // dz/dx = y
      // dz/dy = x + 1, summed over both uses of y
      assert_eq!(x.gradient(), 3.0);
      assert_eq!(y.gradient(), 3.0);
      assert_eq!(z.gradient(), 1.0);
    }

    #[test]
    fn fan_out_other_operand() {
      let tape = Tape::new();
      let x = tape.var(2.0);
      let y = tape.var(3.0);
      let z = x * y + x;
      assert_eq!(z.value(), 8.0);
      z.backward();
      assert_eq!(x.gradient(), 4.0);
      assert_eq!(y.gradient(), 2.0);
    }

    #[test]
    fn square() {
      let tape = Tape::new();
      let x = tape.var(3.0);
      let y = x * x;
      y.backward();
      assert_eq!(x.gradient(), 6.0);
    }

    #[test]
    fn nested() {
      // gradients must reach operands more than one layer below the root
      let tape = Tape::new();
      let x = tape.var(1.0);
      let y = x.exp().sin();
      y.backward();
      let e = f64::exp(1.0);
      assert_relative_eq!(x.gradient(), e.cos() * e);
    }

    #[test]
    fn diamond() {
      let tape = Tape::new();
      let x = tape.var(1.5);
      let a = x * 2.0;
      let b = x * 3.0;
      let c = a * b;
      // c = 6x^2, dc/dx = 12x
      c.backward();
      assert_relative_eq!(x.gradient(), 12.0 * 1.5);
      assert_eq!(a.gradient(), b.value());
      assert_eq!(b.gradient(), a.value());
    }

    #[test]
    fn intermediate_root() {
      let tape = Tape::new();
      let x = tape.var(2.0);
      let y = tape.var(5.0);
      let a = x * x;
      let _unused = a + y;
      a.backward();
      assert_eq!(x.gradient(), 4.0);
      // y is not reachable from a
      assert_eq!(y.gradient(), 0.0);
    }

    #[test]
    fn unrelated_leaf() {
      let tape = Tape::new();
      let a = tape.var(2.0);
      let b = tape.var(3.0);
      a.backward();
      assert_eq!(a.gradient(), 1.0);
      assert_eq!(b.gradient(), 0.0);
    }

    #[test]
    fn accumulates() {
      let tape = Tape::new();
      let x = tape.var(2.0);
      let y = tape.var(3.0);
      let z = x * y + y;
      z.backward();
      z.backward();
      assert_eq!(x.gradient(), 6.0);
      assert_eq!(y.gradient(), 6.0);
      assert_eq!(z.gradient(), 1.0);
    }

    #[test]
    fn idempotent_after_zeroing() {
      let tape = Tape::new();
      let x = tape.var(0.7);
      let z = (x * x).sin() / (x + 2.0);
      z.backward();
      let first = x.gradient();
      tape.zero_grad();
      assert_eq!(x.gradient(), 0.0);
      z.backward();
      assert_eq!(x.gradient(), first);
      z.zero_grad();
      assert_eq!(x.gradient(), 0.0);
      z.backward();
      assert_eq!(x.gradient(), first);
    }

    #[test]
    fn deep_chain() {
      let tape = Tape::new();
      let x = tape.var(0.5);
      let mut y = x;
      for _ in 0..100_000 {
        y = y + 1.0;
      }
      y.backward();
      assert_eq!(x.gradient(), 1.0);
    }
  }

  mod tape {
    use super::*;

    #[test]
    fn len() {
      let mut tape = Tape::new();
      assert!(tape.is_empty());
      {
        let a = tape.var(1.0);
        let _b = a + 2.0;
      }
      // leaf, promoted constant, sum
      assert_eq!(tape.len(), 3);
      tape.clear();
      assert!(tape.is_empty());
    }

    #[test]
    fn named_ops() {
      let tape = Tape::new();
      let c = tape.add(2.0, 3.0);
      assert_eq!(c.value(), 5.0);
      let x = tape.var(0.25);
      let y = tape.mul(tape.exp(x), tape.ln(4.0));
      y.backward();
      assert_relative_eq!(x.gradient(), f64::exp(0.25) * f64::ln(4.0));
    }

    #[test]
    fn operands() {
      let tape = Tape::new();
      let a = tape.var(1.0);
      let b = tape.var(2.0);
      let c = a - b;
      let ops = c.operands();
      assert_eq!(ops.len(), 2);
      assert_eq!(ops[0].value(), 1.0);
      assert_eq!(ops[1].value(), 2.0);
      assert!(a.operands().is_empty());
    }

    #[test]
    #[should_panic(expected = "different tape")]
    fn cross_tape() {
      let first = Tape::new();
      let second = Tape::new();
      let a = first.var(1.0);
      let b = second.var(2.0);
      let _ = a + b;
    }

    #[test]
    #[should_panic(expected = "cycle detected")]
    fn cycle() {
      let tape = Tape::new();
      let a = tape.var(1.0);
      let b = a + 1.0;
      // corrupt the arena so the leaf points at its own consumer
      tape.nodes.borrow_mut()[a.index].operands.push(b.index);
      b.backward();
    }
  }
}

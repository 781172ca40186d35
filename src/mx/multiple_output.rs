//! One invocation, several outputs.
//!
//! A call node whose function has more than one output is a *primary*
//! record that is never used as a value itself. Each output is reached
//! through a view node carrying the output index and holding the primary as
//! its only dependency. Views answer every per-output query by delegating
//! to the primary, and any number of views of the same `(primary, index)`
//! pair denote the same value: they share one work slot in every pass.

use crate::error::{arity, Result};
use crate::float::Float;
use crate::function::FunctionRef;

use super::{Mx, Op};

impl<F: Float> Mx<F> {
    /// Number of outputs of the underlying operation.
    pub fn n_out(&self) -> usize {
        match &self.0.op {
            Op::Call(f) => f.n_out(),
            _ => 1,
        }
    }

    /// The invocation record behind a view, or `self` for any other node.
    pub fn primary(&self) -> &Mx<F> {
        match self.0.op {
            Op::Output(_) => &self.0.deps[0],
            _ => self,
        }
    }

    pub fn is_output_view(&self) -> bool {
        matches!(self.0.op, Op::Output(_))
    }

    /// The function invoked by this call node (or by the call a view refers to).
    pub fn function(&self) -> Option<&FunctionRef<F>> {
        match &self.primary().0.op {
            Op::Call(f) => Some(f),
            _ => None,
        }
    }

    /// Which function output this node denotes: `Some(i)` for views and for
    /// single-output call nodes, `None` for everything else.
    pub fn function_output(&self) -> Option<usize> {
        match &self.0.op {
            Op::Output(i) => Some(*i),
            Op::Call(f) if f.n_out() == 1 => Some(0),
            _ => None,
        }
    }

    /// Argument `i` of the invocation, as projected at construction.
    pub fn function_input(&self, i: usize) -> Option<&Mx<F>> {
        let p = self.primary();
        match p.0.op {
            Op::Call(_) => p.0.deps.get(i),
            _ => None,
        }
    }

    /// Handle to output `i` of the underlying operation.
    ///
    /// Single-output nodes are their own output. For multi-output calls a
    /// fresh view is created; it shares its work slot with every other view
    /// of the same output.
    pub fn get_output(&self, i: usize) -> Result<Mx<F>> {
        let p = self.primary();
        let n = p.n_out();
        if i >= n {
            return Err(arity(
                p.op_name(),
                format!("output {i} requested from an operation with {n} outputs"),
            ));
        }
        if n == 1 {
            return Ok(p.clone());
        }
        Ok(Mx::from_parts(Op::Output(i), vec![p.clone()], Vec::new()))
    }

    /// Canonical handles to every output, in order.
    pub fn outputs(&self) -> Result<Vec<Mx<F>>> {
        (0..self.primary().n_out()).map(|i| self.get_output(i)).collect()
    }
}

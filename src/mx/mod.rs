//! Matrix-valued expression graph.
//!
//! An [`Mx`] is a cheap, shareable handle to an immutable node. Nodes never
//! change after construction, so one node may have any number of parents and
//! graphs are freely shared across threads. Node identity ([`Mx::id`]) is
//! what scheduling, cloning and code emission key on; structurally equal but
//! distinct nodes are never merged.

use std::fmt;
use std::sync::Arc;

use crate::error::{arity, check_len, Result};
use crate::float::Float;
use crate::function::FunctionRef;
use crate::opcode::{self, OpCode, ScalarBuilder};
use crate::sparsity::Sparsity;

mod call;
mod eval;
mod multiple_output;
mod project;

pub use self::project::project;
pub(crate) use self::call::accumulate;
pub(crate) use self::project::project_arg;

/// Operation carried by a node.
pub enum Op<F: Float> {
    /// Free symbolic leaf.
    Symbol(String),
    /// Constant nonzeros laid out by the node's sparsity.
    Constant(Vec<F>),
    /// For every target nonzero, the source nonzero it copies (`None` = zero fill).
    Project(Vec<Option<usize>>),
    /// Elementwise unary op; operand and result share one pattern.
    Unary(OpCode),
    /// Elementwise integer power.
    Powi(i32),
    /// Elementwise binary op; both operands share the result's pattern.
    Binary(OpCode),
    /// Invocation of a reusable function, one dependency per function input.
    Call(FunctionRef<F>),
    /// View onto output `i` of the call node held as the only dependency.
    Output(usize),
}

pub(crate) struct Node<F: Float> {
    op: Op<F>,
    deps: Vec<Mx<F>>,
    /// One pattern per output; empty for output views, which delegate.
    sparsity: Vec<Sparsity>,
}

/// Shared handle to an expression node.
pub struct Mx<F: Float>(Arc<Node<F>>);

impl<F: Float> Clone for Mx<F> {
    fn clone(&self) -> Self {
        Mx(Arc::clone(&self.0))
    }
}

impl<F: Float> Mx<F> {
    pub(crate) fn from_parts(op: Op<F>, deps: Vec<Mx<F>>, sparsity: Vec<Sparsity>) -> Self {
        Mx(Arc::new(Node { op, deps, sparsity }))
    }

    /// Symbolic leaf with the given pattern.
    pub fn symbol(name: impl Into<String>, sp: Sparsity) -> Self {
        Self::from_parts(Op::Symbol(name.into()), Vec::new(), vec![sp])
    }

    /// Dense symbolic leaf.
    pub fn sym(name: impl Into<String>, nrow: usize, ncol: usize) -> Self {
        Self::symbol(name, Sparsity::dense(nrow, ncol))
    }

    /// Constant with the given nonzero values.
    pub fn constant(sp: Sparsity, values: Vec<F>) -> Result<Self> {
        check_len("constant values", sp.nnz(), values.len())?;
        Ok(Self::from_parts(Op::Constant(values), Vec::new(), vec![sp]))
    }

    /// Constant whose every nonzero equals `value`.
    pub fn filled(sp: Sparsity, value: F) -> Self {
        let values = vec![value; sp.nnz()];
        Self::from_parts(Op::Constant(values), Vec::new(), vec![sp])
    }

    pub fn scalar(value: F) -> Self {
        Self::filled(Sparsity::scalar(), value)
    }

    /// Dense constant from column-major values.
    pub fn dense(nrow: usize, ncol: usize, values: Vec<F>) -> Result<Self> {
        Self::constant(Sparsity::dense(nrow, ncol), values)
    }

    /// `nrow x ncol` matrix without any structural nonzero.
    pub fn zeros(nrow: usize, ncol: usize) -> Self {
        Self::from_parts(
            Op::Constant(Vec::new()),
            Vec::new(),
            vec![Sparsity::empty(nrow, ncol)],
        )
    }

    /// Node identity, stable while any handle to the node is alive.
    #[inline]
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Mx<F>) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn op(&self) -> &Op<F> {
        &self.0.op
    }

    #[inline]
    pub fn deps(&self) -> &[Mx<F>] {
        &self.0.deps
    }

    #[inline]
    pub fn dep(&self, i: usize) -> &Mx<F> {
        &self.0.deps[i]
    }

    #[inline]
    pub fn n_dep(&self) -> usize {
        self.0.deps.len()
    }

    /// Pattern of the value this handle denotes.
    pub fn sparsity(&self) -> &Sparsity {
        match self.0.op {
            Op::Output(i) => self.0.deps[0].output_sparsity(i),
            _ => &self.0.sparsity[0],
        }
    }

    /// Pattern of output `o` of the underlying (primary) node.
    pub fn output_sparsity(&self, o: usize) -> &Sparsity {
        &self.primary().0.sparsity[o]
    }

    pub fn shape(&self) -> (usize, usize) {
        self.sparsity().shape()
    }

    pub fn nnz(&self) -> usize {
        self.sparsity().nnz()
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.0.op, Op::Symbol(_))
    }

    /// Symbol name, for symbolic leaves.
    pub fn name(&self) -> Option<&str> {
        match &self.0.op {
            Op::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn constant_values(&self) -> Option<&[F]> {
        match &self.0.op {
            Op::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Structurally or numerically all-zero constant.
    pub fn is_zero(&self) -> bool {
        self.constant_values()
            .map_or(false, |v| v.iter().all(|x| x.is_zero()))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.0.op, Op::Symbol(_) | Op::Constant(_))
    }

    /// `(ni, nr)` scratch this node needs when evaluated.
    pub fn workspace_requirement(&self) -> (usize, usize) {
        match &self.0.op {
            Op::Call(f) => f.workspace_requirement(),
            _ => (0, 0),
        }
    }

    /// Work-slot key: `(primary identity, output index)`.
    pub(crate) fn key(&self) -> (usize, usize) {
        match self.0.op {
            Op::Output(i) => (self.0.deps[0].id(), i),
            _ => (self.id(), 0),
        }
    }

    /// Elementwise unary operation. Ops that map zero to a nonzero value
    /// densify their operand first.
    pub fn unary(&self, op: OpCode) -> Result<Self> {
        if opcode::is_binary(op) || matches!(op, OpCode::Input | OpCode::Const | OpCode::Powi) {
            return Err(arity(
                format!("{op:?}"),
                "not a unary elementwise operation",
            ));
        }
        let a = if opcode::preserves_zero(op) {
            self.clone()
        } else {
            self.densified()?
        };
        let sp = a.sparsity().clone();
        Ok(Self::from_parts(Op::Unary(op), vec![a], vec![sp]))
    }

    /// Elementwise integer power. Non-positive exponents densify.
    pub fn powi(&self, exp: i32) -> Result<Self> {
        let a = if exp > 0 {
            self.clone()
        } else {
            self.densified()?
        };
        let sp = a.sparsity().clone();
        Ok(Self::from_parts(Op::Powi(exp), vec![a], vec![sp]))
    }

    /// Elementwise binary operation. Both operands are projected onto the
    /// union of their patterns; shapes must agree.
    pub fn binary(op: OpCode, a: &Mx<F>, b: &Mx<F>) -> Result<Self> {
        if !opcode::is_binary(op) {
            return Err(arity(format!("{op:?}"), "not a binary elementwise operation"));
        }
        if !a.sparsity().same_shape(b.sparsity()) {
            return Err(arity(
                format!("{op:?}"),
                format!("operands are {} and {}", a.sparsity().dim(), b.sparsity().dim()),
            ));
        }
        let sp = a.sparsity().union(b.sparsity())?;
        let a = project(a, &sp)?;
        let b = project(b, &sp)?;
        Ok(Self::from_parts(Op::Binary(op), vec![a, b], vec![sp]))
    }

    /// Projection onto `sp` (see [`project`]).
    pub fn project(&self, sp: &Sparsity) -> Result<Self> {
        project(self, sp)
    }

    fn densified(&self) -> Result<Self> {
        let (nrow, ncol) = self.shape();
        project(self, &Sparsity::dense(nrow, ncol))
    }

    /// Short description of the operation, for diagnostics.
    pub fn op_name(&self) -> String {
        match &self.0.op {
            Op::Symbol(name) => name.clone(),
            Op::Constant(_) => "const".to_string(),
            Op::Project(_) => "project".to_string(),
            Op::Unary(op) => format!("{op:?}").to_lowercase(),
            Op::Powi(exp) => format!("powi({exp})"),
            Op::Binary(op) => format!("{op:?}").to_lowercase(),
            Op::Call(f) => format!("call({})", f.name()),
            Op::Output(i) => format!("output({i})"),
        }
    }
}

macro_rules! unary_methods {
    ($($name:ident => $op:ident),* $(,)?) => {
        impl<F: Float> Mx<F> {
            $(
                pub fn $name(&self) -> Result<Self> {
                    self.unary(OpCode::$op)
                }
            )*
        }
    };
}

unary_methods! {
    recip => Recip,
    sqrt => Sqrt,
    exp => Exp,
    ln => Ln,
    sin => Sin,
    cos => Cos,
    tan => Tan,
    tanh => Tanh,
    abs => Abs,
    signum => Signum,
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<'a, 'b, F: Float> std::ops::$trait<&'b Mx<F>> for &'a Mx<F> {
            type Output = Result<Mx<F>>;

            fn $method(self, rhs: &'b Mx<F>) -> Result<Mx<F>> {
                Mx::binary(OpCode::$op, self, rhs)
            }
        }
    };
}

binary_operator!(Add, add, Add);
binary_operator!(Sub, sub, Sub);
binary_operator!(Mul, mul, Mul);
binary_operator!(Div, div, Div);

impl<'a, F: Float> std::ops::Neg for &'a Mx<F> {
    type Output = Result<Mx<F>>;

    fn neg(self) -> Result<Mx<F>> {
        self.unary(OpCode::Neg)
    }
}

impl<F: Float> fmt::Debug for Mx<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dim = if self.0.sparsity.is_empty() && !self.is_output_view() {
            "-".to_string()
        } else {
            self.sparsity().dim()
        };
        write!(f, "Mx({} {dim}, #{:x})", self.op_name(), self.id())
    }
}

/// Records symbolic partials as graph nodes.
pub(crate) struct MxBuilder;

impl<F: Float> ScalarBuilder<F> for MxBuilder {
    type Expr = Mx<F>;

    fn constant_like(&mut self, like: &Mx<F>, value: F) -> Result<Mx<F>> {
        Ok(Mx::filled(like.sparsity().clone(), value))
    }

    fn unary(&mut self, op: OpCode, a: &Mx<F>) -> Result<Mx<F>> {
        a.unary(op)
    }

    fn binary(&mut self, op: OpCode, a: &Mx<F>, b: &Mx<F>) -> Result<Mx<F>> {
        Mx::binary(op, a, b)
    }

    fn powi(&mut self, a: &Mx<F>, exp: i32) -> Result<Mx<F>> {
        a.powi(exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_projects_onto_union() {
        let a = Mx::<f64>::symbol("a", Sparsity::from_triplets(2, 1, &[0], &[0]).unwrap());
        let b = Mx::<f64>::sym("b", 2, 1);
        let c = (&a + &b).unwrap();
        assert!(c.sparsity().is_dense());
        assert!(matches!(c.dep(0).op(), Op::Project(_)));
        assert!(c.dep(1).ptr_eq(&b));
    }

    #[test]
    fn zero_breaking_unary_densifies() {
        let x = Mx::<f64>::symbol("x", Sparsity::empty(2, 2));
        let e = x.exp().unwrap();
        assert!(e.sparsity().is_dense());
        let s = x.sin().unwrap();
        assert!(s.sparsity().is_empty());
    }

    #[test]
    fn shape_mismatch_is_an_arity_error() {
        let a = Mx::<f64>::sym("a", 2, 1);
        let b = Mx::<f64>::sym("b", 1, 2);
        assert!(matches!(&a * &b, Err(crate::Error::ArityMismatch { .. })));
    }
}

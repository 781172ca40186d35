//! Per-node entries for every evaluation mode.
//!
//! The scheduler walks primaries in dependency order and hands each one its
//! argument and result buffers; these methods interpret the node's
//! operation in the requested mode. Call nodes delegate to their function
//! (see `call.rs`); views are never evaluated, their primary is.

use crate::codegen::CodeGenerator;
use crate::error::{Error, Result};
use crate::float::Float;
use crate::function::Bvec;
use crate::opcode::{self, chain, partials, OpCode};
use crate::sx::SxTape;

use super::call::{call_emit, call_forward, call_reverse, create_primary};
use super::{accumulate, project, Mx, MxBuilder, Op};

impl<F: Float> Mx<F> {
    fn not_evaluable(&self) -> Error {
        match &self.0.op {
            Op::Symbol(name) => Error::FreeVariable(name.clone()),
            _ => crate::error::arity(self.op_name(), "output views are evaluated through their primary"),
        }
    }

    pub(crate) fn eval_numeric(
        &self,
        arg: &[&[F]],
        res: &mut [&mut [F]],
        iw: &mut [usize],
        rw: &mut [F],
    ) -> Result<()> {
        match &self.0.op {
            Op::Constant(v) => res[0].copy_from_slice(v),
            Op::Project(map) => {
                for (r, m) in res[0].iter_mut().zip(map) {
                    *r = m.map_or_else(F::zero, |k| arg[0][k]);
                }
            }
            Op::Unary(op) => {
                for (r, &a) in res[0].iter_mut().zip(arg[0]) {
                    *r = opcode::eval_forward(*op, a, F::zero());
                }
            }
            Op::Powi(exp) => {
                for (r, &a) in res[0].iter_mut().zip(arg[0]) {
                    *r = a.powi(*exp);
                }
            }
            Op::Binary(op) => {
                for ((r, &a), &b) in res[0].iter_mut().zip(arg[0]).zip(arg[1]) {
                    *r = opcode::eval_forward(*op, a, b);
                }
            }
            Op::Call(f) => f.eval_numeric(arg, res, iw, rw)?,
            Op::Symbol(_) | Op::Output(_) => return Err(self.not_evaluable()),
        }
        Ok(())
    }

    pub(crate) fn eval_sx(&self, tape: &mut SxTape<F>, arg: &[&[u32]]) -> Result<Vec<Vec<u32>>> {
        Ok(match &self.0.op {
            Op::Constant(v) => vec![v.iter().map(|&c| tape.push_const(c)).collect()],
            Op::Project(map) => {
                let mut zero = None;
                let out = map
                    .iter()
                    .map(|m| match m {
                        Some(k) => arg[0][*k],
                        None => *zero.get_or_insert_with(|| tape.push_const(F::zero())),
                    })
                    .collect();
                vec![out]
            }
            Op::Unary(op) => vec![arg[0].iter().map(|&a| tape.push_unary(*op, a)).collect()],
            Op::Powi(exp) => vec![arg[0].iter().map(|&a| tape.push_powi(a, *exp)).collect()],
            Op::Binary(op) => vec![arg[0]
                .iter()
                .zip(arg[1])
                .map(|(&a, &b)| tape.push_op(*op, a, b))
                .collect()],
            Op::Call(f) => f.eval_sx(tape, arg)?,
            Op::Symbol(_) | Op::Output(_) => return Err(self.not_evaluable()),
        })
    }

    /// Re-create this node on new dependencies, going through the same
    /// constructor (and therefore the same projections) as the original.
    ///
    /// Leaves are returned as is. Views are re-created on `deps[0]`, the new
    /// primary.
    pub(crate) fn rebuild(&self, deps: Vec<Mx<F>>) -> Result<Mx<F>> {
        match &self.0.op {
            Op::Symbol(_) | Op::Constant(_) => Ok(self.clone()),
            Op::Project(_) => project(&deps[0], self.sparsity()),
            Op::Unary(op) => deps[0].unary(*op),
            Op::Powi(exp) => deps[0].powi(*exp),
            Op::Binary(op) => Mx::binary(*op, &deps[0], &deps[1]),
            Op::Call(f) => create_primary(f, &deps),
            Op::Output(i) => deps[0].get_output(*i),
        }
    }

    /// Forward sensitivities: `fseed[d][j]` is the tangent of dependency `j`
    /// in direction `d`; returns tangents indexed `[d][o]`. `None` marks a
    /// structurally zero tangent.
    pub(crate) fn eval_forward(
        &self,
        fseed: &[Vec<Option<Mx<F>>>],
    ) -> Result<Vec<Vec<Option<Mx<F>>>>> {
        match &self.0.op {
            Op::Call(f) => call_forward(self, f, fseed),
            Op::Constant(_) => Ok(vec![vec![None]; fseed.len()]),
            Op::Project(_) => fseed
                .iter()
                .map(|seed| match &seed[0] {
                    Some(t) => Ok(vec![Some(project(t, self.sparsity())?)]),
                    None => Ok(vec![None]),
                })
                .collect(),
            Op::Unary(_) | Op::Powi(_) | Op::Binary(_) => {
                let (op, exp) = self.elementwise();
                let a = self.dep(0);
                let b = self.0.deps.get(1).unwrap_or(a);
                let (pa, pb) = partials::<F, _>(&mut MxBuilder, op, a, b, self, exp)?;
                let mut out = Vec::with_capacity(fseed.len());
                for seed in fseed {
                    let da = match &seed[0] {
                        Some(t) => chain::<F, _>(&mut MxBuilder, &pa, t)?,
                        None => None,
                    };
                    let db = match seed.get(1) {
                        Some(Some(t)) => chain::<F, _>(&mut MxBuilder, &pb, t)?,
                        _ => None,
                    };
                    let t = opcode::accumulate::<F, _>(&mut MxBuilder, da, db)?;
                    out.push(vec![match t {
                        Some(t) => Some(project(&t, self.sparsity())?),
                        None => None,
                    }]);
                }
                Ok(out)
            }
            Op::Symbol(_) | Op::Output(_) => Err(self.not_evaluable()),
        }
    }

    /// Reverse sensitivities: `aseed[d][o]` is the adjoint of output `o`;
    /// contributions are *added* into `asens[d][j]` for every dependency `j`.
    pub(crate) fn eval_reverse(
        &self,
        aseed: &[Vec<Option<Mx<F>>>],
        asens: &mut [Vec<Option<Mx<F>>>],
    ) -> Result<()> {
        match &self.0.op {
            Op::Call(f) => call_reverse(self, f, aseed, asens),
            Op::Constant(_) => Ok(()),
            Op::Project(_) => {
                let src = self.dep(0).sparsity();
                for (seed, sens) in aseed.iter().zip(asens.iter_mut()) {
                    if let Some(s) = &seed[0] {
                        accumulate(&mut sens[0], project(s, src)?)?;
                    }
                }
                Ok(())
            }
            Op::Unary(_) | Op::Powi(_) | Op::Binary(_) => {
                let (op, exp) = self.elementwise();
                let a = self.dep(0);
                let b = self.0.deps.get(1).unwrap_or(a);
                let live = aseed.iter().any(|s| s[0].is_some());
                if !live {
                    return Ok(());
                }
                let (pa, pb) = partials::<F, _>(&mut MxBuilder, op, a, b, self, exp)?;
                for (seed, sens) in aseed.iter().zip(asens.iter_mut()) {
                    let Some(s) = &seed[0] else {
                        continue;
                    };
                    if let Some(t) = chain::<F, _>(&mut MxBuilder, &pa, s)? {
                        accumulate(&mut sens[0], project(&t, a.sparsity())?)?;
                    }
                    if opcode::is_binary(op) {
                        if let Some(t) = chain::<F, _>(&mut MxBuilder, &pb, s)? {
                            accumulate(&mut sens[1], project(&t, b.sparsity())?)?;
                        }
                    }
                }
                Ok(())
            }
            Op::Symbol(_) | Op::Output(_) => Err(self.not_evaluable()),
        }
    }

    pub(crate) fn sp_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        match &self.0.op {
            Op::Constant(_) => res[0].fill(0),
            Op::Project(map) => {
                for (r, m) in res[0].iter_mut().zip(map) {
                    *r = m.map_or(0, |k| arg[0][k]);
                }
            }
            Op::Unary(_) | Op::Powi(_) => res[0].copy_from_slice(arg[0]),
            Op::Binary(_) => {
                for ((r, &a), &b) in res[0].iter_mut().zip(arg[0]).zip(arg[1]) {
                    *r = a | b;
                }
            }
            Op::Call(f) => f.sp_forward(arg, res, iw, bw)?,
            Op::Symbol(_) | Op::Output(_) => return Err(self.not_evaluable()),
        }
        Ok(())
    }

    /// ORs the dependencies implied by `res` into `arg`, then clears `res`.
    pub(crate) fn sp_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        match &self.0.op {
            Op::Constant(_) => res[0].fill(0),
            Op::Project(map) => {
                for (r, m) in res[0].iter_mut().zip(map) {
                    if let Some(k) = m {
                        arg[0][*k] |= *r;
                    }
                    *r = 0;
                }
            }
            Op::Unary(_) | Op::Powi(_) | Op::Binary(_) => {
                for j in 0..res[0].len() {
                    let seed = std::mem::take(&mut res[0][j]);
                    for a in arg.iter_mut() {
                        a[j] |= seed;
                    }
                }
            }
            Op::Call(f) => f.sp_reverse(arg, res, iw, bw)?,
            Op::Symbol(_) | Op::Output(_) => return Err(self.not_evaluable()),
        }
        Ok(())
    }

    /// Emit C statements computing this node from the arrays named in `arg`
    /// into the arrays named in `res`.
    pub(crate) fn emit(&self, g: &mut CodeGenerator<F>, arg: &[String], res: &[String]) -> Result<()> {
        match &self.0.op {
            Op::Constant(v) => {
                for (j, &c) in v.iter().enumerate() {
                    let c = g.constant(c);
                    g.line(format!("{}[{j}] = {c};", res[0]));
                }
            }
            Op::Project(map) => {
                for (j, m) in map.iter().enumerate() {
                    match m {
                        Some(k) => g.line(format!("{}[{j}] = {}[{k}];", res[0], arg[0])),
                        None => g.line(format!("{}[{j}] = 0;", res[0])),
                    }
                }
            }
            Op::Unary(_) | Op::Powi(_) | Op::Binary(_) => {
                let (op, exp) = self.elementwise();
                for j in 0..self.nnz() {
                    let a = format!("{}[{j}]", arg[0]);
                    let b = match arg.get(1) {
                        Some(b) => format!("{b}[{j}]"),
                        None => exp.to_string(),
                    };
                    g.line(format!("{}[{j}] = {};", res[0], opcode::c_expr(op, &a, &b)));
                }
            }
            Op::Call(f) => call_emit(f, g, arg, res)?,
            Op::Symbol(_) | Op::Output(_) => return Err(self.not_evaluable()),
        }
        Ok(())
    }

    /// Opcode and exponent of an elementwise node.
    fn elementwise(&self) -> (OpCode, i32) {
        match &self.0.op {
            Op::Unary(op) | Op::Binary(op) => (*op, 0),
            Op::Powi(exp) => (OpCode::Powi, *exp),
            _ => (OpCode::Const, 0),
        }
    }
}

//! Symbolic forward and reverse generators for scalar tapes.
//!
//! Both generators re-record the nominal tape into a fresh one and append
//! the tangent (or adjoint) sweep on top of it, so the nominal values are
//! shared by every direction of the batch.

use crate::error::Result;
use crate::float::Float;
use crate::function::Function;
use crate::opcode::{self, accumulate, chain, partials, OpCode};
use crate::sparsity::Sparsity;

use super::{SxFunction, SxTape};

impl<F: Float> SxFunction<F> {
    /// Inputs: `x`, then `k` seed sets laid out like `x`.
    /// Outputs: `k` tangent sets laid out like the outputs, direction-major.
    pub(crate) fn forward_generator(&self, k: usize) -> Result<SxFunction<F>> {
        let nx = self.tape.num_inputs();
        let mut tape = SxTape::with_capacity(self.tape.num_ops() * (1 + 2 * k));
        let x: Vec<u32> = (0..nx).map(|_| tape.new_input()).collect();
        let seeds: Vec<Vec<u32>> = (0..k)
            .map(|_| (0..nx).map(|_| tape.new_input()).collect())
            .collect();
        let map = self.tape.inline(&mut tape, &x)?;

        let mut outputs = Vec::with_capacity(k * self.n_out());
        for seed in &seeds {
            let tangent = self.tangent_sweep(&mut tape, &map, seed)?;
            for out in &self.outputs {
                let entries: Vec<u32> = out
                    .iter()
                    .map(|&e| match tangent[e as usize] {
                        Some(t) => t,
                        None => tape.push_const(F::zero()),
                    })
                    .collect();
                outputs.push(entries);
            }
        }

        let in_sp: Vec<Sparsity> = self
            .in_sp
            .iter()
            .cloned()
            .chain((0..k).flat_map(|_| self.in_sp.iter().cloned()))
            .collect();
        let out_sp: Vec<Sparsity> = (0..k).flat_map(|_| self.out_sp.iter().cloned()).collect();
        Ok(
            SxFunction::from_tape(format!("fwd{k}_{}", self.name), tape, in_sp, out_sp, outputs)?
                .with_config(self.config.clone()),
        )
    }

    /// Inputs: `x`, then `k` adjoint seed sets laid out like the outputs.
    /// Outputs: `k` sensitivity sets laid out like the inputs, direction-major.
    pub(crate) fn reverse_generator(&self, k: usize) -> Result<SxFunction<F>> {
        let nx = self.tape.num_inputs();
        let ny: usize = self.outputs.iter().map(Vec::len).sum();
        let mut tape = SxTape::with_capacity(self.tape.num_ops() * (1 + 3 * k));
        let x: Vec<u32> = (0..nx).map(|_| tape.new_input()).collect();
        let seeds: Vec<Vec<u32>> = (0..k)
            .map(|_| (0..ny).map(|_| tape.new_input()).collect())
            .collect();
        let map = self.tape.inline(&mut tape, &x)?;
        let input_entries: Vec<u32> = self.tape.input_entries().collect();

        let mut outputs = Vec::with_capacity(k * self.n_in());
        for seed in &seeds {
            let adj = self.adjoint_sweep(&mut tape, &map, seed)?;
            let mut offset = 0;
            for sp in &self.in_sp {
                let entries: Vec<u32> = input_entries[offset..offset + sp.nnz()]
                    .iter()
                    .map(|&e| match adj[e as usize] {
                        Some(a) => a,
                        None => tape.push_const(F::zero()),
                    })
                    .collect();
                outputs.push(entries);
                offset += sp.nnz();
            }
        }

        let in_sp: Vec<Sparsity> = self
            .in_sp
            .iter()
            .cloned()
            .chain((0..k).flat_map(|_| self.out_sp.iter().cloned()))
            .collect();
        let out_sp: Vec<Sparsity> = (0..k).flat_map(|_| self.in_sp.iter().cloned()).collect();
        Ok(
            SxFunction::from_tape(format!("adj{k}_{}", self.name), tape, in_sp, out_sp, outputs)?
                .with_config(self.config.clone()),
        )
    }

    /// Tangent of every entry of `self.tape`, recorded into `dst`.
    /// `None` marks a structurally zero tangent.
    fn tangent_sweep(
        &self,
        dst: &mut SxTape<F>,
        map: &[u32],
        seed: &[u32],
    ) -> Result<Vec<Option<u32>>> {
        let n = self.tape.num_ops();
        let mut tangent: Vec<Option<u32>> = vec![None; n];
        let mut next_input = 0usize;
        for i in 0..n {
            let op = self.tape.opcodes[i];
            tangent[i] = match op {
                OpCode::Input => {
                    let s = seed[next_input];
                    next_input += 1;
                    Some(s)
                }
                OpCode::Const => None,
                _ => {
                    let (a, b, exp) = self.tape.operands(i);
                    let ta = tangent[a];
                    let tb = if opcode::is_binary(op) { tangent[b] } else { None };
                    if ta.is_none() && tb.is_none() {
                        None
                    } else {
                        let (pa, pb) =
                            partials::<F, _>(dst, op, &map[a], &map[b], &map[i], exp)?;
                        let da = match ta {
                            Some(t) => chain::<F, _>(dst, &pa, &t)?,
                            None => None,
                        };
                        let db = match tb {
                            Some(t) => chain::<F, _>(dst, &pb, &t)?,
                            None => None,
                        };
                        accumulate::<F, _>(dst, da, db)?
                    }
                }
            };
        }
        Ok(tangent)
    }

    /// Adjoint of every entry of `self.tape` for one seed, recorded into `dst`.
    fn adjoint_sweep(
        &self,
        dst: &mut SxTape<F>,
        map: &[u32],
        seed: &[u32],
    ) -> Result<Vec<Option<u32>>> {
        let n = self.tape.num_ops();
        let mut adj: Vec<Option<u32>> = vec![None; n];
        for (q, &e) in self.outputs.iter().flatten().enumerate() {
            let cur = adj[e as usize].take();
            adj[e as usize] = accumulate::<F, _>(dst, cur, Some(seed[q]))?;
        }

        for i in (0..n).rev() {
            let op = self.tape.opcodes[i];
            if matches!(op, OpCode::Input | OpCode::Const) {
                continue;
            }
            let Some(s) = adj[i] else {
                continue;
            };
            let (a, b, exp) = self.tape.operands(i);
            let (pa, pb) = partials::<F, _>(dst, op, &map[a], &map[b], &map[i], exp)?;

            let da = chain::<F, _>(dst, &pa, &s)?;
            let cur = adj[a].take();
            adj[a] = accumulate::<F, _>(dst, cur, da)?;
            if opcode::is_binary(op) {
                let db = chain::<F, _>(dst, &pb, &s)?;
                let cur = adj[b].take();
                adj[b] = accumulate::<F, _>(dst, cur, db)?;
            }
        }
        Ok(adj)
    }
}

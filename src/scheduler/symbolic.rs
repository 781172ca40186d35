//! Symbolic passes: scalar expansion, matrix substitution and the
//! forward/reverse derivative passes. Per-slot values live in plain vectors
//! indexed by slot.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::mx::{accumulate, Mx};
use crate::sx::SxTape;

use super::Schedule;

impl<F: Float> Schedule<F> {
    /// Inline the whole graph into `tape`. `arg[i]` holds the tape entries
    /// of input `i`'s nonzeros.
    pub(crate) fn eval_sx(&self, tape: &mut SxTape<F>, arg: &[&[u32]]) -> Result<Vec<Vec<u32>>> {
        let mut work: Vec<Vec<u32>> = vec![Vec::new(); self.slots.len()];
        for (&s, x) in self.input_slots.iter().zip(arg) {
            work[s] = x.to_vec();
        }
        for st in &self.steps {
            let out = {
                let args: Vec<&[u32]> = st.arg.iter().map(|&s| work[s].as_slice()).collect();
                st.node.eval_sx(tape, &args)?
            };
            for (&s, v) in st.res.iter().zip(out) {
                work[s] = v;
            }
        }
        Ok(self.output_slots.iter().map(|&s| work[s].clone()).collect())
    }

    /// Substitute `arg` for the inputs and rebuild the graph on top of them.
    ///
    /// Nodes whose dependencies come back unchanged are reused, so the part
    /// of the graph that does not depend on the inputs stays shared.
    pub(crate) fn eval_mx(&self, arg: &[Mx<F>]) -> Result<Vec<Mx<F>>> {
        let mut work: Vec<Option<Mx<F>>> = vec![None; self.slots.len()];
        for (&s, x) in self.input_slots.iter().zip(arg) {
            work[s] = Some(x.clone());
        }
        for st in &self.steps {
            let deps = st
                .arg
                .iter()
                .map(|&s| filled(&work, s))
                .collect::<Result<Vec<_>>>()?;
            let unchanged = deps.iter().zip(st.node.deps()).all(|(a, b)| a.key() == b.key());
            let node = if unchanged {
                st.node.clone()
            } else {
                st.node.rebuild(deps)?
            };
            for (o, &s) in st.res.iter().enumerate() {
                work[s] = Some(node.get_output(o)?);
            }
        }
        self.output_slots.iter().map(|&s| filled(&work, s)).collect()
    }

    /// Forward derivative pass. `fseed[d][i]` is the tangent of input `i`
    /// in direction `d`; returns output tangents indexed `[d][o]`.
    pub(crate) fn eval_forward(
        &self,
        fseed: &[Vec<Option<Mx<F>>>],
    ) -> Result<Vec<Vec<Option<Mx<F>>>>> {
        let k = fseed.len();
        let mut tangent: Vec<Vec<Option<Mx<F>>>> = vec![vec![None; self.slots.len()]; k];
        for (d, seed) in fseed.iter().enumerate() {
            for (&s, t) in self.input_slots.iter().zip(seed) {
                tangent[d][s] = t.clone();
            }
        }
        for st in &self.steps {
            let seeds: Vec<Vec<Option<Mx<F>>>> = (0..k)
                .map(|d| st.arg.iter().map(|&s| tangent[d][s].clone()).collect())
                .collect();
            if seeds.iter().flatten().all(Option::is_none) {
                continue;
            }
            let sens = st.node.eval_forward(&seeds)?;
            for (d, mut sens) in sens.into_iter().enumerate() {
                for (o, &s) in st.res.iter().enumerate() {
                    tangent[d][s] = sens[o].take();
                }
            }
        }
        Ok(tangent
            .into_iter()
            .map(|t| self.output_slots.iter().map(|&s| t[s].clone()).collect())
            .collect())
    }

    /// Reverse derivative pass. `aseed[d][o]` is the adjoint of output `o`
    /// in direction `d`; returns input adjoints indexed `[d][i]`.
    ///
    /// Adjoints are summed per slot: every consumer of a value adds its
    /// contribution, none overwrites another's.
    pub(crate) fn eval_reverse(
        &self,
        aseed: &[Vec<Option<Mx<F>>>],
    ) -> Result<Vec<Vec<Option<Mx<F>>>>> {
        let k = aseed.len();
        let mut adj: Vec<Vec<Option<Mx<F>>>> = vec![vec![None; self.slots.len()]; k];
        for (d, seed) in aseed.iter().enumerate() {
            for (&s, a) in self.output_slots.iter().zip(seed) {
                if let Some(a) = a {
                    accumulate(&mut adj[d][s], a.clone())?;
                }
            }
        }
        for st in self.steps.iter().rev() {
            let seeds: Vec<Vec<Option<Mx<F>>>> = (0..k)
                .map(|d| st.res.iter().map(|&s| adj[d][s].take()).collect())
                .collect();
            if seeds.iter().flatten().all(Option::is_none) {
                continue;
            }
            let mut sens: Vec<Vec<Option<Mx<F>>>> = vec![vec![None; st.arg.len()]; k];
            st.node.eval_reverse(&seeds, &mut sens)?;
            for (d, sens) in sens.into_iter().enumerate() {
                for (&s, t) in st.arg.iter().zip(sens) {
                    if let Some(t) = t {
                        accumulate(&mut adj[d][s], t)?;
                    }
                }
            }
        }
        Ok(adj
            .into_iter()
            .map(|mut a| self.input_slots.iter().map(|&s| a[s].take()).collect())
            .collect())
    }
}

fn filled<F: Float>(work: &[Option<Mx<F>>], s: usize) -> Result<Mx<F>> {
    work[s]
        .clone()
        .ok_or_else(|| Error::FreeVariable(format!("slot {s} read before it was written")))
}

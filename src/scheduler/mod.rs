//! Evaluation scheduler.
//!
//! A [`Schedule`] is built once per graph: one topological pass over the
//! primaries reachable from the outputs, and one work slot per
//! `(primary, output index)` pair. Every evaluation mode is then a single
//! linear sweep (reverse modes sweep backwards) over the same step list.
//!
//! Flat workspace layout used by the buffer passes:
//!
//! ```text
//! [ work slots: Σ nnz | argument staging: max Σ arg nnz | node scratch: max nr ]
//! ```
//!
//! Work slots are allocated in step order, so the results of a step always
//! sit after every one of its arguments; a step sees its arguments and its
//! results through a single `split_at_mut`.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::mx::Mx;
use crate::sparsity::Sparsity;

mod codegen;
mod numeric;
mod symbolic;

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) offset: usize,
    pub(crate) sparsity: Sparsity,
}

impl Slot {
    #[inline]
    pub(crate) fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.sparsity.nnz()
    }

    #[inline]
    pub(crate) fn nnz(&self) -> usize {
        self.sparsity.nnz()
    }
}

/// One primary node with the slots of its dependencies and outputs.
pub(crate) struct Step<F: Float> {
    pub(crate) node: Mx<F>,
    pub(crate) arg: Vec<usize>,
    pub(crate) res: Vec<usize>,
}

/// Topologically ordered evaluation plan of a graph with declared inputs.
pub struct Schedule<F: Float> {
    pub(crate) steps: Vec<Step<F>>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) input_slots: Vec<usize>,
    pub(crate) output_slots: Vec<usize>,
    pub(crate) work_len: usize,
    pub(crate) arg_len: usize,
    pub(crate) ni: usize,
    pub(crate) nr: usize,
}

impl<F: Float> Schedule<F> {
    /// Schedule `outputs` as functions of the symbolic `inputs`.
    ///
    /// Fails with [`Error::NotSymbolic`] / [`Error::DuplicateInput`] on bad
    /// inputs and with [`Error::FreeVariable`] when the outputs depend on a
    /// symbol that is not an input.
    pub fn new(inputs: &[Mx<F>], outputs: &[Mx<F>]) -> Result<Self> {
        let mut slots: Vec<Slot> = Vec::new();
        let mut slot_of: HashMap<(usize, usize), usize> = HashMap::new();
        let mut offset = 0usize;
        let mut push_slot = |slots: &mut Vec<Slot>, sparsity: Sparsity| {
            let s = slots.len();
            let nnz = sparsity.nnz();
            slots.push(Slot { offset, sparsity });
            offset += nnz;
            s
        };

        let mut input_slots = Vec::with_capacity(inputs.len());
        for (i, x) in inputs.iter().enumerate() {
            if !x.is_symbolic() {
                return Err(Error::NotSymbolic(i));
            }
            if slot_of.contains_key(&x.key()) {
                return Err(Error::DuplicateInput(i));
            }
            let s = push_slot(&mut slots, x.sparsity().clone());
            slot_of.insert(x.key(), s);
            input_slots.push(s);
        }

        let mut steps: Vec<Step<F>> = Vec::new();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut stack: Vec<(Mx<F>, bool)> = outputs
            .iter()
            .rev()
            .map(|o| (o.primary().clone(), false))
            .collect();
        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                let arg = node
                    .deps()
                    .iter()
                    .map(|d| slot_of.get(&d.key()).copied().ok_or_else(|| unresolved(d)))
                    .collect::<Result<Vec<_>>>()?;
                let res = (0..node.n_out())
                    .map(|o| {
                        let s = push_slot(&mut slots, node.output_sparsity(o).clone());
                        slot_of.insert((node.id(), o), s);
                        s
                    })
                    .collect();
                steps.push(Step { node, arg, res });
                continue;
            }
            if node.is_symbolic() {
                if !slot_of.contains_key(&node.key()) {
                    return Err(unresolved(&node));
                }
                continue;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            stack.push((node.clone(), true));
            for d in node.deps().iter().rev() {
                let p = d.primary();
                if !visited.contains(&p.id()) {
                    stack.push((p.clone(), false));
                }
            }
        }

        let output_slots = outputs
            .iter()
            .map(|o| slot_of.get(&o.key()).copied().ok_or_else(|| unresolved(o)))
            .collect::<Result<Vec<_>>>()?;

        let work_len = slots.last().map_or(0, |s| s.offset + s.nnz());
        let arg_len = steps
            .iter()
            .map(|st| st.arg.iter().map(|&s| slots[s].nnz()).sum::<usize>())
            .max()
            .unwrap_or(0);
        let (ni, nr) = steps
            .iter()
            .map(|st| st.node.workspace_requirement())
            .fold((0, 0), |(ni, nr), (i, r)| (ni.max(i), nr.max(r)));

        debug!(
            "scheduled {} steps over {} slots: work {work_len}, staging {arg_len}, scratch ({ni}, {nr})",
            steps.len(),
            slots.len()
        );
        Ok(Schedule {
            steps,
            slots,
            input_slots,
            output_slots,
            work_len,
            arg_len,
            ni,
            nr,
        })
    }

    /// `(ni, nr)` for one evaluation of the whole graph through any buffer pass.
    ///
    /// Steps run one at a time and each reuses the same node scratch, so the
    /// scratch is sized by the largest step rather than the sum over steps.
    pub fn workspace_requirement(&self) -> (usize, usize) {
        (self.ni, self.work_len + self.arg_len + self.nr)
    }

    /// Number of scheduled primaries.
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Scheduled primaries in evaluation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Mx<F>> + '_ {
        self.steps.iter().map(|st| &st.node)
    }

    /// Start of the contiguous result block of step `st` in the work region.
    pub(crate) fn res_range(&self, st: &Step<F>) -> std::ops::Range<usize> {
        match (st.res.first(), st.res.last()) {
            (Some(&a), Some(&b)) => self.slots[a].offset..self.slots[b].range().end,
            _ => 0..0,
        }
    }
}

fn unresolved<F: Float>(x: &Mx<F>) -> Error {
    match x.name() {
        Some(name) => Error::FreeVariable(name.to_string()),
        None => Error::FreeVariable(format!("{x:?}")),
    }
}

/// Split `buf` into consecutive chunks of the given lengths.
pub(crate) fn split_chunks<'a, T>(
    mut buf: &'a mut [T],
    lens: impl Iterator<Item = usize>,
) -> Vec<&'a mut [T]> {
    let mut out = Vec::new();
    for n in lens {
        let (head, tail) = std::mem::take(&mut buf).split_at_mut(n);
        out.push(head);
        buf = tail;
    }
    out
}

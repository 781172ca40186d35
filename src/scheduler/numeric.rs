//! Buffer passes: numeric evaluation and dependency-bit propagation.

use log::trace;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::function::Bvec;

use super::{split_chunks, Schedule};

impl<F: Float> Schedule<F> {
    fn check_workspace(&self, ni: usize, nr: usize) -> Result<()> {
        let (need_i, need_r) = self.workspace_requirement();
        if ni < need_i {
            return Err(Error::BufferSize {
                context: "integer workspace".to_string(),
                expected: need_i,
                got: ni,
            });
        }
        if nr < need_r {
            return Err(Error::BufferSize {
                context: "real workspace".to_string(),
                expected: need_r,
                got: nr,
            });
        }
        Ok(())
    }

    /// Numeric pass. `rw` is split into work slots and node scratch; every
    /// node writes its results straight into its own slots.
    pub(crate) fn eval_numeric(
        &self,
        arg: &[&[F]],
        res: &mut [&mut [F]],
        iw: &mut [usize],
        rw: &mut [F],
    ) -> Result<()> {
        self.check_workspace(iw.len(), rw.len())?;
        let (work, rest) = rw.split_at_mut(self.work_len);
        let scratch = &mut rest[self.arg_len..];

        for (&s, x) in self.input_slots.iter().zip(arg) {
            work[self.slots[s].range()].copy_from_slice(x);
        }
        for st in self.steps.iter().filter(|st| !st.res.is_empty()) {
            let out = self.res_range(st);
            let (done, todo) = work.split_at_mut(out.start);
            let args: Vec<&[F]> = st.arg.iter().map(|&s| &done[self.slots[s].range()]).collect();
            let mut outs = split_chunks(
                &mut todo[..out.len()],
                st.res.iter().map(|&s| self.slots[s].nnz()),
            );
            trace!("numeric: {}", st.node.op_name());
            st.node.eval_numeric(&args, &mut outs, iw, scratch)?;
        }
        for (&s, r) in self.output_slots.iter().zip(res.iter_mut()) {
            r.copy_from_slice(&work[self.slots[s].range()]);
        }
        Ok(())
    }

    /// Forward dependency propagation, same layout as the numeric pass.
    pub(crate) fn sp_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        self.check_workspace(iw.len(), bw.len())?;
        let (work, rest) = bw.split_at_mut(self.work_len);
        let scratch = &mut rest[self.arg_len..];

        for (&s, x) in self.input_slots.iter().zip(arg) {
            work[self.slots[s].range()].copy_from_slice(x);
        }
        for st in self.steps.iter().filter(|st| !st.res.is_empty()) {
            let out = self.res_range(st);
            let (done, todo) = work.split_at_mut(out.start);
            let args: Vec<&[Bvec]> = st.arg.iter().map(|&s| &done[self.slots[s].range()]).collect();
            let mut outs = split_chunks(
                &mut todo[..out.len()],
                st.res.iter().map(|&s| self.slots[s].nnz()),
            );
            st.node.sp_forward(&args, &mut outs, iw, scratch)?;
        }
        for (&s, r) in self.output_slots.iter().zip(res.iter_mut()) {
            r.copy_from_slice(&work[self.slots[s].range()]);
        }
        Ok(())
    }

    /// Reverse dependency propagation.
    ///
    /// Output bits are moved into the work slots (and cleared in `res`),
    /// swept backwards step by step, and finally ORed into `arg`. Each step
    /// reports its argument bits into zeroed staging chunks, which are then
    /// ORed into the argument slots, so a node that reads the same slot
    /// twice contributes both times.
    pub(crate) fn sp_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        self.check_workspace(iw.len(), bw.len())?;
        let (work, rest) = bw.split_at_mut(self.work_len);
        let (stage, scratch) = rest.split_at_mut(self.arg_len);
        work.fill(0);

        for (&s, r) in self.output_slots.iter().zip(res.iter_mut()) {
            for (w, v) in work[self.slots[s].range()].iter_mut().zip(r.iter_mut()) {
                *w |= *v;
                *v = 0;
            }
        }
        for st in self.steps.iter().rev().filter(|st| !st.res.is_empty()) {
            let out = self.res_range(st);
            let (done, todo) = work.split_at_mut(out.start);
            let staged_len: usize = st.arg.iter().map(|&s| self.slots[s].nnz()).sum();
            let staged = &mut stage[..staged_len];
            staged.fill(0);
            {
                let mut args = split_chunks(&mut *staged, st.arg.iter().map(|&s| self.slots[s].nnz()));
                let mut outs = split_chunks(
                    &mut todo[..out.len()],
                    st.res.iter().map(|&s| self.slots[s].nnz()),
                );
                st.node.sp_reverse(&mut args, &mut outs, iw, scratch)?;
            }
            let mut k = 0;
            for &s in &st.arg {
                let range = self.slots[s].range();
                let n = range.len();
                for (w, b) in done[range].iter_mut().zip(&staged[k..k + n]) {
                    *w |= *b;
                }
                k += n;
            }
        }
        for (&s, a) in self.input_slots.iter().zip(arg.iter_mut()) {
            for (v, w) in a.iter_mut().zip(&work[self.slots[s].range()]) {
                *v |= *w;
            }
        }
        Ok(())
    }
}

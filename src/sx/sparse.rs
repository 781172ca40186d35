//! Dependency-bit propagation through a scalar tape.
//!
//! Each tape entry carries one [`Bvec`]; binary entries OR their operands,
//! unary entries copy theirs, constants carry nothing.

use crate::error::Result;
use crate::float::Float;
use crate::function::{check_outputs, check_signature, Bvec};
use crate::opcode::OpCode;

use super::SxFunction;

impl<F: Float> SxFunction<F> {
    pub(crate) fn propagate_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        bw: &mut [Bvec],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.check_scratch("bit workspace", bw.len())?;
        self.tape
            .dependency_sweep(arg.iter().flat_map(|a| a.iter().copied()), bw);
        for (r, out) in res.iter_mut().zip(&self.outputs) {
            for (v, &e) in r.iter_mut().zip(out) {
                *v = bw[e as usize];
            }
        }
        Ok(())
    }

    pub(crate) fn propagate_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        bw: &mut [Bvec],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.check_scratch("bit workspace", bw.len())?;
        let n = self.tape.num_ops();
        let bw = &mut bw[..n];
        bw.fill(0);

        for (r, out) in res.iter_mut().zip(&self.outputs) {
            for (v, &e) in r.iter_mut().zip(out) {
                bw[e as usize] |= *v;
                *v = 0;
            }
        }

        for i in (0..n).rev() {
            let seed = bw[i];
            if seed == 0 {
                continue;
            }
            match self.tape.opcodes[i] {
                OpCode::Input | OpCode::Const => continue,
                _ => {
                    let (a, b, _) = self.tape.operands(i);
                    bw[i] = 0;
                    bw[a] |= seed;
                    bw[b] |= seed;
                }
            }
        }

        let mut entries = self.tape.input_entries();
        for a in arg.iter_mut() {
            for v in a.iter_mut() {
                if let Some(e) = entries.next() {
                    *v |= bw[e as usize];
                }
            }
        }
        Ok(())
    }
}

use crate::codegen::CodeGenerator;
use crate::error::Result;
use crate::float::Float;
use crate::opcode::{self, OpCode};

use super::SxFunction;

impl<F: Float> SxFunction<F> {
    /// One assignment per tape entry into `w`, then the output copies.
    /// Null `arg` entries read as zero; null `res` entries are skipped.
    pub(crate) fn emit(&self, g: &mut CodeGenerator<F>, symbol: &str) -> Result<()> {
        g.begin_function(symbol, &self.name);
        let positions: Vec<(usize, usize)> = self
            .in_sp
            .iter()
            .enumerate()
            .flat_map(|(i, sp)| (0..sp.nnz()).map(move |j| (i, j)))
            .collect();
        let mut next_input = 0usize;
        for i in 0..self.tape.num_ops() {
            let rhs = match self.tape.opcodes[i] {
                OpCode::Input => {
                    let (k, j) = positions[next_input];
                    next_input += 1;
                    format!("arg[{k}] ? arg[{k}][{j}] : 0")
                }
                OpCode::Const => g.constant(self.tape.values[i]),
                OpCode::Powi => {
                    let (a, _, exp) = self.tape.operands(i);
                    opcode::c_expr(OpCode::Powi, &format!("w[{a}]"), &exp.to_string())
                }
                op => {
                    let (a, b, _) = self.tape.operands(i);
                    opcode::c_expr(op, &format!("w[{a}]"), &format!("w[{b}]"))
                }
            };
            g.line(format!("w[{i}] = {rhs};"));
        }
        for (o, out) in self.outputs.iter().enumerate() {
            if out.is_empty() {
                continue;
            }
            g.line(format!("if (res[{o}]) {{"));
            for (j, &e) in out.iter().enumerate() {
                g.line(format!("  res[{o}][{j}] = w[{e}];"));
            }
            g.line("}");
        }
        g.end_function();
        Ok(())
    }
}

use crate::codegen::CodeGenerator;
use crate::error::Result;
use crate::float::Float;

use super::Schedule;

impl<F: Float> Schedule<F> {
    /// Emit the graph as one C body: a local array per slot, input copies,
    /// one block per step, output copies. Call steps reference the shared
    /// body of their function, which is emitted on first use.
    pub(crate) fn emit(&self, g: &mut CodeGenerator<F>, symbol: &str, comment: &str) -> Result<()> {
        g.begin_function(symbol, comment);
        let real = g.real().to_string();
        let name = |s: usize| format!("v{s}");

        for (s, slot) in self.slots.iter().enumerate() {
            g.line(format!("{real} {}[{}];", name(s), slot.nnz().max(1)));
        }
        for (i, &s) in self.input_slots.iter().enumerate() {
            for j in 0..self.slots[s].nnz() {
                g.line(format!("{}[{j}] = arg[{i}] ? arg[{i}][{j}] : 0;", name(s)));
            }
        }
        for st in &self.steps {
            let arg: Vec<String> = st.arg.iter().map(|&s| name(s)).collect();
            let res: Vec<String> = st.res.iter().map(|&s| name(s)).collect();
            g.line(format!("/* {} */", st.node.op_name().replace("*/", "* /")));
            st.node.emit(g, &arg, &res)?;
        }
        for (o, &s) in self.output_slots.iter().enumerate() {
            let n = self.slots[s].nnz();
            if n == 0 {
                continue;
            }
            g.line(format!("if (res[{o}]) {{"));
            for j in 0..n {
                g.line(format!("  res[{o}][{j}] = {}[{j}];", name(s)));
            }
            g.line("}");
        }
        g.end_function();
        Ok(())
    }
}

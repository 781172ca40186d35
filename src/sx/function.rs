use std::sync::Arc;

use crate::codegen::CodeGenerator;
use crate::error::{arity, check_len, Error, Result};
use crate::float::Float;
use crate::function::{
    check_outputs, check_signature, Bvec, Function, FunctionConfig, FunctionRef,
    GeneratorCache,
};
use crate::sparsity::Sparsity;

use super::SxTape;

/// A [`Function`] whose body is a flat scalar tape.
///
/// Input `i` occupies the next `input_sparsity(i).nnz()` input entries of the
/// tape; output `o` lists the tape entries holding its nonzeros.
pub struct SxFunction<F: Float> {
    pub(crate) name: String,
    pub(crate) tape: SxTape<F>,
    pub(crate) in_sp: Vec<Sparsity>,
    pub(crate) out_sp: Vec<Sparsity>,
    pub(crate) outputs: Vec<Vec<u32>>,
    pub(crate) config: FunctionConfig,
    pub(crate) generators: GeneratorCache<F>,
}

impl<F: Float> SxFunction<F> {
    /// Record a new function. `body` receives the tape and the input entries
    /// of every input, and returns the entries of every output.
    ///
    /// ```
    /// use symgraph::{Function, OpCode, Sparsity, SxFunction};
    ///
    /// let f = SxFunction::<f64>::build(
    ///     "mul",
    ///     vec![Sparsity::scalar(), Sparsity::scalar()],
    ///     vec![Sparsity::scalar()],
    ///     |tape, x| Ok(vec![vec![tape.push_op(OpCode::Mul, x[0][0], x[1][0])]]),
    /// )
    /// .unwrap();
    /// let y = f.evaluate(&[&[3.0], &[4.0]]).unwrap();
    /// assert_eq!(y[0][0], 12.0);
    /// ```
    pub fn build(
        name: impl Into<String>,
        in_sp: Vec<Sparsity>,
        out_sp: Vec<Sparsity>,
        body: impl FnOnce(&mut SxTape<F>, &[Vec<u32>]) -> Result<Vec<Vec<u32>>>,
    ) -> Result<Self> {
        let mut tape = SxTape::new();
        let inputs: Vec<Vec<u32>> = in_sp
            .iter()
            .map(|sp| (0..sp.nnz()).map(|_| tape.new_input()).collect())
            .collect();
        let outputs = body(&mut tape, &inputs)?;
        Self::from_tape(name, tape, in_sp, out_sp, outputs)
    }

    /// Wrap an already recorded tape.
    pub fn from_tape(
        name: impl Into<String>,
        tape: SxTape<F>,
        in_sp: Vec<Sparsity>,
        out_sp: Vec<Sparsity>,
        outputs: Vec<Vec<u32>>,
    ) -> Result<Self> {
        let name = name.into();
        let n_inputs: usize = in_sp.iter().map(Sparsity::nnz).sum();
        check_len(&format!("{name} tape inputs"), n_inputs, tape.num_inputs())?;
        if outputs.len() != out_sp.len() {
            return Err(arity(
                &name,
                format!(
                    "{} output patterns but {} output entry lists",
                    out_sp.len(),
                    outputs.len()
                ),
            ));
        }
        for (o, (sp, out)) in out_sp.iter().zip(&outputs).enumerate() {
            check_len(&format!("{name} output {o}"), sp.nnz(), out.len())?;
            if let Some(&e) = out.iter().find(|&&e| e as usize >= tape.num_ops()) {
                return Err(arity(
                    &name,
                    format!("output {o} references entry {e} beyond the tape"),
                ));
            }
        }
        Ok(SxFunction {
            name,
            tape,
            in_sp,
            out_sp,
            outputs,
            config: FunctionConfig::default(),
            generators: GeneratorCache::new(),
        })
    }

    pub fn with_config(mut self, config: FunctionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn into_ref(self) -> FunctionRef<F> {
        Arc::new(self)
    }

    pub fn tape(&self) -> &SxTape<F> {
        &self.tape
    }

    /// Tape entries holding the nonzeros of output `o`.
    pub fn output_entries(&self, o: usize) -> &[u32] {
        &self.outputs[o]
    }

    pub(crate) fn check_scratch(&self, context: &str, len: usize) -> Result<()> {
        let needed = self.tape.num_ops();
        if len < needed {
            return Err(Error::BufferSize {
                context: format!("{} {context}", self.name),
                expected: needed,
                got: len,
            });
        }
        Ok(())
    }
}

impl<F: Float> Function<F> for SxFunction<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_in(&self) -> usize {
        self.in_sp.len()
    }

    fn n_out(&self) -> usize {
        self.out_sp.len()
    }

    fn input_sparsity(&self, i: usize) -> &Sparsity {
        &self.in_sp[i]
    }

    fn output_sparsity(&self, i: usize) -> &Sparsity {
        &self.out_sp[i]
    }

    fn config(&self) -> &FunctionConfig {
        &self.config
    }

    fn generators(&self) -> &GeneratorCache<F> {
        &self.generators
    }

    fn workspace_requirement(&self) -> (usize, usize) {
        (0, self.tape.num_ops())
    }

    fn eval_numeric(
        &self,
        arg: &[&[F]],
        res: &mut [&mut [F]],
        _iw: &mut [usize],
        rw: &mut [F],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.check_scratch("real workspace", rw.len())?;
        self.tape
            .forward_sweep(arg.iter().flat_map(|a| a.iter().copied()), rw);
        for (r, out) in res.iter_mut().zip(&self.outputs) {
            for (v, &e) in r.iter_mut().zip(out) {
                *v = rw[e as usize];
            }
        }
        Ok(())
    }

    fn eval_sx(&self, tape: &mut SxTape<F>, arg: &[&[u32]]) -> Result<Vec<Vec<u32>>> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        let flat: Vec<u32> = arg.iter().flat_map(|a| a.iter().copied()).collect();
        let map = self.tape.inline(tape, &flat)?;
        Ok(self
            .outputs
            .iter()
            .map(|out| out.iter().map(|&e| map[e as usize]).collect())
            .collect())
    }

    fn sp_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        _iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        self.propagate_forward(arg, res, bw)
    }

    fn sp_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        _iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        self.propagate_reverse(arg, res, bw)
    }

    fn emit_body(&self, g: &mut CodeGenerator<F>, symbol: &str) -> Result<()> {
        self.emit(g, symbol)
    }

    fn build_forward(&self, k: usize) -> Result<FunctionRef<F>> {
        Ok(Arc::new(self.forward_generator(k)?))
    }

    fn build_reverse(&self, k: usize) -> Result<FunctionRef<F>> {
        Ok(Arc::new(self.reverse_generator(k)?))
    }
}

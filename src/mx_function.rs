//! Reusable functions whose body is an expression graph.

use std::sync::Arc;

use log::debug;

use crate::codegen::CodeGenerator;
use crate::error::{arity, Result};
use crate::float::Float;
use crate::function::{
    check_outputs, check_signature, Bvec, Function, FunctionConfig, FunctionRef,
    GeneratorCache,
};
use crate::mx::{project, project_arg, Mx};
use crate::scheduler::Schedule;
use crate::sparsity::Sparsity;
use crate::sx::{SxFunction, SxTape};

/// A [`Function`] defined by output expressions over symbolic inputs.
///
/// The graph is scheduled once at construction; every capability is a pass
/// of that schedule. Call nodes inside the body may wrap other functions,
/// including other `MxFunction`s, to any depth.
pub struct MxFunction<F: Float> {
    name: String,
    inputs: Vec<Mx<F>>,
    outputs: Vec<Mx<F>>,
    in_sp: Vec<Sparsity>,
    out_sp: Vec<Sparsity>,
    schedule: Schedule<F>,
    config: FunctionConfig,
    generators: GeneratorCache<F>,
}

impl<F: Float> MxFunction<F> {
    /// `inputs` must be distinct symbols; `outputs` may only depend on them.
    pub fn new(name: impl Into<String>, inputs: Vec<Mx<F>>, outputs: Vec<Mx<F>>) -> Result<Self> {
        let name = name.into();
        let schedule = Schedule::new(&inputs, &outputs)?;
        debug!(
            "function `{name}`: {} inputs, {} outputs, {} steps, workspace {:?}",
            inputs.len(),
            outputs.len(),
            schedule.num_steps(),
            schedule.workspace_requirement()
        );
        Ok(MxFunction {
            in_sp: inputs.iter().map(|x| x.sparsity().clone()).collect(),
            out_sp: outputs.iter().map(|y| y.sparsity().clone()).collect(),
            name,
            inputs,
            outputs,
            schedule,
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

    pub fn inputs(&self) -> &[Mx<F>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Mx<F>] {
        &self.outputs
    }

    pub fn schedule(&self) -> &Schedule<F> {
        &self.schedule
    }

    /// Matrix-form substitution: the body rebuilt on `args` instead of the
    /// input symbols. Arguments are projected onto the input patterns.
    pub fn call_inline(&self, args: &[Mx<F>]) -> Result<Vec<Mx<F>>> {
        let context = format!("inline call to `{}`", self.name);
        if args.len() != self.inputs.len() {
            return Err(arity(
                context,
                format!("expected {} arguments, got {}", self.inputs.len(), args.len()),
            ));
        }
        let args = args
            .iter()
            .zip(&self.in_sp)
            .enumerate()
            .map(|(i, (a, sp))| project_arg(a, sp, &context, i))
            .collect::<Result<Vec<_>>>()?;
        self.schedule.eval_mx(&args)
    }

    /// Scalar-form expansion into an equivalent [`SxFunction`].
    pub fn expand(&self) -> Result<SxFunction<F>> {
        let f = SxFunction::build(
            self.name.clone(),
            self.in_sp.clone(),
            self.out_sp.clone(),
            |tape: &mut SxTape<F>, x: &[Vec<u32>]| {
                let refs: Vec<&[u32]> = x.iter().map(Vec::as_slice).collect();
                self.schedule.eval_sx(tape, &refs)
            },
        )?;
        debug!("expanded `{}` into {} scalar entries", self.name, f.tape().num_ops());
        Ok(f.with_config(self.config.clone()))
    }

    fn seed_name(&self, prefix: &str, d: usize, i: usize, base: Option<&str>) -> String {
        match base {
            Some(b) => format!("{prefix}{d}_{b}"),
            None => format!("{prefix}{d}_{i}"),
        }
    }
}

impl<F: Float> Function<F> for MxFunction<F> {
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
        self.schedule.workspace_requirement()
    }

    fn eval_numeric(
        &self,
        arg: &[&[F]],
        res: &mut [&mut [F]],
        iw: &mut [usize],
        rw: &mut [F],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.schedule.eval_numeric(arg, res, iw, rw)
    }

    fn eval_sx(&self, tape: &mut SxTape<F>, arg: &[&[u32]]) -> Result<Vec<Vec<u32>>> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        self.schedule.eval_sx(tape, arg)
    }

    fn sp_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.schedule.sp_forward(arg, res, iw, bw)
    }

    fn sp_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()> {
        check_signature(self, arg.iter().map(|a| a.len()))?;
        check_outputs(self, res.iter().map(|r| r.len()))?;
        self.schedule.sp_reverse(arg, res, iw, bw)
    }

    fn emit_body(&self, g: &mut CodeGenerator<F>, symbol: &str) -> Result<()> {
        self.schedule.emit(g, symbol, &self.name)
    }

    /// The generator reuses this function's input symbols, so its graph
    /// shares the whole primal subgraph with the original.
    fn build_forward(&self, k: usize) -> Result<FunctionRef<F>> {
        let seeds: Vec<Vec<Mx<F>>> = (0..k)
            .map(|d| {
                self.inputs
                    .iter()
                    .enumerate()
                    .map(|(i, x)| {
                        Mx::symbol(self.seed_name("fwd", d, i, x.name()), x.sparsity().clone())
                    })
                    .collect()
            })
            .collect();
        let fseed: Vec<Vec<Option<Mx<F>>>> = seeds
            .iter()
            .map(|s| s.iter().cloned().map(Some).collect())
            .collect();
        let fsens = self.schedule.eval_forward(&fseed)?;

        let mut outputs = Vec::with_capacity(k * self.n_out());
        for sens in fsens {
            for (t, sp) in sens.into_iter().zip(&self.out_sp) {
                outputs.push(match t {
                    Some(t) => project(&t, sp)?,
                    None => Mx::filled(sp.clone(), F::zero()),
                });
            }
        }
        let inputs = self
            .inputs
            .iter()
            .cloned()
            .chain(seeds.into_iter().flatten())
            .collect();
        let g = MxFunction::new(format!("fwd{k}_{}", self.name), inputs, outputs)?
            .with_config(self.config.clone());
        Ok(Arc::new(g))
    }

    fn build_reverse(&self, k: usize) -> Result<FunctionRef<F>> {
        let seeds: Vec<Vec<Mx<F>>> = (0..k)
            .map(|d| {
                self.out_sp
                    .iter()
                    .enumerate()
                    .map(|(o, sp)| Mx::symbol(self.seed_name("adj", d, o, None), sp.clone()))
                    .collect()
            })
            .collect();
        let aseed: Vec<Vec<Option<Mx<F>>>> = seeds
            .iter()
            .map(|s| s.iter().cloned().map(Some).collect())
            .collect();
        let asens = self.schedule.eval_reverse(&aseed)?;

        let mut outputs = Vec::with_capacity(k * self.n_in());
        for sens in asens {
            for (a, sp) in sens.into_iter().zip(&self.in_sp) {
                outputs.push(match a {
                    Some(a) => project(&a, sp)?,
                    None => Mx::filled(sp.clone(), F::zero()),
                });
            }
        }
        let inputs = self
            .inputs
            .iter()
            .cloned()
            .chain(seeds.into_iter().flatten())
            .collect();
        let g = MxFunction::new(format!("adj{k}_{}", self.name), inputs, outputs)?
            .with_config(self.config.clone());
        Ok(Arc::new(g))
    }
}

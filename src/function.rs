//! The reusable function abstraction embedded by call nodes.
//!
//! A [`Function`] is a fixed-signature black box: `n_in` inputs and `n_out`
//! outputs, each with a declared [`Sparsity`]. Call nodes only ever talk to
//! it through this trait, so anything implementing it (a scalar tape, an
//! expression graph, a hand-written kernel) can sit inside a graph.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;

use crate::codegen::CodeGenerator;
use crate::error::{check_len, Error, Result};
use crate::float::Float;
use crate::sparsity::Sparsity;
use crate::sx::SxTape;

/// Dependency word: bit `d` set means "may depend on direction `d`".
///
/// One word per scalar element lets a single sparsity sweep carry 64
/// independent seed directions.
pub type Bvec = u64;

/// Shared, read-only handle to a reusable function.
pub type FunctionRef<F> = Arc<dyn Function<F>>;

/// Differentiation direction of a derivative generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

/// Per-function configuration.
#[derive(Debug, Clone)]
pub struct FunctionConfig {
    /// Largest batch of directions a derivative generator is built for (default: 64).
    pub max_batch: usize,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        FunctionConfig { max_batch: 64 }
    }
}

/// Lazily built derivative generators, memoized by batch size.
///
/// Lookup and construction happen under one lock per direction, so two call
/// sites asking for the same `k` at the same time get the same generator.
/// Building a generator never asks the *same* function for another
/// generator, so holding the lock across construction cannot deadlock.
pub struct GeneratorCache<F: Float> {
    forward: Mutex<BTreeMap<usize, FunctionRef<F>>>,
    reverse: Mutex<BTreeMap<usize, FunctionRef<F>>>,
}

impl<F: Float> GeneratorCache<F> {
    pub fn new() -> Self {
        GeneratorCache {
            forward: Mutex::new(BTreeMap::new()),
            reverse: Mutex::new(BTreeMap::new()),
        }
    }

    fn slot(&self, direction: Direction) -> &Mutex<BTreeMap<usize, FunctionRef<F>>> {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }

    /// Return the cached generator for `(direction, k)`, building it with
    /// `build` on first request.
    pub fn get_or_build(
        &self,
        direction: Direction,
        k: usize,
        build: impl FnOnce() -> Result<FunctionRef<F>>,
    ) -> Result<FunctionRef<F>> {
        let mut map = self
            .slot(direction)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(g) = map.get(&k) {
            return Ok(Arc::clone(g));
        }
        let g = build()?;
        debug!("built {direction} generator `{}` for k = {k}", g.name());
        map.insert(k, Arc::clone(&g));
        Ok(g)
    }

    /// Batch sizes currently cached for `direction`, ascending.
    pub fn cached(&self, direction: Direction) -> Vec<usize> {
        self.slot(direction)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl<F: Float> Default for GeneratorCache<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer and real scratch memory for one evaluation.
#[derive(Debug, Clone)]
pub struct Workspace<T> {
    pub iw: Vec<usize>,
    pub rw: Vec<T>,
}

impl<T: Copy + Default> Workspace<T> {
    /// Scratch sized by the function's declared requirement.
    pub fn new<F: Float, G: Function<F> + ?Sized>(f: &G) -> Self {
        let (ni, nr) = f.workspace_requirement();
        Workspace {
            iw: vec![0; ni],
            rw: vec![T::default(); nr],
        }
    }
}

/// A reusable, fixed-signature computational unit.
///
/// Implementations own whatever state they need and are shared read-only by
/// every call node that references them. Derivative generators are
/// manufactured by [`build_forward`](Function::build_forward) /
/// [`build_reverse`](Function::build_reverse) and memoized through
/// [`generators`](Function::generators); call sites use
/// [`forward`](Function::forward) / [`reverse`](Function::reverse).
pub trait Function<F: Float>: Send + Sync {
    fn name(&self) -> &str;
    fn n_in(&self) -> usize;
    fn n_out(&self) -> usize;
    fn input_sparsity(&self, i: usize) -> &Sparsity;
    fn output_sparsity(&self, i: usize) -> &Sparsity;
    fn config(&self) -> &FunctionConfig;
    fn generators(&self) -> &GeneratorCache<F>;

    /// `(ni, nr)`: integer and real scratch slots needed beyond inputs and outputs.
    fn workspace_requirement(&self) -> (usize, usize);

    /// Numeric evaluation. `arg[i]` holds the nonzeros of input `i` in its
    /// declared layout; results are written into `res`.
    fn eval_numeric(
        &self,
        arg: &[&[F]],
        res: &mut [&mut [F]],
        iw: &mut [usize],
        rw: &mut [F],
    ) -> Result<()>;

    /// Scalar-form symbolic evaluation: inline the body into `tape`, with
    /// `arg[i]` holding the tape entries of input `i`'s nonzeros.
    fn eval_sx(&self, tape: &mut SxTape<F>, arg: &[&[u32]]) -> Result<Vec<Vec<u32>>>;

    /// Forward dependency propagation: output bits from input bits.
    fn sp_forward(
        &self,
        arg: &[&[Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()>;

    /// Reverse dependency propagation: ORs the input bits implied by `res`
    /// into `arg`, then clears `res`.
    fn sp_reverse(
        &self,
        arg: &mut [&mut [Bvec]],
        res: &mut [&mut [Bvec]],
        iw: &mut [usize],
        bw: &mut [Bvec],
    ) -> Result<()>;

    /// Emit this function's body into `g` under the internal name `symbol`.
    fn emit_body(&self, g: &mut CodeGenerator<F>, symbol: &str) -> Result<()>;

    /// Build the forward generator for `k` directions:
    /// `n_in + n_in*k` inputs, `n_out*k` outputs.
    fn build_forward(&self, k: usize) -> Result<FunctionRef<F>> {
        Err(Error::GeneratorUnavailable {
            function: self.name().to_string(),
            direction: Direction::Forward,
            k,
        })
    }

    /// Build the reverse generator for `k` directions:
    /// `n_in + n_out*k` inputs, `n_in*k` outputs.
    fn build_reverse(&self, k: usize) -> Result<FunctionRef<F>> {
        Err(Error::GeneratorUnavailable {
            function: self.name().to_string(),
            direction: Direction::Reverse,
            k,
        })
    }

    /// Cached forward generator for `k` directions.
    fn forward(&self, k: usize) -> Result<FunctionRef<F>> {
        if k == 0 || k > self.config().max_batch {
            return Err(Error::GeneratorUnavailable {
                function: self.name().to_string(),
                direction: Direction::Forward,
                k,
            });
        }
        self.generators()
            .get_or_build(Direction::Forward, k, || self.build_forward(k))
    }

    /// Cached reverse generator for `k` directions.
    fn reverse(&self, k: usize) -> Result<FunctionRef<F>> {
        if k == 0 || k > self.config().max_batch {
            return Err(Error::GeneratorUnavailable {
                function: self.name().to_string(),
                direction: Direction::Reverse,
                k,
            });
        }
        self.generators()
            .get_or_build(Direction::Reverse, k, || self.build_reverse(k))
    }

    /// Allocate a workspace, check the inputs and evaluate numerically.
    fn evaluate(&self, inputs: &[&[F]]) -> Result<Vec<Vec<F>>> {
        check_signature(self, inputs.iter().map(|x| x.len()))?;
        let mut out: Vec<Vec<F>> = (0..self.n_out())
            .map(|o| vec![F::zero(); self.output_sparsity(o).nnz()])
            .collect();
        let (ni, nr) = self.workspace_requirement();
        let mut iw = vec![0usize; ni];
        let mut rw = vec![F::zero(); nr];
        let mut res: Vec<&mut [F]> = out.iter_mut().map(|v| v.as_mut_slice()).collect();
        self.eval_numeric(inputs, &mut res, &mut iw, &mut rw)?;
        Ok(out)
    }
}

/// Check that `lens` matches the nonzero counts of `f`'s inputs.
pub(crate) fn check_signature<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    lens: impl ExactSizeIterator<Item = usize>,
) -> Result<()> {
    if lens.len() != f.n_in() {
        return Err(crate::error::arity(
            f.name(),
            format!("expected {} inputs, got {}", f.n_in(), lens.len()),
        ));
    }
    for (i, len) in lens.enumerate() {
        check_len(
            &format!("{} input {i}", f.name()),
            f.input_sparsity(i).nnz(),
            len,
        )?;
    }
    Ok(())
}

/// Check that `lens` matches the nonzero counts of `f`'s outputs.
pub(crate) fn check_outputs<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    lens: impl ExactSizeIterator<Item = usize>,
) -> Result<()> {
    if lens.len() != f.n_out() {
        return Err(crate::error::arity(
            f.name(),
            format!("expected {} outputs, got {}", f.n_out(), lens.len()),
        ));
    }
    for (o, len) in lens.enumerate() {
        check_len(
            &format!("{} output {o}", f.name()),
            f.output_sparsity(o).nnz(),
            len,
        )?;
    }
    Ok(())
}

/// Identity of a function object, stable while a handle is alive.
#[inline]
pub(crate) fn function_id<F: Float>(f: &FunctionRef<F>) -> usize {
    Arc::as_ptr(f) as *const () as usize
}

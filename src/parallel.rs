//! Rayon-backed batch drivers. Functions are `Send + Sync` and never
//! mutated during evaluation, so one function is shared by every thread;
//! each thread allocates its own workspace.

use rayon::prelude::*;

use crate::error::Result;
use crate::float::Float;
use crate::function::Function;

/// Evaluate `f` at many points in parallel.
///
/// `points[p][i]` holds the nonzeros of input `i` at point `p`; the result
/// is indexed `[p][o]`.
pub fn evaluate_par<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    points: &[Vec<Vec<F>>],
) -> Result<Vec<Vec<Vec<F>>>> {
    points
        .par_iter()
        .map(|x| {
            let args: Vec<&[F]> = x.iter().map(Vec::as_slice).collect();
            f.evaluate(&args)
        })
        .collect()
}

/// Dense Jacobian with one reverse sweep per output nonzero, parallelized
/// over rows. Returns the flattened output values and
/// `J[i][j] = ∂y_i/∂x_j` over flattened nonzeros, like [`crate::api::jacobian`].
pub fn jacobian_par<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    x: &[&[F]],
) -> Result<(Vec<F>, Vec<Vec<F>>)> {
    let values: Vec<F> = f.evaluate(x)?.into_iter().flatten().collect();
    let g = f.reverse(1)?;
    let out_nnz: Vec<usize> = (0..f.n_out()).map(|o| f.output_sparsity(o).nnz()).collect();
    let jac = (0..values.len())
        .into_par_iter()
        .map(|row| {
            let mut offset = 0;
            let seeds: Vec<Vec<F>> = out_nnz
                .iter()
                .map(|&len| {
                    let mut s = vec![F::zero(); len];
                    if row >= offset && row < offset + len {
                        s[row - offset] = F::one();
                    }
                    offset += len;
                    s
                })
                .collect();
            let args: Vec<&[F]> = x
                .iter()
                .copied()
                .chain(seeds.iter().map(Vec::as_slice))
                .collect();
            Ok(g.evaluate(&args)?.into_iter().flatten().collect())
        })
        .collect::<Result<Vec<Vec<F>>>>()?;
    Ok((values, jac))
}

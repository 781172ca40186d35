//! Convenience drivers over any [`Function`].
//!
//! Values are passed as nonzero buffers, one per input or output, laid out
//! by the declared sparsities.

use crate::error::Result;
use crate::float::Float;
use crate::function::{check_signature, Bvec, Function};
use crate::sparsity::Sparsity;

/// Evaluate `f` at `x`.
pub fn evaluate<F: Float, G: Function<F> + ?Sized>(f: &G, x: &[&[F]]) -> Result<Vec<Vec<F>>> {
    f.evaluate(x)
}

/// Jacobian-vector product (forward mode): `(f(x), J·v)`.
///
/// ```
/// use symgraph::{api, Mx, MxFunction};
///
/// let x = Mx::<f64>::sym("x", 1, 1);
/// let f = MxFunction::new("sq", vec![x.clone()], vec![(&x * &x).unwrap()]).unwrap();
/// let (y, t) = api::jvp(&f, &[&[3.0]], &[&[1.0]]).unwrap();
/// assert!((y[0][0] - 9.0).abs() < 1e-12);
/// assert!((t[0][0] - 6.0).abs() < 1e-12);
/// ```
pub fn jvp<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    x: &[&[F]],
    v: &[&[F]],
) -> Result<(Vec<Vec<F>>, Vec<Vec<F>>)> {
    check_signature(f, v.iter().map(|s| s.len()))?;
    let values = f.evaluate(x)?;
    let g = f.forward(1)?;
    let args: Vec<&[F]> = x.iter().chain(v).copied().collect();
    Ok((values, g.evaluate(&args)?))
}

/// Vector-Jacobian product (reverse mode): `(f(x), wᵀ·J)`.
pub fn vjp<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    x: &[&[F]],
    w: &[&[F]],
) -> Result<(Vec<Vec<F>>, Vec<Vec<F>>)> {
    let values = f.evaluate(x)?;
    let g = f.reverse(1)?;
    let args: Vec<&[F]> = x.iter().chain(w).copied().collect();
    Ok((values, g.evaluate(&args)?))
}

/// Dense Jacobian of all output nonzeros with respect to all input nonzeros.
///
/// Returns `(f(x), J)` where `J[i][j] = ∂y_i/∂x_j` over the flattened
/// nonzeros. Columns are computed in batches of up to `max_batch`
/// directions, one forward generator evaluation per batch.
pub fn jacobian<F: Float, G: Function<F> + ?Sized>(
    f: &G,
    x: &[&[F]],
) -> Result<(Vec<F>, Vec<Vec<F>>)> {
    let values: Vec<F> = f.evaluate(x)?.into_iter().flatten().collect();
    let in_nnz: Vec<usize> = (0..f.n_in()).map(|i| f.input_sparsity(i).nnz()).collect();
    let n: usize = in_nnz.iter().sum();
    let m = values.len();
    let mut jac = vec![vec![F::zero(); n]; m];

    let batch = f.config().max_batch.max(1);
    let mut start = 0;
    while start < n {
        let k = batch.min(n - start);
        let g = f.forward(k)?;
        let seeds: Vec<Vec<F>> = (0..k)
            .flat_map(|d| {
                let mut offset = 0;
                in_nnz
                    .iter()
                    .map(|&len| {
                        let mut s = vec![F::zero(); len];
                        let j = start + d;
                        if j >= offset && j < offset + len {
                            s[j - offset] = F::one();
                        }
                        offset += len;
                        s
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let args: Vec<&[F]> = x
            .iter()
            .copied()
            .chain(seeds.iter().map(Vec::as_slice))
            .collect();
        let out = g.evaluate(&args)?;
        for d in 0..k {
            let column = out[d * f.n_out()..(d + 1) * f.n_out()].iter().flatten();
            for (row, &v) in jac.iter_mut().zip(column) {
                row[start + d] = v;
            }
        }
        start += k;
    }
    Ok((values, jac))
}

fn bit_buffers<F: Float, G: Function<F> + ?Sized>(f: &G) -> (Vec<usize>, Vec<Bvec>) {
    let (ni, nr) = f.workspace_requirement();
    (vec![0; ni], vec![0; nr])
}

/// Jacobian pattern from forward dependency sweeps, 64 input nonzeros per
/// sweep. Rows index flattened output nonzeros, columns flattened input
/// nonzeros.
pub fn jacobian_sparsity<F: Float, G: Function<F> + ?Sized>(f: &G) -> Result<Sparsity> {
    let in_nnz: Vec<usize> = (0..f.n_in()).map(|i| f.input_sparsity(i).nnz()).collect();
    let out_nnz: Vec<usize> = (0..f.n_out()).map(|o| f.output_sparsity(o).nnz()).collect();
    let n: usize = in_nnz.iter().sum();
    let m: usize = out_nnz.iter().sum();
    let (mut iw, mut bw) = bit_buffers(f);
    let (mut rows, mut cols) = (Vec::new(), Vec::new());

    let mut arg: Vec<Vec<Bvec>> = in_nnz.iter().map(|&len| vec![0; len]).collect();
    let mut res: Vec<Vec<Bvec>> = out_nnz.iter().map(|&len| vec![0; len]).collect();
    for block in (0..n).step_by(Bvec::BITS as usize) {
        let mut p = 0;
        for a in arg.iter_mut() {
            for v in a.iter_mut() {
                *v = if p >= block && p - block < Bvec::BITS as usize {
                    1 << (p - block)
                } else {
                    0
                };
                p += 1;
            }
        }
        {
            let arg_refs: Vec<&[Bvec]> = arg.iter().map(Vec::as_slice).collect();
            let mut res_refs: Vec<&mut [Bvec]> = res.iter_mut().map(Vec::as_mut_slice).collect();
            f.sp_forward(&arg_refs, &mut res_refs, &mut iw, &mut bw)?;
        }
        for (q, &bits) in res.iter().flatten().enumerate() {
            let mut bits = bits;
            while bits != 0 {
                let b = bits.trailing_zeros() as usize;
                rows.push(q);
                cols.push(block + b);
                bits &= bits - 1;
            }
        }
    }
    Sparsity::from_triplets(m, n, &rows, &cols)
}

/// Jacobian pattern from reverse dependency sweeps, 64 output nonzeros per
/// sweep. Same layout as [`jacobian_sparsity`].
pub fn jacobian_sparsity_reverse<F: Float, G: Function<F> + ?Sized>(f: &G) -> Result<Sparsity> {
    let in_nnz: Vec<usize> = (0..f.n_in()).map(|i| f.input_sparsity(i).nnz()).collect();
    let out_nnz: Vec<usize> = (0..f.n_out()).map(|o| f.output_sparsity(o).nnz()).collect();
    let n: usize = in_nnz.iter().sum();
    let m: usize = out_nnz.iter().sum();
    let (mut iw, mut bw) = bit_buffers(f);
    let (mut rows, mut cols) = (Vec::new(), Vec::new());

    let mut arg: Vec<Vec<Bvec>> = in_nnz.iter().map(|&len| vec![0; len]).collect();
    let mut res: Vec<Vec<Bvec>> = out_nnz.iter().map(|&len| vec![0; len]).collect();
    for block in (0..m).step_by(Bvec::BITS as usize) {
        let mut q = 0;
        for r in res.iter_mut() {
            for v in r.iter_mut() {
                *v = if q >= block && q - block < Bvec::BITS as usize {
                    1 << (q - block)
                } else {
                    0
                };
                q += 1;
            }
        }
        for a in arg.iter_mut() {
            a.fill(0);
        }
        {
            let mut arg_refs: Vec<&mut [Bvec]> = arg.iter_mut().map(Vec::as_mut_slice).collect();
            let mut res_refs: Vec<&mut [Bvec]> = res.iter_mut().map(Vec::as_mut_slice).collect();
            f.sp_reverse(&mut arg_refs, &mut res_refs, &mut iw, &mut bw)?;
        }
        for (p, &bits) in arg.iter().flatten().enumerate() {
            let mut bits = bits;
            while bits != 0 {
                let b = bits.trailing_zeros() as usize;
                rows.push(block + b);
                cols.push(p);
                bits &= bits - 1;
            }
        }
    }
    Sparsity::from_triplets(m, n, &rows, &cols)
}

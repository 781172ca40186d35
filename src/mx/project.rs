use log::trace;

use crate::error::{arity, Result};
use crate::float::Float;
use crate::sparsity::Sparsity;

use super::{Mx, Op};

/// Restructure `x` onto the pattern `sp`.
///
/// Returns `x` itself when its pattern already equals `sp`. Otherwise a
/// projection node is created: shared coordinates keep their value,
/// coordinates only in `sp` read as zero, and coordinates only in `x` are
/// dropped. Fails with [`Error::Projection`](crate::Error::Projection) when
/// the shapes differ.
pub fn project<F: Float>(x: &Mx<F>, sp: &Sparsity) -> Result<Mx<F>> {
    if x.sparsity() == sp {
        return Ok(x.clone());
    }
    let map = x.sparsity().project_map(sp)?;
    trace!("projecting {} onto {}", x.sparsity(), sp);
    Ok(Mx::from_parts(Op::Project(map), vec![x.clone()], vec![sp.clone()]))
}

/// Projection of argument `i` of a call to `context`, where a shape
/// disagreement is a signature mismatch rather than a projection failure.
pub(crate) fn project_arg<F: Float>(
    x: &Mx<F>,
    sp: &Sparsity,
    context: &str,
    i: usize,
) -> Result<Mx<F>> {
    if !x.sparsity().same_shape(sp) {
        return Err(arity(
            context,
            format!(
                "argument {i} is {} but the input is declared {}",
                x.sparsity().dim(),
                sp.dim()
            ),
        ));
    }
    project(x, sp)
}

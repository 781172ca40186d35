//! The call node: one invocation of a reusable function inside a graph.
//!
//! Construction validates the argument count and projects every argument
//! onto the declared input pattern, so the wrapped function always sees
//! exactly the layout it was built for. Every evaluation mode then simply
//! delegates to the function: numeric and symbolic evaluation to its own
//! entries, derivatives to its cached generators, sparsity to its bit
//! propagation, and code emission to its once-emitted body.

use std::sync::Arc;

use log::trace;

use crate::codegen::CodeGenerator;
use crate::error::{arity, Result};
use crate::float::Float;
use crate::function::FunctionRef;

use super::{project_arg, Mx, Op};

impl<F: Float> Mx<F> {
    /// Invoke `f` on `args`.
    ///
    /// Returns one handle per function output: the call node itself when
    /// `f` has a single output, otherwise one view per output. Output `i`
    /// carries exactly `f.output_sparsity(i)`.
    ///
    /// ```
    /// use symgraph::{Function, Mx, MxFunction, Sparsity};
    ///
    /// let a = Mx::<f64>::sym("a", 1, 1);
    /// let b = Mx::<f64>::sym("b", 1, 1);
    /// let f = MxFunction::new("f", vec![a.clone(), b.clone()], vec![(&a * &b).unwrap()])
    ///     .unwrap()
    ///     .into_ref();
    ///
    /// let y = Mx::call(&f, &[Mx::scalar(3.0), Mx::zeros(1, 1)]).unwrap();
    /// assert_eq!(y[0].sparsity(), f.output_sparsity(0));
    /// ```
    pub fn call(f: &FunctionRef<F>, args: &[Mx<F>]) -> Result<Vec<Mx<F>>> {
        create_primary(f, args)?.outputs()
    }
}

/// Build the invocation record of `f` on `args`.
pub(crate) fn create_primary<F: Float>(f: &FunctionRef<F>, args: &[Mx<F>]) -> Result<Mx<F>> {
    let context = format!("call to `{}`", f.name());
    if args.len() != f.n_in() {
        return Err(arity(
            context,
            format!("expected {} arguments, got {}", f.n_in(), args.len()),
        ));
    }
    let deps = args
        .iter()
        .enumerate()
        .map(|(i, a)| project_arg(a, f.input_sparsity(i), &context, i))
        .collect::<Result<Vec<_>>>()?;
    let sparsity = (0..f.n_out())
        .map(|o| f.output_sparsity(o).clone())
        .collect();
    trace!("{context}: {} arguments, {} outputs", deps.len(), f.n_out());
    Ok(Mx::from_parts(Op::Call(Arc::clone(f)), deps, sparsity))
}

/// Add `term` into `acc`, treating an empty accumulator as zero.
pub(crate) fn accumulate<F: Float>(acc: &mut Option<Mx<F>>, term: Mx<F>) -> Result<()> {
    *acc = Some(match acc.take() {
        Some(a) => (&a + &term)?,
        None => term,
    });
    Ok(())
}

fn is_active<F: Float>(seed: &Option<Mx<F>>) -> bool {
    seed.as_ref().map_or(false, |s| !s.is_zero())
}

/// Forward sensitivities of a call node. `fseed[d][i]` seeds argument `i`
/// in direction `d`; the result is indexed `[d][o]`.
///
/// Directions whose seeds are all zero are dropped before the generator is
/// requested, so the batch size actually used is the number of live ones.
pub(crate) fn call_forward<F: Float>(
    node: &Mx<F>,
    f: &FunctionRef<F>,
    fseed: &[Vec<Option<Mx<F>>>],
) -> Result<Vec<Vec<Option<Mx<F>>>>> {
    let (n_in, n_out) = (f.n_in(), f.n_out());
    let mut fsens = vec![vec![None; n_out]; fseed.len()];
    let live: Vec<usize> = (0..fseed.len())
        .filter(|&d| fseed[d].iter().any(is_active))
        .collect();
    if live.is_empty() {
        return Ok(fsens);
    }

    let g = f.forward(live.len())?;
    let mut args: Vec<Mx<F>> = node.deps().to_vec();
    for &d in &live {
        for i in 0..n_in {
            args.push(match &fseed[d][i] {
                Some(s) => s.clone(),
                None => Mx::filled(f.input_sparsity(i).clone(), F::zero()),
            });
        }
    }
    let out = Mx::call(&g, &args)?;
    for (m, &d) in live.iter().enumerate() {
        for o in 0..n_out {
            fsens[d][o] = Some(out[m * n_out + o].clone());
        }
    }
    Ok(fsens)
}

/// Reverse sensitivities of a call node. `aseed[d][o]` is the adjoint of
/// output `o` in direction `d`; contributions are added into `asens[d][i]`.
pub(crate) fn call_reverse<F: Float>(
    node: &Mx<F>,
    f: &FunctionRef<F>,
    aseed: &[Vec<Option<Mx<F>>>],
    asens: &mut [Vec<Option<Mx<F>>>],
) -> Result<()> {
    let (n_in, n_out) = (f.n_in(), f.n_out());
    let live: Vec<usize> = (0..aseed.len())
        .filter(|&d| aseed[d].iter().any(is_active))
        .collect();
    if live.is_empty() {
        return Ok(());
    }

    let g = f.reverse(live.len())?;
    let mut args: Vec<Mx<F>> = node.deps().to_vec();
    for &d in &live {
        for o in 0..n_out {
            args.push(match &aseed[d][o] {
                Some(s) => s.clone(),
                None => Mx::filled(f.output_sparsity(o).clone(), F::zero()),
            });
        }
    }
    let out = Mx::call(&g, &args)?;
    for (m, &d) in live.iter().enumerate() {
        for i in 0..n_in {
            accumulate(&mut asens[d][i], out[m * n_in + i].clone())?;
        }
    }
    Ok(())
}

/// Call into the shared body of `f`, wiring argument and result buffers.
pub(crate) fn call_emit<F: Float>(
    f: &FunctionRef<F>,
    g: &mut CodeGenerator<F>,
    arg: &[String],
    res: &[String],
) -> Result<()> {
    let symbol = g.add_dependency(f)?;
    let real = g.real().to_string();
    g.line("{");
    g.line(format!(
        "  const {real}* a[{}] = {{{}}};",
        arg.len().max(1),
        if arg.is_empty() { "0".to_string() } else { arg.join(", ") }
    ));
    g.line(format!(
        "  {real}* r[{}] = {{{}}};",
        res.len().max(1),
        if res.is_empty() { "0".to_string() } else { res.join(", ") }
    ));
    g.line(format!("  if ({symbol}(a, r, iw, w)) return 1;"));
    g.line("}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::mx_function::MxFunction;

    #[test]
    fn reverse_contributions_add_up() {
        let x = Mx::<f64>::sym("x", 1, 1);
        let f = MxFunction::new("sin", vec![x.clone()], vec![x.sin().unwrap()])
            .unwrap()
            .into_ref();
        let z = Mx::sym("z", 1, 1);
        let node = create_primary(&f, &[z.clone()]).unwrap();

        let aseed = vec![vec![Some(Mx::scalar(1.0))]];
        let mut asens = vec![vec![None]];
        call_reverse(&node, &f, &aseed, &mut asens).unwrap();
        call_reverse(&node, &f, &aseed, &mut asens).unwrap();

        let total = asens[0][0].clone().unwrap();
        let g = MxFunction::new("g", vec![z], vec![total]).unwrap();
        let v = g.evaluate(&[&[0.25]]).unwrap();
        assert!((v[0][0] - 2.0 * 0.25f64.cos()).abs() < 1e-14);
    }

    #[test]
    fn zero_directions_are_skipped() {
        let x = Mx::<f64>::sym("x", 1, 1);
        let f = MxFunction::new("sq", vec![x.clone()], vec![(&x * &x).unwrap()])
            .unwrap()
            .into_ref();
        let node = create_primary(&f, &[Mx::sym("z", 1, 1)]).unwrap();
        let fseed = vec![
            vec![Some(Mx::scalar(0.0))],
            vec![Some(Mx::sym("t", 1, 1))],
            vec![None],
        ];
        let fsens = call_forward(&node, &f, &fseed).unwrap();
        assert!(fsens[0][0].is_none());
        assert!(fsens[1][0].is_some());
        assert!(fsens[2][0].is_none());
        assert_eq!(f.generators().cached(crate::Direction::Forward), vec![1]);
    }
}

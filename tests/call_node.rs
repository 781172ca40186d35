use std::sync::Arc;

use symgraph::{Error, Function, FunctionRef, Mx, MxFunction, Op, Sparsity};

fn mul_fn() -> FunctionRef<f64> {
    let a = Mx::sym("a", 1, 1);
    let b = Mx::sym("b", 1, 1);
    MxFunction::new("mul", vec![a.clone(), b.clone()], vec![(&a * &b).unwrap()])
        .unwrap()
        .into_ref()
}

fn split_fn() -> FunctionRef<f64> {
    let x = Mx::sym("x", 2, 1);
    let s = x.sin().unwrap();
    let c = x.cos().unwrap();
    MxFunction::new("split", vec![x], vec![s, c]).unwrap().into_ref()
}

// ── construction ──

#[test]
fn wrong_argument_count_is_rejected() {
    let f = mul_fn();
    let r = Mx::call(&f, &[Mx::scalar(1.0)]);
    assert!(matches!(r, Err(Error::ArityMismatch { .. })));
}

#[test]
fn wrong_argument_shape_is_rejected() {
    let f = mul_fn();
    let r = Mx::call(&f, &[Mx::sym("p", 2, 1), Mx::scalar(1.0)]);
    assert!(matches!(r, Err(Error::ArityMismatch { .. })));
}

#[test]
fn arguments_are_projected_onto_declared_inputs() {
    let f = mul_fn();
    let y = Mx::call(&f, &[Mx::scalar(3.0), Mx::zeros(1, 1)]).unwrap();
    let b = y[0].function_input(1).unwrap();
    assert_eq!(b.sparsity(), f.input_sparsity(1));
    assert!(matches!(b.op(), Op::Project(_)));
}

#[test]
fn matching_arguments_are_not_wrapped() {
    let f = mul_fn();
    let a = Mx::sym("p", 1, 1);
    let y = Mx::call(&f, &[a.clone(), Mx::scalar(2.0)]).unwrap();
    assert!(y[0].function_input(0).unwrap().ptr_eq(&a));
}

#[test]
fn output_carries_exact_function_sparsity() {
    let x = Mx::<f64>::symbol("x", Sparsity::diag(3));
    let f = MxFunction::new("sq", vec![x.clone()], vec![(&x * &x).unwrap()])
        .unwrap()
        .into_ref();
    let y = Mx::call(&f, &[Mx::sym("d", 3, 3)]).unwrap();
    assert_eq!(y[0].sparsity(), &Sparsity::diag(3));
}

#[test]
fn structurally_zero_argument_yields_zero() {
    let f = mul_fn();
    let p = Mx::sym("p", 1, 1);
    let y = Mx::call(&f, &[p.clone(), Mx::zeros(1, 1)]).unwrap().remove(0);
    let g = MxFunction::new("g", vec![p], vec![y]).unwrap();
    let out = g.evaluate(&[&[7.0]]).unwrap();
    assert_eq!(out[0], vec![0.0]);
}

// ── multiple outputs ──

#[test]
fn multi_output_call_returns_views() {
    let f = split_fn();
    let x = Mx::sym("z", 2, 1);
    let ys = Mx::call(&f, &[x]).unwrap();
    assert_eq!(ys.len(), 2);
    for (i, y) in ys.iter().enumerate() {
        assert!(y.is_output_view());
        assert_eq!(y.function_output(), Some(i));
        assert!(y.primary().ptr_eq(ys[0].primary()));
        assert!(Arc::ptr_eq(y.function().unwrap(), &f));
    }
}

#[test]
fn single_output_call_is_its_own_output() {
    let f = mul_fn();
    let y = Mx::call(&f, &[Mx::scalar(1.0), Mx::scalar(2.0)]).unwrap();
    assert!(!y[0].is_output_view());
    assert!(y[0].get_output(0).unwrap().ptr_eq(&y[0]));
    assert_eq!(y[0].function_output(), Some(0));
}

#[test]
fn out_of_range_output_is_rejected() {
    let f = split_fn();
    let ys = Mx::call(&f, &[Mx::sym("z", 2, 1)]).unwrap();
    assert!(matches!(
        ys[0].get_output(2),
        Err(Error::ArityMismatch { .. })
    ));
}

#[test]
fn views_of_one_output_share_a_slot() {
    let f = split_fn();
    let z = Mx::sym("z", 2, 1);
    let ys = Mx::call(&f, &[z.clone()]).unwrap();
    let again = ys[1].primary().get_output(0).unwrap();
    assert!(!again.ptr_eq(&ys[0]));
    let sum = (&ys[0] + &again).unwrap();
    let g = MxFunction::new("g", vec![z], vec![sum]).unwrap();
    // one call, one add
    assert_eq!(g.schedule().num_steps(), 2);
    let out = g.evaluate(&[&[0.3, 0.4]]).unwrap();
    assert!((out[0][0] - 2.0 * 0.3f64.sin()).abs() < 1e-14);
    assert!((out[0][1] - 2.0 * 0.4f64.sin()).abs() < 1e-14);
}

#[test]
fn unused_outputs_do_not_break_evaluation() {
    let f = split_fn();
    let z = Mx::sym("z", 2, 1);
    let ys = Mx::call(&f, &[z.clone()]).unwrap();
    let g = MxFunction::new("g", vec![z], vec![ys[1].clone()]).unwrap();
    let out = g.evaluate(&[&[0.0, 1.0]]).unwrap();
    assert_eq!(out[0], vec![1.0, 1.0f64.cos()]);
}

// ── projection ──

#[test]
fn projection_is_idempotent() {
    let x = Mx::<f64>::sym("x", 2, 2);
    let sp = Sparsity::diag(2);
    let once = symgraph::project(&x, &sp).unwrap();
    let twice = symgraph::project(&once, &sp).unwrap();
    assert!(once.ptr_eq(&twice));
    assert!(symgraph::project(&x, x.sparsity()).unwrap().ptr_eq(&x));
}

#[test]
fn projection_across_shapes_fails() {
    let x = Mx::<f64>::sym("x", 2, 2);
    let r = symgraph::project(&x, &Sparsity::dense(3, 1));
    assert!(matches!(r, Err(Error::Projection { .. })));
}

#[test]
fn projection_fills_and_drops() {
    let x = Mx::<f64>::symbol("x", Sparsity::diag(2));
    let y = symgraph::project(&x, &Sparsity::dense(2, 2)).unwrap();
    let back = symgraph::project(&y, &Sparsity::from_triplets(2, 2, &[1], &[0]).unwrap()).unwrap();
    let f = MxFunction::new("p", vec![x], vec![y, back]).unwrap();
    let out = f.evaluate(&[&[1.0, 2.0]]).unwrap();
    assert_eq!(out[0], vec![1.0, 0.0, 0.0, 2.0]);
    assert_eq!(out[1], vec![0.0]);
}

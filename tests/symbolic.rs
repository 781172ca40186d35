use approx::assert_relative_eq;
use symgraph::{Function, Mx, MxFunction, Sparsity, SxFunction, SxTape};

fn nested() -> MxFunction<f64> {
    let x = Mx::sym("x", 2, 1);
    let inner = MxFunction::new("inner", vec![x.clone()], vec![x.sin().unwrap(), x.exp().unwrap()])
        .unwrap()
        .into_ref();
    let z = Mx::sym("z", 2, 1);
    let ys = Mx::call(&inner, &[z.clone()]).unwrap();
    let w = Mx::call(&inner, &[ys[0].clone()]).unwrap();
    let out = (&(&w[1] * &ys[1]).unwrap() - &z).unwrap();
    MxFunction::new("outer", vec![z], vec![out, w[0].clone()]).unwrap()
}

#[test]
fn expand_produces_equivalent_scalar_function() {
    let f = nested();
    let sx = f.expand().unwrap();
    assert_eq!(sx.n_in(), 1);
    assert_eq!(sx.n_out(), 2);
    assert_eq!(sx.output_sparsity(0), f.output_sparsity(0));
    for x in [[0.1, 0.2], [-1.0, 2.0]] {
        let a = f.evaluate(&[&x]).unwrap();
        let b = sx.evaluate(&[&x]).unwrap();
        for (ra, rb) in a.iter().zip(&b) {
            for (p, q) in ra.iter().zip(rb) {
                assert_relative_eq!(*p, *q, max_relative = 1e-14);
            }
        }
    }
}

#[test]
fn scalar_evaluation_inlines_into_a_caller_tape() {
    let f = nested();
    let mut tape = SxTape::<f64>::new();
    let a = tape.new_input();
    let b = tape.new_input();
    let out = f.eval_sx(&mut tape, &[&[a, b]]).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].len(), 2);

    let g = SxFunction::from_tape(
        "inlined",
        tape,
        vec![Sparsity::column(2)],
        vec![Sparsity::column(2), Sparsity::column(2)],
        out,
    )
    .unwrap();
    let x = [0.4, 0.9];
    let want = f.evaluate(&[&x]).unwrap();
    let got = g.evaluate(&[&x]).unwrap();
    for (ra, rb) in want.iter().zip(&got) {
        for (p, q) in ra.iter().zip(rb) {
            assert_relative_eq!(*p, *q, max_relative = 1e-14);
        }
    }
}

#[test]
fn call_inline_substitutes_arguments() {
    let x = Mx::sym("x", 1, 1);
    let y = Mx::sym("y", 1, 1);
    let body = (&x * &y.cos().unwrap()).unwrap();
    let f = MxFunction::new("f", vec![x.clone(), y.clone()], vec![body]).unwrap();

    let p = Mx::sym("p", 1, 1);
    let q = Mx::sym("q", 1, 1);
    let out = f.call_inline(&[p.clone(), q.clone()]).unwrap();
    let g = MxFunction::new("g", vec![p, q], out).unwrap();
    let v = g.evaluate(&[&[2.0], &[0.5]]).unwrap();
    assert_relative_eq!(v[0][0], 2.0 * 0.5f64.cos(), max_relative = 1e-15);
    // inlined: no call node left
    assert!(g.schedule().nodes().all(|n| n.function().is_none()));
}

#[test]
fn call_inline_keeps_input_free_subgraphs_shared() {
    let x = Mx::sym("x", 1, 1);
    let c = Mx::scalar(3.0).exp().unwrap();
    let f = MxFunction::new("f", vec![x.clone()], vec![(&x * &c).unwrap()]).unwrap();
    let out = f.call_inline(&[Mx::sym("p", 1, 1)]).unwrap();
    assert!(out[0].dep(1).ptr_eq(&c));
}

#[test]
fn call_inline_validates_arguments() {
    let x = Mx::<f64>::sym("x", 2, 1);
    let f = MxFunction::new("f", vec![x.clone()], vec![x.clone()]).unwrap();
    assert!(f.call_inline(&[]).is_err());
    assert!(f.call_inline(&[Mx::sym("p", 1, 2)]).is_err());
    // sparse argument is projected onto the dense input
    let sp = Sparsity::from_triplets(2, 1, &[1], &[0]).unwrap();
    let out = f.call_inline(&[Mx::symbol("s", sp)]).unwrap();
    assert!(out[0].sparsity().is_dense());
}

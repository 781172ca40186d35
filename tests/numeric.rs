use approx::assert_relative_eq;
use symgraph::{
    Error, Function, FunctionRef, Mx, MxFunction, OpCode, Sparsity, SxFunction, Workspace,
};

fn poly() -> FunctionRef<f64> {
    // p(x) = x^3 - 2x + 1
    SxFunction::build("poly", vec![Sparsity::scalar()], vec![Sparsity::scalar()], |t, x| {
        let x = x[0][0];
        let c2 = t.push_const(2.0);
        let one = t.push_const(1.0);
        let x3 = t.push_powi(x, 3);
        let tx = t.push_op(OpCode::Mul, c2, x);
        let d = t.push_op(OpCode::Sub, x3, tx);
        Ok(vec![vec![t.push_op(OpCode::Add, d, one)]])
    })
    .unwrap()
    .into_ref()
}

fn p(x: f64) -> f64 {
    x * x * x - 2.0 * x + 1.0
}

// ── plain evaluation ──

#[test]
fn sx_function_evaluates() {
    let f = poly();
    let y = f.evaluate(&[&[1.5]]).unwrap();
    assert_relative_eq!(y[0][0], p(1.5), max_relative = 1e-14);
}

#[test]
fn wrong_input_length_is_rejected() {
    let f = poly();
    assert!(matches!(
        f.evaluate(&[&[1.0, 2.0]]),
        Err(Error::BufferSize { .. })
    ));
    assert!(matches!(
        f.evaluate(&[]),
        Err(Error::ArityMismatch { .. })
    ));
}

#[test]
fn elementwise_ops_match_std() {
    let x = Mx::<f64>::sym("x", 3, 1);
    let outs = vec![
        x.exp().unwrap(),
        x.sqrt().unwrap(),
        x.tanh().unwrap(),
        x.powi(-2).unwrap(),
        (&x / &x.cos().unwrap()).unwrap(),
        (-&x).unwrap(),
    ];
    let f = MxFunction::new("ops", vec![x], outs).unwrap();
    let v = [0.3, 1.1, 2.5];
    let y = f.evaluate(&[&v]).unwrap();
    for (j, &a) in v.iter().enumerate() {
        assert_relative_eq!(y[0][j], a.exp(), max_relative = 1e-14);
        assert_relative_eq!(y[1][j], a.sqrt(), max_relative = 1e-14);
        assert_relative_eq!(y[2][j], a.tanh(), max_relative = 1e-14);
        assert_relative_eq!(y[3][j], a.powi(-2), max_relative = 1e-14);
        assert_relative_eq!(y[4][j], a / a.cos(), max_relative = 1e-14);
        assert_relative_eq!(y[5][j], -a, max_relative = 1e-14);
    }
}

// ── nesting ──

#[test]
fn nested_calls_compose() {
    let f = poly();
    let x = Mx::sym("x", 1, 1);
    let inner = Mx::call(&f, &[x.clone()]).unwrap().remove(0);
    let g = MxFunction::new("g", vec![x.clone()], vec![inner])
        .unwrap()
        .into_ref();

    let z = Mx::sym("z", 1, 1);
    let a = Mx::call(&g, &[z.clone()]).unwrap().remove(0);
    let b = Mx::call(&g, &[a.clone()]).unwrap().remove(0);
    let h = MxFunction::new("h", vec![z], vec![(&a + &b).unwrap()]).unwrap();

    let x0 = 0.7;
    let y = h.evaluate(&[&[x0]]).unwrap();
    assert_relative_eq!(y[0][0], p(x0) + p(p(x0)), max_relative = 1e-14);
}

#[test]
fn shared_subexpression_evaluates_once() {
    let x = Mx::<f64>::sym("x", 4, 1);
    let mut e = x.sin().unwrap();
    for _ in 0..30 {
        e = (&e + &e).unwrap();
    }
    let f = MxFunction::new("doubling", vec![x], vec![e]).unwrap();
    assert_eq!(f.schedule().num_steps(), 31);
    let y = f.evaluate(&[&[1.0, 0.0, -1.0, 0.5]]).unwrap();
    assert_relative_eq!(y[0][0], 1.0f64.sin() * 2f64.powi(30), max_relative = 1e-12);
    assert_eq!(y[0][1], 0.0);
}

#[test]
fn sparse_inputs_keep_their_layout() {
    let sp = Sparsity::from_triplets(3, 3, &[0, 2, 1], &[0, 0, 2]).unwrap();
    let x = Mx::<f64>::symbol("x", sp.clone());
    let y = (&x * &Mx::filled(sp, 3.0)).unwrap();
    let f = MxFunction::new("scale", vec![x], vec![y]).unwrap();
    let out = f.evaluate(&[&[1.0, 2.0, 3.0]]).unwrap();
    assert_eq!(out[0], vec![3.0, 6.0, 9.0]);
}

#[test]
fn constant_output_needs_no_input() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let c = Mx::dense(2, 1, vec![4.0, 5.0]).unwrap();
    let f = MxFunction::new("c", vec![x], vec![c]).unwrap();
    assert_eq!(f.evaluate(&[&[0.0]]).unwrap()[0], vec![4.0, 5.0]);
}

// ── workspace ──

#[test]
fn workspace_covers_nested_callees() {
    let f = poly();
    let (_, inner_nr) = f.workspace_requirement();
    assert!(inner_nr > 0);

    let x = Mx::sym("x", 1, 1);
    let y = Mx::call(&f, &[x.clone()]).unwrap().remove(0);
    let g = MxFunction::new("g", vec![x], vec![y]).unwrap();
    let (_, nr) = g.workspace_requirement();
    assert!(nr >= inner_nr + 2);

    let mut ws = Workspace::<f64>::new(&g);
    let mut out = [0.0];
    g.eval_numeric(&[&[2.0]], &mut [&mut out], &mut ws.iw, &mut ws.rw)
        .unwrap();
    assert_relative_eq!(out[0], p(2.0), max_relative = 1e-14);
}

#[test]
fn short_workspace_is_rejected() {
    let x = Mx::<f64>::sym("x", 2, 1);
    let g = MxFunction::new("g", vec![x.clone()], vec![x.sin().unwrap()]).unwrap();
    let (ni, nr) = g.workspace_requirement();
    let mut iw = vec![0; ni];
    let mut rw = vec![0.0; nr - 1];
    let mut out = [0.0; 2];
    let r = g.eval_numeric(&[&[1.0, 2.0]], &mut [&mut out], &mut iw, &mut rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
}

#[test]
fn free_symbol_is_rejected_at_construction() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let q = Mx::<f64>::sym("q", 1, 1);
    let r = MxFunction::new("bad", vec![x.clone()], vec![(&x + &q).unwrap()]);
    assert!(matches!(r, Err(Error::FreeVariable(name)) if name == "q"));
}

#[test]
fn non_symbolic_input_is_rejected() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let r = MxFunction::new("bad", vec![x.sin().unwrap()], vec![x]);
    assert!(matches!(r, Err(Error::NotSymbolic(0))));
}

#[test]
fn output_buffers_are_checked() {
    let x = Mx::<f64>::sym("x", 2, 1);
    let g = MxFunction::new("g", vec![x.clone()], vec![x.sin().unwrap()]).unwrap();
    let sx = g.expand().unwrap();
    let mut ws = Workspace::<f64>::new(&g);
    let mut sws = Workspace::<f64>::new(&sx);

    let mut short = [0.0; 1];
    let r = g.eval_numeric(&[&[1.0, 2.0]], &mut [&mut short], &mut ws.iw, &mut ws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
    let r = sx.eval_numeric(&[&[1.0, 2.0]], &mut [&mut short], &mut sws.iw, &mut sws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));

    let r = g.eval_numeric(&[&[1.0, 2.0]], &mut [], &mut ws.iw, &mut ws.rw);
    assert!(matches!(r, Err(Error::ArityMismatch { .. })));
    let r = sx.eval_numeric(&[&[1.0, 2.0]], &mut [], &mut sws.iw, &mut sws.rw);
    assert!(matches!(r, Err(Error::ArityMismatch { .. })));
}

#[test]
fn dependency_buffers_are_checked() {
    let x = Mx::<f64>::sym("x", 2, 1);
    let g = MxFunction::new("g", vec![x.clone()], vec![x.sin().unwrap()]).unwrap();
    let sx = g.expand().unwrap();
    let mut ws = Workspace::<symgraph::Bvec>::new(&g);
    let mut sws = Workspace::<symgraph::Bvec>::new(&sx);

    let mut arg = [1, 2];
    let mut long = [0; 3];
    let r = g.sp_forward(&[&arg], &mut [&mut long], &mut ws.iw, &mut ws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
    let r = sx.sp_forward(&[&arg], &mut [&mut long], &mut sws.iw, &mut sws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
    let r = g.sp_reverse(&mut [&mut arg], &mut [&mut long], &mut ws.iw, &mut ws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
    let r = sx.sp_reverse(&mut [&mut arg], &mut [&mut long], &mut sws.iw, &mut sws.rw);
    assert!(matches!(r, Err(Error::BufferSize { .. })));
}

#[test]
fn sequential_calls_reuse_node_scratch() {
    let f = poly();
    let (_, inner_nr) = f.workspace_requirement();

    let x = Mx::sym("x", 1, 1);
    let a = Mx::call(&f, &[x.clone()]).unwrap().remove(0);
    let once = MxFunction::new("once", vec![x.clone()], vec![a.clone()]).unwrap();
    let b = Mx::call(&f, &[a]).unwrap().remove(0);
    let twice = MxFunction::new("twice", vec![x], vec![b]).unwrap();

    let (_, nr_once) = once.workspace_requirement();
    let (_, nr_twice) = twice.workspace_requirement();
    // one more work slot, no second copy of the callee's scratch
    assert_eq!(nr_twice, nr_once + 1);
    assert!(nr_twice < nr_once + inner_nr);
    assert_relative_eq!(twice.evaluate(&[&[0.4]]).unwrap()[0][0], p(p(0.4)), max_relative = 1e-14);
}

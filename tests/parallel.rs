#![cfg(feature = "parallel")]

use approx::assert_relative_eq;
use symgraph::{api, evaluate_par, jacobian_par, Function, FunctionRef, Mx, MxFunction};

fn trig_mix() -> MxFunction<f64> {
    let x = Mx::sym("x", 3, 1);
    let f: FunctionRef<f64> = MxFunction::new("inner", vec![x.clone()], vec![x.cos().unwrap()])
        .unwrap()
        .into_ref();
    let z = Mx::sym("z", 3, 1);
    let c = Mx::call(&f, &[z.clone()]).unwrap().remove(0);
    let y = (&z.sin().unwrap() * &c).unwrap();
    MxFunction::new("trig_mix", vec![z], vec![y, c.exp().unwrap()]).unwrap()
}

#[test]
fn evaluate_par_matches_serial() {
    let f = trig_mix();
    let points: Vec<Vec<Vec<f64>>> = (0..32)
        .map(|p| vec![vec![0.1 * p as f64, 0.5, -0.02 * p as f64]])
        .collect();
    let parallel = evaluate_par(&f, &points).unwrap();
    for (x, par) in points.iter().zip(&parallel) {
        let serial = f.evaluate(&[&x[0]]).unwrap();
        assert_eq!(&serial, par);
    }
}

#[test]
fn jacobian_par_matches_forward_jacobian() {
    let f = trig_mix();
    let x = [0.3, -0.4, 1.2];
    let (values, serial) = api::jacobian(&f, &[&x]).unwrap();
    let (par_values, parallel) = jacobian_par(&f, &[&x]).unwrap();
    assert_eq!(values, par_values);
    assert_eq!(serial.len(), parallel.len());
    for (rs, rp) in serial.iter().zip(&parallel) {
        for (a, b) in rs.iter().zip(rp) {
            assert_relative_eq!(*a, *b, epsilon = 1e-14, max_relative = 1e-12);
        }
    }
}

#[test]
fn bad_point_fails_the_batch() {
    let f = trig_mix();
    let points = vec![vec![vec![0.0; 3]], vec![vec![0.0; 2]]];
    assert!(evaluate_par(&f, &points).is_err());
}

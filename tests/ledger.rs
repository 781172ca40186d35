use std::collections::HashSet;

use symgraph::{
    deep_copy, deep_copy_all, substitute, CloneLedger, Error, Function, Mx, MxFunction,
};

fn reachable(roots: &[Mx<f64>]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack: Vec<Mx<f64>> = roots.to_vec();
    while let Some(x) = stack.pop() {
        if seen.insert(x.id()) {
            stack.extend(x.deps().iter().cloned());
        }
    }
    seen
}

/// Chain of `n` diamonds: a tree expansion would have `2^n` leaves.
fn diamonds(x: &Mx<f64>, n: usize) -> Mx<f64> {
    let mut e = x.clone();
    for _ in 0..n {
        let l = e.sin().unwrap();
        let r = e.cos().unwrap();
        e = (&l * &r).unwrap();
    }
    e
}

#[test]
fn deep_copy_preserves_sharing() {
    let x = Mx::sym("x", 1, 1);
    let e = diamonds(&x, 40);
    let mut ledger = CloneLedger::new();
    let c = deep_copy(&e, &mut ledger).unwrap();

    let orig = reachable(&[e.clone()]);
    let copy = reachable(&[c.clone()]);
    assert_eq!(orig.len(), copy.len());
    assert_eq!(orig.len(), 1 + 3 * 40);
    // Only the leaf is common to both graphs.
    assert_eq!(orig.intersection(&copy).count(), 1);
    assert!(!c.ptr_eq(&e));
}

#[test]
fn copy_evaluates_like_the_original() {
    let x = Mx::sym("x", 1, 1);
    let e = diamonds(&x, 5);
    let c = deep_copy(&e, &mut CloneLedger::new()).unwrap();
    let f = MxFunction::new("f", vec![x.clone()], vec![e]).unwrap();
    let g = MxFunction::new("g", vec![x], vec![c]).unwrap();
    assert_eq!(
        f.evaluate(&[&[0.8]]).unwrap(),
        g.evaluate(&[&[0.8]]).unwrap()
    );
}

#[test]
fn one_ledger_shares_across_roots() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let common = x.exp().unwrap();
    let a = common.sin().unwrap();
    let b = common.cos().unwrap();
    let mut ledger = CloneLedger::new();
    let copies = deep_copy_all(&[a.clone(), b.clone()], &mut ledger).unwrap();
    assert!(copies[0].dep(0).ptr_eq(copies[1].dep(0)));
    assert!(!copies[0].dep(0).ptr_eq(&common));
    assert!(ledger.get(&common).is_some());

    // A later copy through the same ledger reuses earlier clones.
    let again = deep_copy(&a, &mut ledger).unwrap();
    assert!(again.ptr_eq(&copies[0]));
}

#[test]
fn calls_are_copied_but_functions_are_shared() {
    let y = Mx::<f64>::sym("y", 1, 1);
    let f = MxFunction::new("f", vec![y.clone()], vec![y.tanh().unwrap(), y.sin().unwrap()])
        .unwrap()
        .into_ref();
    let x = Mx::sym("x", 1, 1);
    let outs = Mx::call(&f, &[x.clone()]).unwrap();
    let sum = (&outs[0] + &outs[1]).unwrap();
    let c = deep_copy(&sum, &mut CloneLedger::new()).unwrap();

    let v0 = c.dep(0);
    let v1 = c.dep(1);
    assert!(v0.is_output_view() && v1.is_output_view());
    assert!(v0.primary().ptr_eq(v1.primary()));
    assert!(!v0.primary().ptr_eq(outs[0].primary()));
    assert!(std::sync::Arc::ptr_eq(v0.function().unwrap(), &f));
}

#[test]
fn divergent_clone_is_rejected() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let y = x.sin().unwrap();
    let mut ledger = CloneLedger::new();
    ledger.record(&y, &x.cos().unwrap()).unwrap();
    let r = ledger.record(&y, &x.cos().unwrap());
    assert!(matches!(r, Err(Error::CloneCycleViolation(_))));
}

#[test]
fn substitute_rebuilds_only_dependent_part() {
    let x = Mx::sym("x", 1, 1);
    let p = Mx::sym("p", 1, 1);
    let fixed = p.exp().unwrap();
    let e = (&x.sin().unwrap() * &fixed).unwrap();

    let out = substitute(&[e.clone()], &[x.clone()], &[Mx::scalar(2.0)]).unwrap();
    assert!(!out[0].ptr_eq(&e));
    assert!(out[0].dep(1).ptr_eq(&fixed));

    let f = MxFunction::new("f", vec![p], vec![out[0].clone()]).unwrap();
    let v = f.evaluate(&[&[0.5]]).unwrap();
    assert!((v[0][0] - 2.0f64.sin() * 0.5f64.exp()).abs() < 1e-14);
}

#[test]
fn substitute_checks_lengths() {
    let x = Mx::<f64>::sym("x", 1, 1);
    let r = substitute(&[x.clone()], &[x.clone()], &[]);
    assert!(matches!(r, Err(Error::ArityMismatch { .. })));
}

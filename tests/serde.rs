#![cfg(feature = "serde")]

use symgraph::{api, Function, FunctionConfig, Mx, MxFunction, OpCode, Sparsity, SxFunction, SxTape};

fn model() -> SxFunction<f64> {
    let x = Mx::sym("x", 2, 1);
    let y = (&x.sin().unwrap() * &x.powi(-2).unwrap()).unwrap();
    MxFunction::new("model", vec![x], vec![y])
        .unwrap()
        .expand()
        .unwrap()
        .with_config(FunctionConfig { max_batch: 8 })
}

#[test]
fn roundtrip_function_json() {
    let f = model();
    let json = serde_json::to_string(&f).unwrap();
    let g: SxFunction<f64> = serde_json::from_str(&json).unwrap();

    assert_eq!(g.name(), "model");
    assert_eq!(g.config().max_batch, 8);
    assert_eq!(g.input_sparsity(0), f.input_sparsity(0));
    let x: &[f64] = &[0.3, 1.7];
    assert_eq!(f.evaluate(&[x]).unwrap(), g.evaluate(&[x]).unwrap());
}

#[test]
fn roundtrip_keeps_derivatives() {
    let f = model();
    let g: SxFunction<f64> = serde_json::from_str(&serde_json::to_string(&f).unwrap()).unwrap();
    let x: &[f64] = &[0.6, -1.1];
    let (_, ja) = api::jacobian(&f, &[x]).unwrap();
    let (_, jb) = api::jacobian(&g, &[x]).unwrap();
    assert_eq!(ja, jb);
}

#[test]
fn roundtrip_sparsity_json() {
    let sp = Sparsity::from_triplets(3, 2, &[0, 2, 1], &[0, 0, 1]).unwrap();
    let back: Sparsity = serde_json::from_str(&serde_json::to_string(&sp).unwrap()).unwrap();
    assert_eq!(sp, back);
}

#[test]
fn malformed_tape_is_rejected() {
    let mut t = SxTape::<f64>::new();
    let a = t.new_input();
    let b = t.push_unary(OpCode::Sin, a);
    let _ = t.push_op(OpCode::Mul, a, b);
    let json = serde_json::to_string(&t).unwrap();
    // Point the product at itself.
    let broken = json.replacen("[0,1]", "[0,2]", 1);
    assert_ne!(json, broken);
    assert!(serde_json::from_str::<SxTape<f64>>(&broken).is_err());
}

#[test]
fn malformed_sparsity_is_rejected() {
    let unsorted = r#"{"nrow":2,"ncol":1,"colind":[0,2],"row":[1,0]}"#;
    assert!(serde_json::from_str::<Sparsity>(unsorted).is_err());
    let overlong = r#"{"nrow":1,"ncol":1,"colind":[0,5],"row":[]}"#;
    assert!(serde_json::from_str::<Sparsity>(overlong).is_err());
    let out_of_range = r#"{"nrow":2,"ncol":1,"colind":[0,1],"row":[2]}"#;
    assert!(serde_json::from_str::<Sparsity>(out_of_range).is_err());
}

#[test]
fn function_with_malformed_sparsity_is_rejected() {
    let json = serde_json::to_string(&model()).unwrap();
    let broken = json.replacen(r#""row":[0,1]"#, r#""row":[1,0]"#, 1);
    assert_ne!(json, broken);
    assert!(serde_json::from_str::<SxFunction<f64>>(&broken).is_err());
}

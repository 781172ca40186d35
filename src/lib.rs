//! Multi-mode evaluation core for symbolic expression graphs.
//!
//! A computation is an immutable DAG of matrix-valued [`Mx`] nodes with
//! explicit [`Sparsity`] patterns. Reusable computations are packaged as
//! [`Function`]s ([`SxFunction`] over a scalar tape, [`MxFunction`] over a
//! graph) and embedded in other graphs through call nodes
//! ([`Mx::call`]). Every node supports numeric evaluation, scalar and matrix
//! symbolic evaluation, forward and reverse derivative propagation, forward
//! and reverse dependency propagation, and C code emission.
//!
//! ```
//! use symgraph::{Function, Mx, MxFunction};
//!
//! let x = Mx::<f64>::sym("x", 2, 1);
//! let y = x.sin().unwrap();
//! let f = MxFunction::new("f", vec![x.clone()], vec![(&y * &x).unwrap()])
//!     .unwrap()
//!     .into_ref();
//!
//! // Embed `f` twice; the callee is shared, not copied.
//! let z = Mx::sym("z", 2, 1);
//! let a = Mx::call(&f, &[z.clone()]).unwrap().remove(0);
//! let b = Mx::call(&f, &[(&a * &z).unwrap()]).unwrap().remove(0);
//! let g = MxFunction::new("g", vec![z], vec![b]).unwrap();
//!
//! let out = g.evaluate(&[&[0.5, 1.0]]).unwrap();
//! assert_eq!(out[0].len(), 2);
//! ```

pub mod api;
pub mod codegen;
pub mod error;
pub mod float;
pub mod function;
pub mod ledger;
pub mod mx;
pub mod mx_function;
pub mod opcode;
pub mod scheduler;
pub mod sparsity;
pub mod sx;

#[cfg(feature = "parallel")]
pub mod parallel;

pub use api::{evaluate, jacobian, jacobian_sparsity, jacobian_sparsity_reverse, jvp, vjp};
pub use codegen::{generate, CodeGenerator, CodegenConfig};
pub use error::{Error, Result};
pub use float::Float;
pub use function::{Bvec, Direction, Function, FunctionConfig, FunctionRef, GeneratorCache, Workspace};
pub use ledger::{deep_copy, deep_copy_all, substitute, CloneLedger};
pub use mx::{project, Mx, Op};
pub use mx_function::MxFunction;
pub use opcode::OpCode;
pub use scheduler::Schedule;
pub use sparsity::Sparsity;
pub use sx::{SxFunction, SxTape};

#[cfg(feature = "parallel")]
pub use parallel::{evaluate_par, jacobian_par};

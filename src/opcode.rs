//! Elementwise opcodes shared by the scalar tape and the expression graph.
//!
//! Each opcode knows how to evaluate itself ([`eval_forward`]), how to print
//! itself as a C expression ([`c_expr`]) and how to express its partial
//! derivatives symbolically ([`partials`]). The symbolic rules are written
//! once against [`ScalarBuilder`], so the scalar tape and the matrix graph
//! differentiate through the exact same formulas.

use num_traits::Float;

use crate::error::Result;

/// Sentinel used in `arg_indices[1]` for unary ops (the second argument slot is unused).
pub const UNUSED: u32 = u32::MAX;

/// Elementwise operation codes.
///
/// Binary ops use both operand slots; unary ops use slot 0 only.
/// [`OpCode::Powi`] carries its `i32` exponent next to the operand.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Structural ──
    /// Input variable (leaf node).
    Input,
    /// Scalar constant.
    Const,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,

    // ── Unary ──
    Neg,
    Recip,
    Sqrt,
    /// Integer power.
    Powi,
    Exp,
    Ln,
    Sin,
    Cos,
    Tan,
    Tanh,
    Abs,
    /// Zero derivative but needed for re-evaluation.
    Signum,
}

/// Returns true for the two-operand opcodes.
#[inline]
pub fn is_binary(op: OpCode) -> bool {
    matches!(op, OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div)
}

/// Returns true if `op(0) == 0`, i.e. the op can run on nonzeros only.
#[inline]
pub fn preserves_zero(op: OpCode) -> bool {
    !matches!(op, OpCode::Recip | OpCode::Exp | OpCode::Ln | OpCode::Cos)
}

/// Evaluate a single opcode in the forward direction.
///
/// For unary ops `b` is ignored, except for [`OpCode::Powi`] where it holds
/// the exponent.
#[inline]
pub fn eval_forward<T: Float>(op: OpCode, a: T, b: T) -> T {
    match op {
        OpCode::Input | OpCode::Const => {
            unreachable!("Input/Const should not be re-evaluated via eval_forward")
        }
        OpCode::Add => a + b,
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Div => a / b,
        OpCode::Neg => -a,
        OpCode::Recip => a.recip(),
        OpCode::Sqrt => a.sqrt(),
        OpCode::Powi => a.powi(b.to_i32().unwrap_or(0)),
        OpCode::Exp => a.exp(),
        OpCode::Ln => a.ln(),
        OpCode::Sin => a.sin(),
        OpCode::Cos => a.cos(),
        OpCode::Tan => a.tan(),
        OpCode::Tanh => a.tanh(),
        OpCode::Abs => a.abs(),
        OpCode::Signum => {
            if a > T::zero() {
                T::one()
            } else if a < T::zero() {
                -T::one()
            } else {
                T::zero()
            }
        }
    }
}

/// C expression for `op` applied to the operand expressions `a` and `b`.
pub fn c_expr(op: OpCode, a: &str, b: &str) -> String {
    match op {
        OpCode::Input | OpCode::Const => a.to_string(),
        OpCode::Add => format!("{a}+{b}"),
        OpCode::Sub => format!("{a}-{b}"),
        OpCode::Mul => format!("{a}*{b}"),
        OpCode::Div => format!("{a}/{b}"),
        OpCode::Neg => format!("-{a}"),
        OpCode::Recip => format!("1./{a}"),
        OpCode::Sqrt => format!("sqrt({a})"),
        OpCode::Powi => format!("pow({a},{b})"),
        OpCode::Exp => format!("exp({a})"),
        OpCode::Ln => format!("log({a})"),
        OpCode::Sin => format!("sin({a})"),
        OpCode::Cos => format!("cos({a})"),
        OpCode::Tan => format!("tan({a})"),
        OpCode::Tanh => format!("tanh({a})"),
        OpCode::Abs => format!("fabs({a})"),
        OpCode::Signum => format!("({a}>0 ? 1 : ({a}<0 ? -1 : 0))"),
    }
}

/// Something that can record elementwise operations on symbolic operands.
///
/// Implemented by the scalar tape (operands are tape indices) and by the
/// matrix graph (operands are graph nodes).
pub trait ScalarBuilder<F> {
    type Expr: Clone;

    /// A constant with the structure of `like`, every nonzero equal to `value`.
    fn constant_like(&mut self, like: &Self::Expr, value: F) -> Result<Self::Expr>;
    fn unary(&mut self, op: OpCode, a: &Self::Expr) -> Result<Self::Expr>;
    fn binary(&mut self, op: OpCode, a: &Self::Expr, b: &Self::Expr) -> Result<Self::Expr>;
    fn powi(&mut self, a: &Self::Expr, exp: i32) -> Result<Self::Expr>;
}

/// A symbolic partial derivative, with the trivial cases kept structural so
/// that chaining through them records nothing.
#[derive(Clone, Debug)]
pub enum Partial<E> {
    Zero,
    One,
    NegOne,
    Expr(E),
}

/// Symbolic `(∂r/∂a, ∂r/∂b)` for `r = op(a, b)`.
///
/// `r` is the already-recorded result, reused where the derivative is
/// cheapest in terms of it (`exp`, `sqrt`, `tan`, `tanh`, `recip`, `div`).
pub fn partials<F: crate::float::Float, B: ScalarBuilder<F>>(
    builder: &mut B,
    op: OpCode,
    a: &B::Expr,
    b: &B::Expr,
    r: &B::Expr,
    exp: i32,
) -> Result<(Partial<B::Expr>, Partial<B::Expr>)> {
    use Partial::{Expr, NegOne, One, Zero};
    let one = F::one();
    Ok(match op {
        OpCode::Input | OpCode::Const => (Zero, Zero),
        OpCode::Add => (One, One),
        OpCode::Sub => (One, NegOne),
        OpCode::Mul => (Expr(b.clone()), Expr(a.clone())),
        OpCode::Div => {
            // d/da = 1/b, d/db = -r/b
            let inv = builder.unary(OpCode::Recip, b)?;
            let q = builder.binary(OpCode::Div, r, b)?;
            (Expr(inv), Expr(builder.unary(OpCode::Neg, &q)?))
        }
        OpCode::Neg => (NegOne, Zero),
        OpCode::Recip => {
            let sq = builder.binary(OpCode::Mul, r, r)?;
            (Expr(builder.unary(OpCode::Neg, &sq)?), Zero)
        }
        OpCode::Sqrt => {
            let half = builder.constant_like(r, one / (one + one))?;
            (Expr(builder.binary(OpCode::Div, &half, r)?), Zero)
        }
        OpCode::Powi => match exp {
            0 => (Zero, Zero),
            1 => (One, Zero),
            _ => {
                let p = builder.powi(a, exp - 1)?;
                let n = F::from_i32(exp).unwrap_or_else(F::zero);
                let c = builder.constant_like(a, n)?;
                (Expr(builder.binary(OpCode::Mul, &c, &p)?), Zero)
            }
        },
        OpCode::Exp => (Expr(r.clone()), Zero),
        OpCode::Ln => (Expr(builder.unary(OpCode::Recip, a)?), Zero),
        OpCode::Sin => (Expr(builder.unary(OpCode::Cos, a)?), Zero),
        OpCode::Cos => {
            let s = builder.unary(OpCode::Sin, a)?;
            (Expr(builder.unary(OpCode::Neg, &s)?), Zero)
        }
        OpCode::Tan => {
            let c = builder.constant_like(r, one)?;
            let sq = builder.binary(OpCode::Mul, r, r)?;
            (Expr(builder.binary(OpCode::Add, &c, &sq)?), Zero)
        }
        OpCode::Tanh => {
            let c = builder.constant_like(r, one)?;
            let sq = builder.binary(OpCode::Mul, r, r)?;
            (Expr(builder.binary(OpCode::Sub, &c, &sq)?), Zero)
        }
        OpCode::Abs => (Expr(builder.unary(OpCode::Signum, a)?), Zero),
        OpCode::Signum => (Zero, Zero),
    })
}

/// `partial * seed`, or `None` when the partial is structurally zero.
pub fn chain<F, B: ScalarBuilder<F>>(
    builder: &mut B,
    partial: &Partial<B::Expr>,
    seed: &B::Expr,
) -> Result<Option<B::Expr>> {
    Ok(match partial {
        Partial::Zero => None,
        Partial::One => Some(seed.clone()),
        Partial::NegOne => Some(builder.unary(OpCode::Neg, seed)?),
        Partial::Expr(p) => Some(builder.binary(OpCode::Mul, p, seed)?),
    })
}

/// `acc + term`, treating `None` as a structural zero on either side.
pub fn accumulate<F, B: ScalarBuilder<F>>(
    builder: &mut B,
    acc: Option<B::Expr>,
    term: Option<B::Expr>,
) -> Result<Option<B::Expr>> {
    Ok(match (acc, term) {
        (Some(a), Some(t)) => Some(builder.binary(OpCode::Add, &a, &t)?),
        (a, None) => a,
        (None, t) => t,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_preserving_ops() {
        assert!(preserves_zero(OpCode::Sin));
        assert!(preserves_zero(OpCode::Mul));
        assert!(!preserves_zero(OpCode::Cos));
        assert!(!preserves_zero(OpCode::Exp));
    }

    #[test]
    fn signum_and_powi() {
        assert_eq!(eval_forward(OpCode::Signum, -2.0_f64, 0.0), -1.0);
        assert_eq!(eval_forward(OpCode::Signum, 0.0_f64, 0.0), 0.0);
        assert_eq!(eval_forward(OpCode::Powi, 3.0_f64, 2.0), 9.0);
    }
}

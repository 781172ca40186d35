//! Scalar symbolic tape: the fully expanded form of a computation.
//!
//! An [`SxTape`] is an append-only list of elementwise opcodes over scalar
//! entries. Recording folds constants and short-circuits identity and
//! absorbing patterns (`x + 0 → x`, `x * 1 → x`, `x * 0 → 0`, `x - x → 0`,
//! `x / x → 1`), so symbolic derivative sweeps stay small.
//!
//! [`SxFunction`] packages a tape with declared input/output sparsities and
//! implements every capability of [`Function`](crate::function::Function).

use crate::error::{check_len, Result};
use crate::float::Float;
use crate::function::Bvec;
use crate::opcode::{self, OpCode, ScalarBuilder, UNUSED};

mod codegen;
mod derivative;
mod function;
mod sparse;

#[cfg(feature = "serde")]
mod serde_support;

pub use self::function::SxFunction;

/// Append-only scalar expression tape. Entries are addressed by `u32` index.
#[derive(Clone, Debug)]
pub struct SxTape<F: Float> {
    pub(crate) opcodes: Vec<OpCode>,
    pub(crate) arg_indices: Vec<[u32; 2]>,
    /// Constant values; unused for every other entry.
    pub(crate) values: Vec<F>,
    pub(crate) num_inputs: u32,
}

impl<F: Float> SxTape<F> {
    pub fn new() -> Self {
        SxTape {
            opcodes: Vec::new(),
            arg_indices: Vec::new(),
            values: Vec::new(),
            num_inputs: 0,
        }
    }

    pub fn with_capacity(est_ops: usize) -> Self {
        SxTape {
            opcodes: Vec::with_capacity(est_ops),
            arg_indices: Vec::with_capacity(est_ops),
            values: Vec::with_capacity(est_ops),
            num_inputs: 0,
        }
    }

    #[inline]
    fn push_raw(&mut self, op: OpCode, args: [u32; 2], value: F) -> u32 {
        let idx = self.opcodes.len() as u32;
        self.opcodes.push(op);
        self.arg_indices.push(args);
        self.values.push(value);
        idx
    }

    /// Register a new symbolic input. Inputs are numbered in recording order.
    #[inline]
    pub fn new_input(&mut self) -> u32 {
        self.num_inputs += 1;
        self.push_raw(OpCode::Input, [UNUSED, UNUSED], F::zero())
    }

    /// Record a scalar constant.
    #[inline]
    pub fn push_const(&mut self, value: F) -> u32 {
        self.push_raw(OpCode::Const, [UNUSED, UNUSED], value)
    }

    /// Value of entry `idx` if it is a constant.
    #[inline]
    pub fn const_value(&self, idx: u32) -> Option<F> {
        let i = idx as usize;
        (self.opcodes[i] == OpCode::Const).then(|| self.values[i])
    }

    /// Record a binary operation, folding and simplifying where possible.
    pub fn push_op(&mut self, op: OpCode, a: u32, b: u32) -> u32 {
        debug_assert!(opcode::is_binary(op), "{op:?} is not a binary opcode");
        let ca = self.const_value(a);
        let cb = self.const_value(b);
        if let (Some(x), Some(y)) = (ca, cb) {
            return self.push_const(opcode::eval_forward(op, x, y));
        }
        if ca.is_some() || cb.is_some() {
            if let Some(idx) = self.try_algebraic_simplify(op, a, b, ca, cb) {
                return idx;
            }
        }
        if a == b {
            match op {
                OpCode::Sub => return self.push_const(F::zero()),
                OpCode::Div => return self.push_const(F::one()),
                _ => {}
            }
        }
        self.push_raw(op, [a, b], F::zero())
    }

    /// Identity and absorbing patterns where one operand is a known constant.
    #[inline(never)]
    fn try_algebraic_simplify(
        &mut self,
        op: OpCode,
        a: u32,
        b: u32,
        ca: Option<F>,
        cb: Option<F>,
    ) -> Option<u32> {
        let zero = Some(F::zero());
        let one = Some(F::one());
        match op {
            OpCode::Add => {
                if cb == zero {
                    return Some(a);
                }
                if ca == zero {
                    return Some(b);
                }
            }
            OpCode::Sub => {
                if cb == zero {
                    return Some(a);
                }
                if ca == zero {
                    return Some(self.push_unary(OpCode::Neg, b));
                }
            }
            OpCode::Mul => {
                if cb == one {
                    return Some(a);
                }
                if ca == one {
                    return Some(b);
                }
                if ca == zero || cb == zero {
                    return Some(self.push_const(F::zero()));
                }
            }
            OpCode::Div => {
                if cb == one {
                    return Some(a);
                }
                if ca == zero {
                    return Some(self.push_const(F::zero()));
                }
            }
            _ => {}
        }
        None
    }

    /// Record a unary operation. Constants fold; `-(-x)` collapses to `x`.
    /// `Input` and `Const` are leaves, not operations: the operand is
    /// returned unchanged.
    pub fn push_unary(&mut self, op: OpCode, a: u32) -> u32 {
        debug_assert!(!opcode::is_binary(op) && op != OpCode::Powi);
        if matches!(op, OpCode::Input | OpCode::Const) {
            return a;
        }
        if let Some(x) = self.const_value(a) {
            return self.push_const(opcode::eval_forward(op, x, F::zero()));
        }
        let i = a as usize;
        if op == OpCode::Neg && self.opcodes[i] == OpCode::Neg {
            return self.arg_indices[i][0];
        }
        self.push_raw(op, [a, UNUSED], F::zero())
    }

    /// Record `a^exp`. The exponent is stored in the second operand slot.
    pub fn push_powi(&mut self, a: u32, exp: i32) -> u32 {
        if let Some(x) = self.const_value(a) {
            return self.push_const(x.powi(exp));
        }
        match exp {
            0 => self.push_const(F::one()),
            1 => a,
            -1 => self.push_unary(OpCode::Recip, a),
            _ => self.push_raw(OpCode::Powi, [a, exp as u32], F::zero()),
        }
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs as usize
    }

    /// Number of entries (inputs and constants included).
    #[inline]
    pub fn num_ops(&self) -> usize {
        self.opcodes.len()
    }

    #[inline]
    pub fn opcode(&self, idx: u32) -> OpCode {
        self.opcodes[idx as usize]
    }

    /// `(a, b, exp)` of entry `i`. Unary entries report `b == a`; `exp` is
    /// only meaningful for [`OpCode::Powi`].
    #[inline]
    pub(crate) fn operands(&self, i: usize) -> (usize, usize, i32) {
        let [a, b] = self.arg_indices[i];
        match self.opcodes[i] {
            OpCode::Powi => (a as usize, a as usize, b as i32),
            op if opcode::is_binary(op) => (a as usize, b as usize, 0),
            _ => (a as usize, a as usize, 0),
        }
    }

    /// Tape indices of the input entries, in input order.
    pub fn input_entries(&self) -> impl Iterator<Item = u32> + '_ {
        self.opcodes
            .iter()
            .enumerate()
            .filter(|(_, &op)| op == OpCode::Input)
            .map(|(i, _)| i as u32)
    }

    /// Copy this tape into `dst`, substituting `args[m]` for input `m`.
    ///
    /// Returns the `dst` index of every entry of `self`.
    pub fn inline(&self, dst: &mut SxTape<F>, args: &[u32]) -> Result<Vec<u32>> {
        check_len("inlined tape inputs", self.num_inputs(), args.len())?;
        let mut map: Vec<u32> = Vec::with_capacity(self.opcodes.len());
        let mut next_input = 0usize;
        for i in 0..self.opcodes.len() {
            let idx = match self.opcodes[i] {
                OpCode::Input => {
                    let v = args[next_input];
                    next_input += 1;
                    v
                }
                OpCode::Const => dst.push_const(self.values[i]),
                OpCode::Powi => {
                    let (a, _, exp) = self.operands(i);
                    dst.push_powi(map[a], exp)
                }
                op if opcode::is_binary(op) => {
                    let (a, b, _) = self.operands(i);
                    dst.push_op(op, map[a], map[b])
                }
                op => {
                    let (a, _, _) = self.operands(i);
                    dst.push_unary(op, map[a])
                }
            };
            map.push(idx);
        }
        Ok(map)
    }

    /// Numeric forward sweep into `w` (one slot per entry).
    ///
    /// `inputs` yields the input values in input order.
    pub(crate) fn forward_sweep(&self, mut inputs: impl Iterator<Item = F>, w: &mut [F]) {
        for i in 0..self.opcodes.len() {
            w[i] = match self.opcodes[i] {
                OpCode::Input => inputs.next().unwrap_or_else(F::zero),
                OpCode::Const => self.values[i],
                OpCode::Powi => {
                    let (a, _, exp) = self.operands(i);
                    w[a].powi(exp)
                }
                op => {
                    let (a, b, _) = self.operands(i);
                    opcode::eval_forward(op, w[a], w[b])
                }
            };
        }
    }

    /// Forward dependency sweep into `bw` (one word per entry).
    pub(crate) fn dependency_sweep(&self, mut inputs: impl Iterator<Item = Bvec>, bw: &mut [Bvec]) {
        for i in 0..self.opcodes.len() {
            bw[i] = match self.opcodes[i] {
                OpCode::Input => inputs.next().unwrap_or(0),
                OpCode::Const => 0,
                _ => {
                    let (a, b, _) = self.operands(i);
                    bw[a] | bw[b]
                }
            };
        }
    }
}

impl<F: Float> Default for SxTape<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ScalarBuilder<F> for SxTape<F> {
    type Expr = u32;

    fn constant_like(&mut self, _like: &u32, value: F) -> Result<u32> {
        Ok(self.push_const(value))
    }

    fn unary(&mut self, op: OpCode, a: &u32) -> Result<u32> {
        Ok(self.push_unary(op, *a))
    }

    fn binary(&mut self, op: OpCode, a: &u32, b: &u32) -> Result<u32> {
        Ok(self.push_op(op, *a, *b))
    }

    fn powi(&mut self, a: &u32, exp: i32) -> Result<u32> {
        Ok(self.push_powi(*a, exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_folding() {
        let mut tape = SxTape::<f64>::new();
        let a = tape.push_const(2.0);
        let b = tape.push_const(3.0);
        let c = tape.push_op(OpCode::Mul, a, b);
        assert_eq!(tape.const_value(c), Some(6.0));
    }

    #[test]
    fn identity_patterns_return_operand() {
        let mut tape = SxTape::<f64>::new();
        let x = tape.new_input();
        let zero = tape.push_const(0.0);
        let one = tape.push_const(1.0);
        assert_eq!(tape.push_op(OpCode::Add, x, zero), x);
        assert_eq!(tape.push_op(OpCode::Mul, one, x), x);
        assert_eq!(tape.push_powi(x, 1), x);
        let neg = tape.push_unary(OpCode::Neg, x);
        assert_eq!(tape.push_unary(OpCode::Neg, neg), x);
    }

    #[test]
    fn absorbing_patterns_fold_to_constants() {
        let mut tape = SxTape::<f64>::new();
        let x = tape.new_input();
        let zero = tape.push_const(0.0);
        let p = tape.push_op(OpCode::Mul, x, zero);
        assert_eq!(tape.const_value(p), Some(0.0));
        let d = tape.push_op(OpCode::Sub, x, x);
        assert_eq!(tape.const_value(d), Some(0.0));
        let q = tape.push_op(OpCode::Div, x, x);
        assert_eq!(tape.const_value(q), Some(1.0));
    }

    #[test]
    fn leaf_opcodes_are_not_recorded_as_operations() {
        let mut tape = SxTape::<f64>::new();
        let x = tape.new_input();
        let c = tape.push_const(2.0);
        let n = tape.num_ops();
        assert_eq!(tape.push_unary(OpCode::Const, c), c);
        assert_eq!(tape.push_unary(OpCode::Input, x), x);
        assert_eq!(tape.num_ops(), n);
        assert_eq!(tape.num_inputs(), 1);
    }
}

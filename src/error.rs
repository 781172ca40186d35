//! Error taxonomy shared by graph construction and every evaluation mode.

use thiserror::Error;

use crate::function::Direction;

/// Failures raised at the boundary of the operation that would otherwise
/// leave a graph or workspace inconsistent. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Argument count or argument dimensions disagree with a declared signature.
    #[error("arity mismatch in {context}: {detail}")]
    ArityMismatch { context: String, detail: String },

    /// Projection between patterns of different shape.
    #[error("cannot project a {from} argument onto a {to} pattern")]
    Projection { from: String, to: String },

    /// The wrapped function cannot manufacture the requested derivative generator.
    #[error("`{function}` cannot provide a {direction} derivative generator for {k} directions")]
    GeneratorUnavailable {
        function: String,
        direction: Direction,
        k: usize,
    },

    /// A node was cloned twice with divergent results.
    #[error("clone ledger violated: {0}")]
    CloneCycleViolation(String),

    /// Malformed coordinates handed to a sparsity constructor.
    #[error("invalid sparsity pattern: {0}")]
    InvalidSparsity(String),

    /// A raw value buffer has the wrong length.
    #[error("{context}: buffer holds {got} entries, expected {expected}")]
    BufferSize {
        context: String,
        expected: usize,
        got: usize,
    },

    /// The graph depends on a symbol that is not one of the function inputs.
    #[error("free variable `{0}` is not an input of the function")]
    FreeVariable(String),

    /// A function input is not a purely symbolic node.
    #[error("function input {0} is not a purely symbolic expression")]
    NotSymbolic(usize),

    /// The same symbol was declared as two different inputs.
    #[error("function input {0} repeats an earlier input symbol")]
    DuplicateInput(usize),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn arity(context: impl Into<String>, detail: impl Into<String>) -> Error {
    Error::ArityMismatch {
        context: context.into(),
        detail: detail.into(),
    }
}

pub(crate) fn check_len(context: &str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::BufferSize {
            context: context.to_string(),
            expected,
            got,
        })
    }
}

//! Crate-wide error type.
//!
//! Candidate mismatches are deliberately absent: a diverging candidate is a
//! recorded per-item outcome, not an error, and never aborts a batch.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// State or expression text that cannot be parsed back into operands.
    #[error("invalid input format: {0}")]
    Format(String),

    /// Operation name with no entry in the dispatch registry.
    #[error("unknown operation: {0}")]
    UnknownOp(String),

    /// Subtraction with a minuend smaller than the subtrahend.
    #[error("subtraction underflow: {op1} < {op2}")]
    Underflow { op1: u64, op2: u64 },

    /// Division by zero.
    #[error("division by zero")]
    DivByZero,

    /// Reflection base operand that is not a run of nines.
    #[error("reflection base must be all nines, got {0}")]
    BadReflectionBase(u128),

    /// Reflection operand wider than its all-nines base.
    #[error("reflection operand {op2} exceeds base {op1}")]
    ReflectionOverflow { op1: u128, op2: u128 },

    /// Dataset file I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset record (de)serialization failure.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

//! Errors raised while parsing addresses and formulas.
//!
//! Evaluation problems are not errors in this sense: they are carried as
//! [`CellError`](super::CellError) values inside the cell.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid number of arguments for {name}: expected {expected}, got {got}")]
    ArgumentCountMismatch {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Invalid formula at offset {offset}: {message}")]
    InvalidFormula { offset: usize, message: String },

    #[error("Invalid argument declaration: {0}")]
    InvalidArgumentSpec(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

//! Error types for reflex-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    #[error("Unsupported operation: `{op}` on {kind}")]
    Unsupported { op: &'static str, kind: &'static str },

    #[error("Target is frozen")]
    Frozen,

    #[error("Target is not extensible: cannot add `{0}`")]
    NotExtensible(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Cyclic value cannot be converted")]
    Cycle,

    #[error("Non-finite number cannot be converted")]
    NonFiniteNumber,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ReactiveError>;

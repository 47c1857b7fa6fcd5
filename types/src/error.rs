//! Top-level error type shared across crates.

use thiserror::Error;

/// Errors raised while parsing or validating meshgate value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("invalid length for {field}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid node address: {0}")]
    InvalidAddress(String),
}

//! Error types for the operation log.

use thiserror::Error;

/// Errors raised while encoding or decoding operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes do not describe a valid operation. Only that operation is
    /// rejected; the surrounding stream keeps going.
    #[error("Malformed operation: {0}")]
    Malformed(String),

    #[error("Encoding error: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Malformed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

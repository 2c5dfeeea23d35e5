//! Error types for the document layer.

use thiserror::Error;
use trellis_oplog::CodecError;

/// Errors that can occur in store operations.
#[derive(Error, Debug, Clone)]
pub enum DbError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(#[from] CodecError),

    #[error("Entity not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
}

pub type Result<T> = std::result::Result<T, DbError>;

//! Error types for the Trellis SDK.

use thiserror::Error;
use trellis_db::DbError;
use trellis_oplog::CodecError;

/// Error type for SDK operations.
///
/// Transport failures are retried by the sync adapter and only ever surface
/// as a status change; merge conflicts are not errors at all.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("authentication failed for room {0}")]
    Authentication(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("document error: {0}")]
    Document(#[from] DbError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;

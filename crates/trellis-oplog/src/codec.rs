//! Wire serialization of operations.
//!
//! Operations travel as JSON objects. Struct fields serialize in declaration
//! order and unset patch fields are omitted, so one operation always maps to
//! the same bytes.

use crate::error::{CodecError, Result};
use crate::op::Operation;

/// Serialize an operation for the wire.
pub fn encode(op: &Operation) -> Result<Vec<u8>> {
    serde_json::to_vec(op).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Parse and validate one operation.
///
/// Truncated input, unknown kinds or collections and payloads that do not
/// fit the operation are all reported as [`CodecError::Malformed`].
pub fn decode(bytes: &[u8]) -> Result<Operation> {
    let op: Operation = serde_json::from_slice(bytes)?;
    op.validate()?;
    Ok(op)
}

/// Decode a batch, keeping the operations that parse and handing back the
/// errors of the rest.
pub fn decode_batch<'a, I>(frames: I) -> (Vec<Operation>, Vec<CodecError>)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut ops = Vec::new();
    let mut errors = Vec::new();
    for frame in frames {
        match decode(frame) {
            Ok(op) => ops.push(op),
            Err(e) => errors.push(e),
        }
    }
    (ops, errors)
}

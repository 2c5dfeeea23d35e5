//! Operation log for Trellis collaborative graphs.
//!
//! - [`model`] - nodes, edges and the patches that update them
//! - [`op`] - mutations and stamped operations
//! - [`encoder`] - stamping of local mutations
//! - [`codec`] - wire encoding and validation
//! - [`sample`] - the starter diagram

pub mod codec;
pub mod encoder;
pub mod error;
pub mod model;
pub mod op;
pub mod sample;

pub use encoder::OperationEncoder;
pub use error::{CodecError, Result};
pub use model::{Edge, EdgePatch, Node, NodePatch, Position, Size, DEFAULT_NODE_SIZE};
pub use op::{Collection, Mutation, OpId, OpKind, Operation, Payload};

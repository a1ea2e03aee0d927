//! Errors raised by the bundled pipeline items and the registry.

use medpipe_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    /// Two inputs that must match voxel for voxel do not.
    #[error("shape mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    /// No prototype registered under this kind.
    #[error("unknown node kind: '{kind}'")]
    UnknownKind { kind: String },

    /// A prototype with this kind already exists.
    #[error("duplicate node kind: '{kind}'")]
    DuplicateKind { kind: String },

    /// A prototype's `new_instance` returned a different concrete type.
    #[error("prototype for '{kind}' produced an item of another type")]
    PrototypeMismatch { kind: String },

    /// Parameters did not deserialize into the item's parameter type.
    #[error("invalid parameters for '{kind}': {source}")]
    InvalidParameters {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Parameters deserialized but describe something impossible.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

//! Error types for medpipe-core.
//!
//! Structural errors ([`CoreError`]) are raised synchronously by the call that
//! caused them (`connect`, `disconnect`, port accessors). Domain errors coming
//! out of a node's `apply()` travel through [`ExecutionError::Apply`] so the
//! traversal driver can clean up before handing them back.

use thiserror::Error;

use crate::id::{NodeHandle, NodeId};
use crate::port::PortType;

/// Boxed domain error returned by a pipeline item's `apply()`.
pub type ApplyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How serious a structural error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The operation was not performed but the graph is unaffected.
    Warning,
    /// The caller passed something that cannot be made sense of.
    Fatal,
}

/// Which kind of slot an index referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Input,
    Output,
    Connection,
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortKind::Input => write!(f, "input port"),
            PortKind::Output => write!(f, "output port"),
            PortKind::Connection => write!(f, "connection"),
        }
    }
}

/// Structural errors produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A port or connection index outside `[0, len)`.
    #[error("{kind} index {index} out of range (len {len})")]
    OutOfRange {
        kind: PortKind,
        index: usize,
        len: usize,
    },

    /// The producer handle given to `connect` does not resolve to a live node.
    #[error("null producer: handle {handle} does not refer to a live node")]
    NullProducer { handle: NodeHandle },

    /// The node being operated on does not exist (removed or never added).
    #[error("node not found: handle {handle}")]
    NodeNotFound { handle: NodeHandle },

    /// Producer and consumer port types do not divide one another.
    #[error(
        "port type mismatch: producer port {producer_port} ({producer_type}) \
         cannot feed consumer port {consumer_port} ({consumer_type})"
    )]
    PortTypeMismatch {
        producer_port: usize,
        producer_type: PortType,
        consumer_port: usize,
        consumer_type: PortType,
    },

    /// A zero port type tag.
    #[error("invalid port type tag: {value}")]
    InvalidPortType { value: u32 },

    /// A dataset whose element count does not match its shape.
    #[error("invalid dataset: {reason}")]
    InvalidDataset { reason: String },

    /// Marking reached a depth no acyclic graph of this size can have.
    #[error("cycle through node {handle}")]
    Cycle { handle: NodeHandle },

    /// A downcast to a concrete item type failed.
    #[error("node {handle} is not a {expected}")]
    WrongItemType {
        handle: NodeHandle,
        expected: &'static str,
    },
}

impl CoreError {
    /// Severity of this error. Only a type mismatch is a warning: the
    /// connection simply is not formed.
    pub fn severity(&self) -> Severity {
        match self {
            CoreError::PortTypeMismatch { .. } => Severity::Warning,
            _ => Severity::Fatal,
        }
    }

    pub(crate) fn out_of_range(kind: PortKind, index: usize, len: usize) -> Self {
        CoreError::OutOfRange { kind, index, len }
    }
}

/// Errors surfaced by a traversal or a forced recompute.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A node's `apply()` failed. The traversal was aborted and cleaned up.
    #[error("node {id} ({kind}) failed: {source}")]
    Apply {
        handle: NodeHandle,
        id: NodeId,
        kind: String,
        #[source]
        source: ApplyError,
    },
}

impl ExecutionError {
    /// Handle of the node whose computation failed, if any.
    pub fn failed_node(&self) -> Option<NodeHandle> {
        match self {
            ExecutionError::Apply { handle, .. } => Some(*handle),
            ExecutionError::Core(_) => None,
        }
    }
}

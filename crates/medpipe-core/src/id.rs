//! Identity types for pipeline items.
//!
//! Two identities exist side by side:
//! - [`NodeId`] is the caller-supplied identity of a pipeline item, handed to
//!   `new_instance` and carried by the item itself.
//! - [`NodeHandle`] addresses a slot in a [`Pipeline`](crate::pipeline::Pipeline)
//!   arena. A handle carries the slot generation, so a handle to a removed
//!   item never resolves to whatever item later reuses the slot.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Caller-supplied identity of a pipeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Stable arena handle for a node inside a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Slot index in the arena.
    pub index: u32,
    /// Generation of the slot when this handle was issued.
    pub generation: u32,
}

impl NodeHandle {
    pub(crate) fn new(index: NodeIndex<u32>, generation: u32) -> Self {
        NodeHandle {
            index: index.index() as u32,
            generation,
        }
    }

    pub(crate) fn node_index(self) -> NodeIndex<u32> {
        NodeIndex::new(self.index as usize)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

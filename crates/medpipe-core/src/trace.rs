//! Execution trace recording.
//!
//! When [`EngineConfig::trace_enabled`](crate::config::EngineConfig) is set,
//! the pipeline records one [`TraceEntry`] per node execution, whether or not
//! the node turned out to be stale.

use std::fmt;

use serde::Serialize;

use crate::id::{NodeHandle, NodeId};

/// One execution of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEntry {
    pub handle: NodeHandle,
    pub id: NodeId,
    pub kind: String,
    /// Depth the node was scheduled at; -1 for a forced recompute.
    pub depth: i32,
    /// Own timestamp after the execution.
    pub timestamp: u64,
    /// Whether `apply()` ran.
    pub recomputed: bool,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} depth={} ts={} {}",
            self.kind,
            self.id,
            self.depth,
            self.timestamp,
            if self.recomputed { "recomputed" } else { "fresh" }
        )
    }
}

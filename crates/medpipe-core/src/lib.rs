//! Dataflow scheduling and caching engine for image-processing pipelines.
//!
//! A [`Pipeline`] owns pipeline items (nodes) connected output-to-input.
//! Asking for fresh output from a sink with [`Pipeline::update`] marks the
//! sink's ancestor closure by longest-path depth and then executes it
//! deepest-first, so every producer runs before its consumers and exactly
//! once. Nodes whose inputs did not change since their last computation are
//! skipped, which makes refreshing an unchanged graph free.

pub mod config;
pub mod connection;
pub mod dataset;
pub mod error;
pub mod id;
pub mod item;
pub mod node;
pub mod pipeline;
pub mod port;
pub mod trace;
pub mod traversal;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::EngineConfig;
pub use connection::Connection;
pub use dataset::{Dataset, Shape, WeakDataset};
pub use error::{ApplyError, CoreError, ExecutionError, PortKind, Severity};
pub use id::{NodeHandle, NodeId};
pub use item::PipelineItem;
pub use node::{PipelineNode, DEPTH_UNMARKED};
pub use pipeline::Pipeline;
pub use port::{PortType, Ports};
pub use trace::TraceEntry;
pub use traversal::TraversalReport;

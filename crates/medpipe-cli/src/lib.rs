//! Library side of the `medpipe` binary: manifest loading and sink refresh.

pub mod manifest;
pub mod run;

pub use manifest::{BuiltPipeline, LinkSpec, Manifest, ManifestError, NodeSpec};
pub use run::{run, RefreshSummary, RunError, RunOptions, RunSummary};

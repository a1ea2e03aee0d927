//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Knobs for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Record a [`TraceEntry`](crate::trace::TraceEntry) for every executed
    /// node.
    pub trace_enabled: bool,
    /// Initial `cache_outputs` flag for nodes added to the pipeline.
    pub default_cache_outputs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            trace_enabled: false,
            default_cache_outputs: true,
        }
    }
}

impl EngineConfig {
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    pub fn with_cache_outputs(mut self, cache: bool) -> Self {
        self.default_cache_outputs = cache;
        self
    }
}

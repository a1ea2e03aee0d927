//! Refreshing a sink of a built pipeline and summarizing what happened.

use medpipe_core::{CoreError, ExecutionError, TraceEntry};
use medpipe_nodes::{Statistics, StatisticsTarget};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::manifest::{BuiltPipeline, ManifestError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("at least one refresh is required")]
    NoRefreshes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub sink: String,
    /// Number of `update` calls on the sink. Zero is rejected.
    pub refreshes: usize,
    /// Nodes touched before every refresh after the first.
    pub touch: Vec<String>,
}

/// What one refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Nodes visited by the traversal.
    pub executed: usize,
    /// Names of the nodes whose `apply()` ran, in execution order.
    pub recomputed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub sink: String,
    pub ready: bool,
    pub refreshes: Vec<RefreshSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

pub fn run(built: &mut BuiltPipeline, options: &RunOptions) -> Result<RunSummary, RunError> {
    if options.refreshes == 0 {
        return Err(RunError::NoRefreshes);
    }
    let sink = built.handle(&options.sink)?;
    let touched = options
        .touch
        .iter()
        .map(|name| built.handle(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut refreshes = Vec::with_capacity(options.refreshes);
    for round in 0..options.refreshes {
        if round > 0 {
            for &handle in &touched {
                built.pipeline.touch(handle)?;
            }
        }
        let report = built.pipeline.update(sink)?;
        info!(round, recomputed = report.apply_count(), "refreshed {}", options.sink);
        let recomputed = report
            .recomputed
            .iter()
            .map(|&h| built.name_of(h).unwrap_or("?").to_string())
            .collect();
        refreshes.push(RefreshSummary {
            executed: report.executed.len(),
            recomputed,
        });
    }

    let pipeline = &built.pipeline;
    let statistics = pipeline
        .item::<StatisticsTarget>(sink)
        .ok()
        .and_then(StatisticsTarget::statistics);
    let output_shape = if pipeline.node(sink)?.fan_out() > 0 {
        pipeline.get_output(sink, 0)?.map(|d| d.shape().to_vec())
    } else {
        None
    };

    Ok(RunSummary {
        sink: options.sink.clone(),
        ready: pipeline.is_ready(sink)?,
        refreshes,
        statistics,
        output_shape,
        trace: built.pipeline.take_trace(),
    })
}

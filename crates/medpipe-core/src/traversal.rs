//! Traversal driver and per-node execution.
//!
//! A refresh of a sink runs in two phases:
//!
//! 1. **Mark**: a depth-first walk from the sink up through every live
//!    producer. Each node ends up with the length of the *longest* path from
//!    the sink, so in a diamond the shared ancestor sits deeper than both of
//!    its consumers.
//! 2. **Drain**: every marked node goes into a max-heap keyed by depth and is
//!    executed in pop order. Producers therefore always run before their
//!    consumers, and each node runs exactly once per traversal.
//!
//! The visited set, heap and pending-read counts live in a
//! [`TraversalContext`] owned by the call to [`Pipeline::update`]. The
//! traversal borrows the pipeline mutably, so traversals cannot nest or
//! overlap. A guard resets every marked node's depth when the traversal ends,
//! including when a node's `apply()` fails or panics.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use indexmap::IndexSet;
use tracing::{debug, trace, warn};

use crate::dataset::WeakDataset;
use crate::error::{CoreError, ExecutionError};
use crate::id::NodeHandle;
use crate::node::DEPTH_UNMARKED;
use crate::pipeline::Pipeline;
use crate::trace::TraceEntry;

/// Scheduling state for one traversal.
#[derive(Debug, Default)]
pub(crate) struct TraversalContext {
    /// Every node touched by the mark phase, in first-visit order.
    visited: IndexSet<NodeHandle>,
    queue: BinaryHeap<Scheduled>,
    /// Connections from visited consumers that have not executed yet, per
    /// producer.
    pending_reads: HashMap<NodeHandle, usize>,
    /// Producers some consumer actually pulled from during this traversal.
    pulled: HashSet<NodeHandle>,
}

impl TraversalContext {
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.visited.is_empty()
            && self.queue.is_empty()
            && self.pending_reads.is_empty()
            && self.pulled.is_empty()
    }
}

/// Heap entry: deepest first, then earliest visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    depth: i32,
    order: Reverse<usize>,
    handle: NodeHandle,
}

/// Outcome of one [`Pipeline::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Every node of the sink's ancestor closure, in execution order.
    pub executed: Vec<NodeHandle>,
    /// The subset whose `apply()` ran.
    pub recomputed: Vec<NodeHandle>,
}

impl TraversalReport {
    pub fn apply_count(&self) -> usize {
        self.recomputed.len()
    }

    pub fn is_noop(&self) -> bool {
        self.recomputed.is_empty()
    }
}

/// Resets depth markers of everything still in the context when dropped.
struct TraversalGuard<'p> {
    pipeline: &'p mut Pipeline,
    ctx: TraversalContext,
}

impl Drop for TraversalGuard<'_> {
    fn drop(&mut self) {
        let leftover = self.ctx.visited.len();
        for handle in self.ctx.visited.drain(..) {
            if let Some(node) = self.pipeline.slot_mut(handle) {
                node.depth = DEPTH_UNMARKED;
            }
        }
        self.ctx.queue.clear();
        self.ctx.pending_reads.clear();
        self.ctx.pulled.clear();
        if leftover > 0 {
            debug!(leftover, "traversal aborted, depth markers reset");
        }
    }
}

/// What a consumer found behind one of its connections.
struct Pull {
    input: usize,
    producer: NodeHandle,
    /// `None` when the producer no longer exists.
    found: Option<(u64, Option<WeakDataset>)>,
}

impl Pipeline {
    /// Brings `sink` and its whole ancestor closure up to date.
    ///
    /// Stale nodes recompute in producer-before-consumer order; fresh ones are
    /// left alone. An error from any `apply()` aborts the traversal; the
    /// failing node stays marked for recomputation.
    pub fn update(&mut self, sink: NodeHandle) -> Result<TraversalReport, ExecutionError> {
        self.node(sink)?;
        let mut guard = TraversalGuard {
            pipeline: self,
            ctx: TraversalContext::default(),
        };
        guard.pipeline.mark(&mut guard.ctx, sink)?;
        let report = guard.pipeline.drain(&mut guard.ctx)?;
        debug!(
            %sink,
            executed = report.executed.len(),
            recomputed = report.recomputed.len(),
            "traversal finished"
        );
        Ok(report)
    }

    /// Recomputes `handle` right now from whatever its connections currently
    /// hold. Producers are *not* refreshed first, so the node may compute
    /// against stale inputs. Returns whether `apply()` ran, which is always
    /// the case unless it failed.
    pub fn force_recompute(&mut self, handle: NodeHandle) -> Result<bool, ExecutionError> {
        self.node_mut(handle)?.force_recompute = true;
        self.execute(handle, None)
    }

    /// Depth-marking walk from `root`.
    ///
    /// Cycles are not supported; a depth beyond the node count means the walk
    /// went around one, and marking stops with [`CoreError::Cycle`].
    pub(crate) fn mark(
        &mut self,
        ctx: &mut TraversalContext,
        root: NodeHandle,
    ) -> Result<(), CoreError> {
        let limit = i32::try_from(self.node_count()).unwrap_or(i32::MAX);
        let mut stack = vec![(root, 0i32)];
        while let Some((handle, depth)) = stack.pop() {
            let Some(node) = self.slot_mut(handle) else {
                trace!(%handle, "skipping expired producer");
                continue;
            };
            if depth >= limit {
                warn!(%handle, depth, "marking went around a cycle");
                return Err(CoreError::Cycle { handle });
            }
            let first_visit = ctx.visited.insert(handle);
            if !first_visit && depth <= node.depth {
                // Already marked at least this deep, and so are its producers.
                continue;
            }
            node.depth = node.depth.max(depth);
            debug!(%handle, depth = node.depth, "marked");
            for conn in &node.connections {
                if let Some(producer) = conn.producer {
                    stack.push((producer, depth + 1));
                }
            }
        }

        for &handle in &ctx.visited {
            let Some(node) = self.slot(handle) else { continue };
            for producer in node.connections.iter().filter_map(|c| c.producer) {
                if ctx.visited.contains(&producer) {
                    *ctx.pending_reads.entry(producer).or_insert(0) += 1;
                }
            }
        }
        Ok(())
    }

    /// Executes every marked node, deepest first.
    pub(crate) fn drain(
        &mut self,
        ctx: &mut TraversalContext,
    ) -> Result<TraversalReport, ExecutionError> {
        for (order, &handle) in ctx.visited.iter().enumerate() {
            if let Some(node) = self.slot(handle) {
                ctx.queue.push(Scheduled {
                    depth: node.depth,
                    order: Reverse(order),
                    handle,
                });
            }
        }

        let mut report = TraversalReport::default();
        while let Some(next) = ctx.queue.pop() {
            report.executed.push(next.handle);
            if self.execute(next.handle, Some(&mut *ctx))? {
                report.recomputed.push(next.handle);
            }
        }
        ctx.visited.clear();
        ctx.pending_reads.clear();
        ctx.pulled.clear();
        Ok(report)
    }

    /// Runs one node: checks staleness, pulls inputs, applies, evicts
    /// non-caching producers and bumps the timestamp. Returns whether
    /// `apply()` ran.
    pub(crate) fn execute(
        &mut self,
        handle: NodeHandle,
        ctx: Option<&mut TraversalContext>,
    ) -> Result<bool, ExecutionError> {
        let pulls = self.pull_plan(handle)?;
        let node = self.node_mut(handle)?;
        let depth = node.depth;

        let dirty = node.force_recompute
            || node.own_timestamp == 0
            || pulls.iter().any(|pull| match pull.found {
                Some((ts, _)) => ts != node.connections[pull.input].cached_timestamp,
                None => false,
            });

        if !dirty {
            node.depth = DEPTH_UNMARKED;
            self.record(handle, depth, false);
            if let Some(ctx) = ctx {
                self.finish_reads(ctx, &pulls);
            }
            return Ok(false);
        }

        // Stays set unless apply() returns Ok, so an error or a panic leaves
        // the node stale.
        node.force_recompute = true;
        for pull in &pulls {
            match &pull.found {
                Some((ts, view)) => {
                    node.ports.set_input_view(pull.input, view.clone());
                    node.connections[pull.input].cached_timestamp = *ts;
                }
                None => node.ports.set_input_view(pull.input, None),
            }
        }

        if let Err(source) = node.item.apply(&mut node.ports) {
            node.depth = DEPTH_UNMARKED;
            let (id, kind) = (node.id(), node.kind().to_string());
            warn!(%handle, %id, %kind, error = %source, "apply failed");
            return Err(ExecutionError::Apply {
                handle,
                id,
                kind,
                source,
            });
        }

        match ctx {
            Some(ctx) => {
                ctx.pulled
                    .extend(pulls.iter().filter(|p| p.found.is_some()).map(|p| p.producer));
                self.finish_reads(ctx, &pulls);
            }
            None => {
                for pull in &pulls {
                    self.evict(pull.producer);
                }
            }
        }

        let node = self.node_mut(handle)?;
        for pull in &pulls {
            node.ports.set_input_view(pull.input, None);
        }
        node.own_timestamp += 1;
        node.force_recompute = false;
        node.depth = DEPTH_UNMARKED;
        debug!(%handle, id = %node.id(), timestamp = node.own_timestamp, "recomputed");
        self.record(handle, depth, true);
        Ok(true)
    }

    /// Reads, for each connected input, the producer's timestamp and output
    /// view.
    fn pull_plan(&self, handle: NodeHandle) -> Result<Vec<Pull>, ExecutionError> {
        let node = self.node(handle)?;
        let pulls = node
            .connections
            .iter()
            .enumerate()
            .filter_map(|(input, conn)| {
                let producer = conn.producer?;
                let found = self
                    .slot(producer)
                    .map(|p| (p.own_timestamp, p.ports.output_view(conn.producer_port)));
                Some(Pull {
                    input,
                    producer,
                    found,
                })
            })
            .collect();
        Ok(pulls)
    }

    /// Counts down pending reads and evicts producers whose last consumer in
    /// this traversal has now executed, provided at least one consumer
    /// pulled from them. A traversal that recomputes nothing releases nothing.
    fn finish_reads(&mut self, ctx: &mut TraversalContext, pulls: &[Pull]) {
        for pull in pulls.iter().filter(|p| p.found.is_some()) {
            let remaining = match ctx.pending_reads.get_mut(&pull.producer) {
                Some(count) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => 0,
            };
            if remaining == 0 && ctx.pulled.contains(&pull.producer) {
                self.evict(pull.producer);
            }
        }
    }

    /// Drops a producer's outputs unless it caches them.
    fn evict(&mut self, producer: NodeHandle) {
        if let Some(node) = self.slot_mut(producer) {
            if !node.cache_outputs {
                node.ports.clear_outputs();
                debug!(%producer, "released outputs of non-caching producer");
            }
        }
    }

    fn record(&mut self, handle: NodeHandle, depth: i32, recomputed: bool) {
        if !self.config.trace_enabled {
            return;
        }
        if let Some(node) = self.slot(handle) {
            let entry = TraceEntry {
                handle,
                id: node.id(),
                kind: node.kind().to_string(),
                depth,
                timestamp: node.own_timestamp,
                recomputed,
            };
            self.trace.push(entry);
        }
    }
}

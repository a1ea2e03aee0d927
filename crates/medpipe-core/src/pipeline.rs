//! Pipeline: the arena that owns every node and its connections.
//!
//! Nodes live in a petgraph `StableGraph` so indices stay valid across
//! removals. Each slot also records a generation; a [`NodeHandle`] issued for
//! a removed node keeps pointing at its old generation and therefore resolves
//! to nothing, even after the index is reused. Consumers that still reference
//! such a producer see "no data", not an error.
//!
//! Connections are stored on the consumer, one per input port. The graph
//! edges of the `StableGraph` are not used; [`Pipeline::to_dot`] builds a
//! throwaway graph from the connection records instead.

use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::Directed;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::dataset::Dataset;
use crate::error::{CoreError, PortKind};
use crate::id::{NodeHandle, NodeId};
use crate::item::PipelineItem;
use crate::node::PipelineNode;
use crate::trace::TraceEntry;

/// Owner of a dataflow graph of pipeline items.
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) nodes: StableGraph<PipelineNode, (), Directed, u32>,
    /// Current generation per slot index.
    generations: Vec<u32>,
    pub(crate) config: EngineConfig,
    pub(crate) trace: Vec<TraceEntry>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new(EngineConfig::default())
    }
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Pipeline {
            nodes: StableGraph::new(),
            generations: Vec::new(),
            config,
            trace: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Node lifecycle
    // -----------------------------------------------------------------------

    /// Adds an item, building its ports from the declared type tags.
    pub fn add_node(&mut self, item: Box<dyn PipelineItem>) -> NodeHandle {
        let id = item.id();
        let node = PipelineNode::new(item, 0, self.config.default_cache_outputs);
        let idx = self.nodes.add_node(node);

        let slot = idx.index();
        if slot >= self.generations.len() {
            self.generations.resize(slot + 1, 0);
        }
        let generation = self.generations[slot];
        self.nodes[idx].generation = generation;

        let handle = NodeHandle::new(idx, generation);
        debug!(%handle, %id, "node added");
        handle
    }

    /// Removes a node, releasing its ports. Consumers that still point at it
    /// keep their connection record but will find no producer behind it.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<Box<dyn PipelineItem>, CoreError> {
        self.node(handle)?;
        let node = self
            .nodes
            .remove_node(handle.node_index())
            .ok_or(CoreError::NodeNotFound { handle })?;
        if let Some(generation) = self.generations.get_mut(handle.index as usize) {
            *generation = generation.wrapping_add(1);
        }
        debug!(%handle, id = %node.id(), "node removed");
        Ok(node.release())
    }

    /// Adds a fresh instance of the same concrete type as `prototype`.
    pub fn instantiate(
        &mut self,
        prototype: NodeHandle,
        id: NodeId,
    ) -> Result<NodeHandle, CoreError> {
        let item = self.node(prototype)?.item.new_instance(id);
        Ok(self.add_node(item))
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub(crate) fn slot(&self, handle: NodeHandle) -> Option<&PipelineNode> {
        self.nodes
            .node_weight(handle.node_index())
            .filter(|n| n.generation == handle.generation)
    }

    pub(crate) fn slot_mut(&mut self, handle: NodeHandle) -> Option<&mut PipelineNode> {
        self.nodes
            .node_weight_mut(handle.node_index())
            .filter(|n| n.generation == handle.generation)
    }

    /// Read-only view of a node.
    pub fn node(&self, handle: NodeHandle) -> Result<&PipelineNode, CoreError> {
        self.slot(handle).ok_or(CoreError::NodeNotFound { handle })
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut PipelineNode, CoreError> {
        self.slot_mut(handle).ok_or(CoreError::NodeNotFound { handle })
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.slot(handle).is_some()
    }

    /// Finds the handle of the node carrying `id`.
    pub fn find(&self, id: NodeId) -> Option<NodeHandle> {
        self.handles()
            .into_iter()
            .find(|&h| self.slot(h).is_some_and(|n| n.id() == id))
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.nodes
            .node_indices()
            .map(|idx| NodeHandle::new(idx, self.nodes[idx].generation))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.node_count()
    }

    /// Borrows the concrete item behind `handle`.
    pub fn item<T: PipelineItem>(&self, handle: NodeHandle) -> Result<&T, CoreError> {
        self.node(handle)?
            .item
            .as_any()
            .downcast_ref::<T>()
            .ok_or(CoreError::WrongItemType {
                handle,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Mutates the concrete item behind `handle` and marks it for
    /// recomputation on the next traversal.
    pub fn configure<T, R>(
        &mut self,
        handle: NodeHandle,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, CoreError>
    where
        T: PipelineItem,
    {
        let node = self.node_mut(handle)?;
        let item = node
            .item
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(CoreError::WrongItemType {
                handle,
                expected: std::any::type_name::<T>(),
            })?;
        let result = f(item);
        node.force_recompute = true;
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Connection management
    // -----------------------------------------------------------------------

    /// Feeds `producer`'s output `producer_output` into `consumer`'s input
    /// `local_input`, replacing whatever was connected there.
    ///
    /// A type mismatch is a warning-level error: nothing changes.
    pub fn connect(
        &mut self,
        consumer: NodeHandle,
        producer: NodeHandle,
        local_input: usize,
        producer_output: usize,
    ) -> Result<(), CoreError> {
        let consumer_type = self.node(consumer)?.ports.input_type(local_input)?;
        let producer_node = self
            .slot(producer)
            .ok_or(CoreError::NullProducer { handle: producer })?;
        let producer_type = producer_node.ports.output_type(producer_output)?;

        if !producer_type.is_compatible(consumer_type) {
            let err = CoreError::PortTypeMismatch {
                producer_port: producer_output,
                producer_type,
                consumer_port: local_input,
                consumer_type,
            };
            warn!(%consumer, %producer, severity = ?err.severity(), "{}", err);
            return Err(err);
        }

        self.node_mut(consumer)?.connections[local_input] =
            Connection::to(producer, producer_output);
        debug!(%consumer, %producer, local_input, producer_output, "connected");
        Ok(())
    }

    /// Clears the producer of input `local_input`.
    pub fn disconnect(
        &mut self,
        consumer: NodeHandle,
        local_input: usize,
    ) -> Result<(), CoreError> {
        let node = self.node_mut(consumer)?;
        let len = node.connections.len();
        node.connections
            .get_mut(local_input)
            .ok_or_else(|| CoreError::out_of_range(PortKind::Connection, local_input, len))?
            .clear();
        debug!(%consumer, local_input, "disconnected");
        Ok(())
    }

    pub fn connection(
        &self,
        consumer: NodeHandle,
        local_input: usize,
    ) -> Result<Connection, CoreError> {
        let node = self.node(consumer)?;
        let len = node.connections.len();
        node.connections
            .get(local_input)
            .copied()
            .ok_or_else(|| CoreError::out_of_range(PortKind::Connection, local_input, len))
    }

    /// Live producer behind input `local_input`, `None` if disconnected or
    /// the producer was removed.
    pub fn producer_of(
        &self,
        consumer: NodeHandle,
        local_input: usize,
    ) -> Result<Option<NodeHandle>, CoreError> {
        Ok(self
            .connection(consumer, local_input)?
            .producer
            .filter(|&p| self.contains(p)))
    }

    // -----------------------------------------------------------------------
    // Port accessors
    // -----------------------------------------------------------------------

    pub fn get_input(&self, handle: NodeHandle, i: usize) -> Result<Option<Dataset>, CoreError> {
        self.node(handle)?.ports.get_input(i)
    }

    pub fn get_output(&self, handle: NodeHandle, i: usize) -> Result<Option<Dataset>, CoreError> {
        Ok(self.node(handle)?.ports.get_output(i)?.cloned())
    }

    pub fn set_input(
        &mut self,
        handle: NodeHandle,
        value: Option<&Dataset>,
        i: usize,
    ) -> Result<(), CoreError> {
        self.node_mut(handle)?.ports.set_input(value, i)
    }

    pub fn set_output(
        &mut self,
        handle: NodeHandle,
        value: Option<Dataset>,
        i: usize,
    ) -> Result<(), CoreError> {
        self.node_mut(handle)?.ports.set_output(value, i)
    }

    // -----------------------------------------------------------------------
    // Flags and timestamps
    // -----------------------------------------------------------------------

    pub fn set_cache_outputs(&mut self, handle: NodeHandle, cache: bool) -> Result<(), CoreError> {
        self.node_mut(handle)?.cache_outputs = cache;
        Ok(())
    }

    pub fn cache_outputs(&self, handle: NodeHandle) -> Result<bool, CoreError> {
        Ok(self.node(handle)?.cache_outputs)
    }

    pub fn timestamp(&self, handle: NodeHandle) -> Result<u64, CoreError> {
        Ok(self.node(handle)?.own_timestamp)
    }

    pub fn depth(&self, handle: NodeHandle) -> Result<i32, CoreError> {
        Ok(self.node(handle)?.depth)
    }

    pub fn is_ready(&self, handle: NodeHandle) -> Result<bool, CoreError> {
        Ok(self.node(handle)?.is_ready())
    }

    /// Announces new data on `handle` by bumping its timestamp, which makes
    /// every consumer stale. Returns the new timestamp.
    pub fn touch(&mut self, handle: NodeHandle) -> Result<u64, CoreError> {
        let node = self.node_mut(handle)?;
        node.own_timestamp += 1;
        Ok(node.own_timestamp)
    }

    /// Forces `handle` to recompute during the next traversal that reaches
    /// it, without executing anything now.
    pub fn invalidate(&mut self, handle: NodeHandle) -> Result<(), CoreError> {
        self.node_mut(handle)?.force_recompute = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Trace
    // -----------------------------------------------------------------------

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.trace)
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Graphviz rendering of the live topology. Node labels are
    /// `kind#id`, edge labels are `producer_port -> input_port`.
    pub fn to_dot(&self) -> String {
        let mut graph = DiGraph::<String, String>::new();
        let mut index: HashMap<NodeHandle, NodeIndex> = HashMap::new();

        for handle in self.handles() {
            if let Some(node) = self.slot(handle) {
                let idx = graph.add_node(format!("{}#{}", node.kind(), node.id()));
                index.insert(handle, idx);
            }
        }
        for handle in self.handles() {
            let Some(node) = self.slot(handle) else { continue };
            for (input, conn) in node.connections.iter().enumerate() {
                let Some(producer) = conn.producer else { continue };
                if let (Some(&from), Some(&to)) = (index.get(&producer), index.get(&handle)) {
                    graph.add_edge(from, to, format!("{} -> {}", conn.producer_port, input));
                }
            }
        }

        format!("{}", Dot::with_config(&graph, &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use crate::port::PortType;
    use crate::test_support::Recorder;

    fn chain() -> (Pipeline, NodeHandle, NodeHandle) {
        let mut pipeline = Pipeline::default();
        let source = pipeline.add_node(Recorder::source(1, PortType::IMAGE_3D).boxed());
        let filter = pipeline.add_node(Recorder::filter(2, PortType::IMAGE).boxed());
        (pipeline, source, filter)
    }

    #[test]
    fn add_node_builds_ports_from_types() {
        let (pipeline, source, filter) = chain();
        assert_eq!(pipeline.node_count(), 2);

        let node = pipeline.node(filter).unwrap();
        assert_eq!(node.fan_in(), 1);
        assert_eq!(node.fan_out(), 1);
        assert_eq!(node.timestamp(), 0);
        assert_eq!(node.depth(), crate::node::DEPTH_UNMARKED);
        assert!(node.cache_outputs());
        assert_eq!(pipeline.node(source).unwrap().fan_in(), 0);
    }

    #[test]
    fn default_cache_flag_follows_config() {
        let mut pipeline = Pipeline::new(EngineConfig::default().with_cache_outputs(false));
        let h = pipeline.add_node(Recorder::source(1, PortType::IMAGE).boxed());
        assert!(!pipeline.cache_outputs(h).unwrap());
    }

    #[test]
    fn connect_stores_connection() {
        let (mut pipeline, source, filter) = chain();
        pipeline.connect(filter, source, 0, 0).unwrap();

        let conn = pipeline.connection(filter, 0).unwrap();
        assert_eq!(conn.producer, Some(source));
        assert_eq!(conn.producer_port, 0);
        assert_eq!(conn.cached_timestamp, 0);
        assert_eq!(pipeline.producer_of(filter, 0).unwrap(), Some(source));
    }

    #[test]
    fn connect_overwrites_silently() {
        let (mut pipeline, source, filter) = chain();
        let other = pipeline.add_node(Recorder::source(3, PortType::IMAGE).boxed());
        pipeline.connect(filter, source, 0, 0).unwrap();
        pipeline.connect(filter, other, 0, 0).unwrap();
        assert_eq!(pipeline.producer_of(filter, 0).unwrap(), Some(other));
    }

    #[test]
    fn connect_rejects_incompatible_types() {
        let mut pipeline = Pipeline::default();
        let vector = pipeline.add_node(Recorder::source(1, PortType::VECTOR).boxed());
        let integer = pipeline.add_node(Recorder::filter(2, PortType::INTEGER).boxed());
        let counter = pipeline.add_node(Recorder::source(3, PortType::INTEGER).boxed());

        pipeline.connect(integer, counter, 0, 0).unwrap();
        let err = pipeline.connect(integer, vector, 0, 0).unwrap_err();
        assert!(matches!(err, CoreError::PortTypeMismatch { .. }));
        assert_eq!(err.severity(), Severity::Warning);

        // Previous connection untouched.
        assert_eq!(pipeline.producer_of(integer, 0).unwrap(), Some(counter));
    }

    #[test]
    fn connect_bounds_checks_both_ports() {
        let (mut pipeline, source, filter) = chain();
        let err = pipeline.connect(filter, source, 1, 0).unwrap_err();
        assert_eq!(err, CoreError::out_of_range(PortKind::Input, 1, 1));
        assert_eq!(err.severity(), Severity::Fatal);

        let err = pipeline.connect(filter, source, 0, 1).unwrap_err();
        assert_eq!(err, CoreError::out_of_range(PortKind::Output, 1, 1));
    }

    #[test]
    fn connect_with_dead_producer_is_null_producer() {
        let (mut pipeline, source, filter) = chain();
        pipeline.remove_node(source).unwrap();
        let err = pipeline.connect(filter, source, 0, 0).unwrap_err();
        assert_eq!(err, CoreError::NullProducer { handle: source });
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn disconnect_clears_and_checks_bounds() {
        let (mut pipeline, source, filter) = chain();
        pipeline.connect(filter, source, 0, 0).unwrap();
        pipeline.disconnect(filter, 0).unwrap();

        let conn = pipeline.connection(filter, 0).unwrap();
        assert!(conn.producer.is_none());
        assert_eq!(conn.producer_port, 0);

        // fan_in itself is already out of range.
        let err = pipeline.disconnect(filter, 1).unwrap_err();
        assert_eq!(err, CoreError::out_of_range(PortKind::Connection, 1, 1));
    }

    #[test]
    fn removed_node_handle_stays_dead_after_slot_reuse() {
        let (mut pipeline, source, filter) = chain();
        pipeline.connect(filter, source, 0, 0).unwrap();
        pipeline.remove_node(source).unwrap();

        let replacement = pipeline.add_node(Recorder::source(9, PortType::IMAGE).boxed());
        assert_eq!(replacement.index, source.index);
        assert_ne!(replacement.generation, source.generation);

        assert!(!pipeline.contains(source));
        assert!(matches!(
            pipeline.node(source),
            Err(CoreError::NodeNotFound { .. })
        ));
        // The consumer still records the old handle but sees no producer.
        assert_eq!(pipeline.connection(filter, 0).unwrap().producer, Some(source));
        assert_eq!(pipeline.producer_of(filter, 0).unwrap(), None);
    }

    #[test]
    fn remove_node_releases_outputs() {
        let (mut pipeline, source, _) = chain();
        let data = Dataset::filled(vec![2], 1.0).unwrap();
        pipeline.set_output(source, Some(data.clone()), 0).unwrap();
        assert_eq!(data.strong_count(), 2);

        let item = pipeline.remove_node(source).unwrap();
        assert_eq!(item.id(), NodeId(1));
        assert_eq!(data.strong_count(), 1);
    }

    #[test]
    fn accessors_check_ranges() {
        let (mut pipeline, source, filter) = chain();
        assert!(matches!(
            pipeline.get_input(source, 0),
            Err(CoreError::OutOfRange { kind: PortKind::Input, .. })
        ));
        assert!(matches!(
            pipeline.set_output(filter, None, 1),
            Err(CoreError::OutOfRange { kind: PortKind::Output, .. })
        ));
    }

    #[test]
    fn find_and_instantiate() {
        let (mut pipeline, _, filter) = chain();
        assert_eq!(pipeline.find(NodeId(2)), Some(filter));
        assert_eq!(pipeline.find(NodeId(42)), None);

        let copy = pipeline.instantiate(filter, NodeId(42)).unwrap();
        assert_eq!(pipeline.find(NodeId(42)), Some(copy));
        assert_eq!(pipeline.node(copy).unwrap().kind(), "recorder");
        assert!(pipeline.connection(copy, 0).unwrap().producer.is_none());
    }

    #[test]
    fn configure_downcasts_and_invalidates() {
        let (mut pipeline, source, _) = chain();
        pipeline
            .configure::<Recorder, _>(source, |recorder| recorder.fail = true)
            .unwrap();
        assert!(pipeline.item::<Recorder>(source).unwrap().fail);
        assert!(pipeline.node(source).unwrap().is_forced());
    }

    #[test]
    fn touch_bumps_timestamp() {
        let (mut pipeline, source, _) = chain();
        assert_eq!(pipeline.touch(source).unwrap(), 1);
        assert_eq!(pipeline.touch(source).unwrap(), 2);
        assert_eq!(pipeline.timestamp(source).unwrap(), 2);
    }

    #[test]
    fn dot_lists_nodes_and_links() {
        let (mut pipeline, source, filter) = chain();
        pipeline.connect(filter, source, 0, 0).unwrap();
        let dot = pipeline.to_dot();
        assert!(dot.contains("recorder#1"));
        assert!(dot.contains("recorder#2"));
        assert!(dot.contains("0 -> 0"));
    }
}

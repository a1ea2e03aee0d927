//! Arena slot wrapping a pipeline item with its engine-side state.
//!
//! A [`PipelineNode`] owns the item, its ports, one [`Connection`] per input
//! port, the version timestamp, and the transient depth marker used while a
//! traversal is in flight.

use crate::connection::Connection;
use crate::item::PipelineItem;
use crate::id::NodeId;
use crate::port::Ports;

/// Depth of a node that is not part of a traversal.
pub const DEPTH_UNMARKED: i32 = -1;

/// A pipeline item plus the state the engine keeps for it.
#[derive(Debug)]
pub struct PipelineNode {
    pub(crate) item: Box<dyn PipelineItem>,
    /// Slot generation this node was created with.
    pub(crate) generation: u32,
    pub(crate) ports: Ports,
    /// One entry per input port.
    pub(crate) connections: Vec<Connection>,
    /// Version counter, 0 until the first successful computation.
    pub(crate) own_timestamp: u64,
    pub(crate) depth: i32,
    pub(crate) cache_outputs: bool,
    pub(crate) force_recompute: bool,
}

impl PipelineNode {
    pub(crate) fn new(item: Box<dyn PipelineItem>, generation: u32, cache_outputs: bool) -> Self {
        let ports = Ports::new(item.input_types(), item.output_types());
        let connections = vec![Connection::default(); ports.fan_in()];
        PipelineNode {
            item,
            generation,
            ports,
            connections,
            own_timestamp: 0,
            depth: DEPTH_UNMARKED,
            cache_outputs,
            force_recompute: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.item.id()
    }

    pub fn kind(&self) -> &str {
        self.item.kind()
    }

    pub fn item(&self) -> &dyn PipelineItem {
        self.item.as_ref()
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn fan_in(&self) -> usize {
        self.ports.fan_in()
    }

    pub fn fan_out(&self) -> usize {
        self.ports.fan_out()
    }

    pub fn timestamp(&self) -> u64 {
        self.own_timestamp
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn cache_outputs(&self) -> bool {
        self.cache_outputs
    }

    pub fn is_forced(&self) -> bool {
        self.force_recompute
    }

    pub fn is_ready(&self) -> bool {
        self.ports.is_ready()
    }

    /// Drops owned outputs and input views, returning the item.
    pub(crate) fn release(mut self) -> Box<dyn PipelineItem> {
        self.ports.clear_outputs();
        self.ports.clear_inputs();
        self.item
    }
}

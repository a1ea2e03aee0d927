//! The contract every concrete pipeline item implements.

use std::any::Any;
use std::fmt;

use crate::error::ApplyError;
use crate::id::NodeId;
use crate::port::{PortType, Ports};

/// A unit of computation with fixed fan-in and fan-out.
///
/// The engine reads [`input_types`](Self::input_types) and
/// [`output_types`](Self::output_types) once, when the item is added to a
/// pipeline; the resulting port layout never changes afterwards.
pub trait PipelineItem: Any + fmt::Debug {
    /// Caller-supplied identity.
    fn id(&self) -> NodeId;

    /// Short name of the concrete item type, e.g. `"threshold"`.
    fn kind(&self) -> &str;

    fn input_types(&self) -> &[PortType];

    fn output_types(&self) -> &[PortType];

    /// Reads inputs, sets the ready flag and writes outputs.
    ///
    /// Inputs may be absent (never connected, or the producer released its
    /// data). An `Err` aborts the current traversal.
    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError>;

    /// A fresh, disconnected instance of the same concrete type.
    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

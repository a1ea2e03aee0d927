//! Port type tags and the port surface handed to `apply()`.
//!
//! Type tags form a divisibility hierarchy: a tag is compatible with another
//! when one divides the other. Generic kinds are primes and their
//! refinements are products, so [`PortType::VECTOR_FIELD`] accepts both
//! [`PortType::VECTOR_FIELD_2D`] and [`PortType::VECTOR_FIELD_3D`] while the
//! two refinements reject each other. [`PortType::ANY`] divides everything.
//!
//! Compatibility is checked once, when a connection is formed. Nothing is
//! re-validated when data flows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, WeakDataset};
use crate::error::{CoreError, PortKind};

/// Integer-coded port type tag. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PortType(u32);

const fn tag(value: u32) -> PortType {
    assert!(value != 0, "port type tags are non-zero");
    PortType(value)
}

impl PortType {
    pub const ANY: PortType = tag(1);
    pub const INTEGER: PortType = tag(2);
    pub const DOUBLE: PortType = tag(3);
    pub const VECTOR: PortType = tag(5);
    pub const MATRIX: PortType = tag(7);
    pub const IMAGE: PortType = tag(11);
    pub const IMAGE_2D: PortType = tag(11 * 13);
    pub const IMAGE_3D: PortType = tag(11 * 17);
    pub const VECTOR_FIELD: PortType = tag(19);
    pub const VECTOR_FIELD_2D: PortType = tag(19 * 13);
    pub const VECTOR_FIELD_3D: PortType = tag(19 * 17);
    pub const POINT_SET: PortType = tag(23);
    pub const STRING: PortType = tag(29);

    /// Builds a custom tag. Zero is rejected.
    pub fn new(value: u32) -> Result<Self, CoreError> {
        if value == 0 {
            return Err(CoreError::InvalidPortType { value });
        }
        Ok(PortType(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// True if either tag divides the other.
    pub fn is_compatible(self, other: PortType) -> bool {
        let (a, b) = (self.value(), other.value());
        a % b == 0 || b % a == 0
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            PortType::ANY => "any",
            PortType::INTEGER => "integer",
            PortType::DOUBLE => "double",
            PortType::VECTOR => "vector",
            PortType::MATRIX => "matrix",
            PortType::IMAGE => "image",
            PortType::IMAGE_2D => "image2d",
            PortType::IMAGE_3D => "image3d",
            PortType::VECTOR_FIELD => "vector-field",
            PortType::VECTOR_FIELD_2D => "vector-field2d",
            PortType::VECTOR_FIELD_3D => "vector-field3d",
            PortType::POINT_SET => "point-set",
            PortType::STRING => "string",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "type#{}", self.value()),
        }
    }
}

impl TryFrom<u32> for PortType {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PortType::new(value)
    }
}

impl From<PortType> for u32 {
    fn from(t: PortType) -> u32 {
        t.0
    }
}

/// Input slot: a revocable, non-owning view of some producer's output.
#[derive(Debug, Clone)]
pub struct InputPort {
    pub port_type: PortType,
    view: Option<WeakDataset>,
}

/// Output slot: owns the dataset it exposes.
#[derive(Debug, Clone)]
pub struct OutputPort {
    pub port_type: PortType,
    data: Option<Dataset>,
}

impl InputPort {
    pub fn new(port_type: PortType) -> Self {
        InputPort {
            port_type,
            view: None,
        }
    }
}

impl OutputPort {
    pub fn new(port_type: PortType) -> Self {
        OutputPort {
            port_type,
            data: None,
        }
    }
}

/// The data-exchange surface between a node and the engine.
///
/// Fan-in and fan-out are fixed when the ports are built.
#[derive(Debug, Clone)]
pub struct Ports {
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    ready: bool,
}

impl Ports {
    pub fn new(input_types: &[PortType], output_types: &[PortType]) -> Self {
        Ports {
            inputs: input_types.iter().copied().map(InputPort::new).collect(),
            outputs: output_types.iter().copied().map(OutputPort::new).collect(),
            ready: false,
        }
    }

    pub fn fan_in(&self) -> usize {
        self.inputs.len()
    }

    pub fn fan_out(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_type(&self, i: usize) -> Result<PortType, CoreError> {
        self.input(i).map(|p| p.port_type)
    }

    pub fn output_type(&self, i: usize) -> Result<PortType, CoreError> {
        self.output(i).map(|p| p.port_type)
    }

    /// Current value of input `i`. `Ok(None)` when never connected, not yet
    /// pulled, or the producer already released its data.
    pub fn get_input(&self, i: usize) -> Result<Option<Dataset>, CoreError> {
        Ok(self.input(i)?.view.as_ref().and_then(WeakDataset::upgrade))
    }

    pub fn get_output(&self, i: usize) -> Result<Option<&Dataset>, CoreError> {
        Ok(self.output(i)?.data.as_ref())
    }

    /// Points input `i` at `value` without taking ownership of it.
    pub fn set_input(&mut self, value: Option<&Dataset>, i: usize) -> Result<(), CoreError> {
        let len = self.inputs.len();
        let port = self
            .inputs
            .get_mut(i)
            .ok_or_else(|| CoreError::out_of_range(PortKind::Input, i, len))?;
        port.view = value.map(Dataset::downgrade);
        Ok(())
    }

    pub fn set_output(&mut self, value: Option<Dataset>, i: usize) -> Result<(), CoreError> {
        let len = self.outputs.len();
        let port = self
            .outputs
            .get_mut(i)
            .ok_or_else(|| CoreError::out_of_range(PortKind::Output, i, len))?;
        port.data = value;
        Ok(())
    }

    /// Drops every owned output dataset.
    pub fn clear_outputs(&mut self) {
        for port in &mut self.outputs {
            port.data = None;
        }
    }

    /// Drops every input view.
    pub fn clear_inputs(&mut self) {
        for port in &mut self.inputs {
            port.view = None;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub(crate) fn set_input_view(&mut self, i: usize, view: Option<WeakDataset>) {
        if let Some(port) = self.inputs.get_mut(i) {
            port.view = view;
        }
    }

    pub(crate) fn output_view(&self, i: usize) -> Option<WeakDataset> {
        self.outputs
            .get(i)
            .and_then(|p| p.data.as_ref())
            .map(Dataset::downgrade)
    }

    fn input(&self, i: usize) -> Result<&InputPort, CoreError> {
        self.inputs
            .get(i)
            .ok_or_else(|| CoreError::out_of_range(PortKind::Input, i, self.inputs.len()))
    }

    fn output(&self, i: usize) -> Result<&OutputPort, CoreError> {
        self.outputs
            .get(i)
            .ok_or_else(|| CoreError::out_of_range(PortKind::Output, i, self.outputs.len()))
    }
}

//! Source item emitting a held volume.

use std::any::Any;

use medpipe_core::{ApplyError, Dataset, NodeId, PipelineItem, PortType, Ports};
use serde::Deserialize;

use crate::error::NodeError;
use crate::Configure;

const OUTPUTS: [PortType; 1] = [PortType::IMAGE_3D];

/// Emits its volume on output 0. Not ready while it holds nothing.
#[derive(Debug, Clone)]
pub struct VolumeSource {
    id: NodeId,
    volume: Option<Dataset>,
}

/// Parameters: a shape plus either a constant fill or a linear ramp
/// (`voxel[i] = i`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeParams {
    pub shape: Vec<usize>,
    #[serde(default)]
    pub fill: f32,
    #[serde(default)]
    pub ramp: bool,
}

impl VolumeSource {
    pub fn new(id: NodeId) -> Self {
        VolumeSource { id, volume: None }
    }

    pub fn with_volume(id: NodeId, volume: Dataset) -> Self {
        VolumeSource {
            id,
            volume: Some(volume),
        }
    }

    pub fn volume(&self) -> Option<&Dataset> {
        self.volume.as_ref()
    }

    /// Swaps the held volume, returning the previous one.
    pub fn replace(&mut self, volume: Option<Dataset>) -> Option<Dataset> {
        std::mem::replace(&mut self.volume, volume)
    }
}

impl Configure for VolumeSource {
    type Params = VolumeParams;

    fn configure(&mut self, params: VolumeParams) -> Result<(), NodeError> {
        let volume = if params.ramp {
            let len = Dataset::filled(params.shape.clone(), 0.0)?.len();
            Dataset::new(params.shape, (0..len).map(|i| i as f32).collect())?
        } else {
            Dataset::filled(params.shape, params.fill)?
        };
        self.volume = Some(volume);
        Ok(())
    }
}

impl PipelineItem for VolumeSource {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "volume-source"
    }

    fn input_types(&self) -> &[PortType] {
        &[]
    }

    fn output_types(&self) -> &[PortType] {
        &OUTPUTS
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        ports.set_ready(self.volume.is_some());
        ports.set_output(self.volume.clone(), 0)?;
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        Box::new(VolumeSource::new(id))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

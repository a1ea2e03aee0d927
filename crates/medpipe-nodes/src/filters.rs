//! Voxel-wise filters.
//!
//! Every filter clears its outputs and reports not-ready when any input is
//! absent, so a consumer never sees a result computed from missing data.

use std::any::Any;

use medpipe_core::{ApplyError, Dataset, NodeId, PipelineItem, PortType, Ports};
use serde::Deserialize;
use tracing::debug;

use crate::error::NodeError;
use crate::Configure;

const ONE_IMAGE: [PortType; 1] = [PortType::IMAGE];
const TWO_IMAGES: [PortType; 2] = [PortType::IMAGE, PortType::IMAGE];

/// Collects every input, or marks the node not ready and clears its outputs.
fn gather(ports: &mut Ports, id: NodeId) -> Result<Option<Vec<Dataset>>, ApplyError> {
    let mut inputs = Vec::with_capacity(ports.fan_in());
    for i in 0..ports.fan_in() {
        match ports.get_input(i)? {
            Some(d) => inputs.push(d),
            None => {
                debug!(%id, input = i, "input absent");
                ports.set_ready(false);
                ports.clear_outputs();
                return Ok(None);
            }
        }
    }
    Ok(Some(inputs))
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// `voxel * factor`.
#[derive(Debug, Clone)]
pub struct ScaleFilter {
    id: NodeId,
    factor: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleParams {
    pub factor: f32,
}

impl ScaleFilter {
    pub fn new(id: NodeId, factor: f32) -> Self {
        ScaleFilter { id, factor }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }
}

impl Configure for ScaleFilter {
    type Params = ScaleParams;

    fn configure(&mut self, params: ScaleParams) -> Result<(), NodeError> {
        if !params.factor.is_finite() {
            return Err(NodeError::InvalidParameter {
                name: "factor",
                reason: format!("{} is not finite", params.factor),
            });
        }
        self.factor = params.factor;
        Ok(())
    }
}

impl PipelineItem for ScaleFilter {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "scale"
    }

    fn input_types(&self) -> &[PortType] {
        &ONE_IMAGE
    }

    fn output_types(&self) -> &[PortType] {
        &ONE_IMAGE
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        let Some(inputs) = gather(ports, self.id)? else {
            return Ok(());
        };
        let factor = self.factor;
        ports.set_output(Some(inputs[0].map(|v| v * factor)), 0)?;
        ports.set_ready(true);
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        Box::new(ScaleFilter::new(id, 1.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

/// Binary mask: 1 where `voxel >= level`, 0 elsewhere.
#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    id: NodeId,
    level: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdParams {
    pub level: f32,
}

impl ThresholdFilter {
    pub fn new(id: NodeId, level: f32) -> Self {
        ThresholdFilter { id, level }
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

impl Configure for ThresholdFilter {
    type Params = ThresholdParams;

    fn configure(&mut self, params: ThresholdParams) -> Result<(), NodeError> {
        if params.level.is_nan() {
            return Err(NodeError::InvalidParameter {
                name: "level",
                reason: "NaN".into(),
            });
        }
        self.level = params.level;
        Ok(())
    }
}

impl PipelineItem for ThresholdFilter {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "threshold"
    }

    fn input_types(&self) -> &[PortType] {
        &ONE_IMAGE
    }

    fn output_types(&self) -> &[PortType] {
        &ONE_IMAGE
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        let Some(inputs) = gather(ports, self.id)? else {
            return Ok(());
        };
        let level = self.level;
        let mask = inputs[0].map(|v| if v >= level { 1.0 } else { 0.0 });
        ports.set_output(Some(mask), 0)?;
        ports.set_ready(true);
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        Box::new(ThresholdFilter::new(id, 0.0))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

/// Voxel-wise sum of two equally shaped volumes.
#[derive(Debug, Clone)]
pub struct AddFilter {
    id: NodeId,
}

impl AddFilter {
    pub fn new(id: NodeId) -> Self {
        AddFilter { id }
    }
}

impl Configure for AddFilter {
    type Params = serde::de::IgnoredAny;

    fn configure(&mut self, _params: serde::de::IgnoredAny) -> Result<(), NodeError> {
        Ok(())
    }
}

impl PipelineItem for AddFilter {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "add"
    }

    fn input_types(&self) -> &[PortType] {
        &TWO_IMAGES
    }

    fn output_types(&self) -> &[PortType] {
        &ONE_IMAGE
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        let Some(inputs) = gather(ports, self.id)? else {
            return Ok(());
        };
        let (left, right) = (&inputs[0], &inputs[1]);
        if left.shape() != right.shape() {
            ports.set_ready(false);
            ports.clear_outputs();
            return Err(NodeError::ShapeMismatch {
                left: left.shape().to_vec(),
                right: right.shape().to_vec(),
            }
            .into());
        }
        let voxels = left
            .voxels()
            .iter()
            .zip(right.voxels())
            .map(|(a, b)| a + b)
            .collect();
        ports.set_output(Some(Dataset::new(left.shape().to_vec(), voxels)?), 0)?;
        ports.set_ready(true);
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        Box::new(AddFilter::new(id))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VolumeSource;
    use medpipe_core::{ExecutionError, NodeHandle, Pipeline};

    fn source(pipeline: &mut Pipeline, id: u64, shape: Vec<usize>, value: f32) -> NodeHandle {
        let volume = Dataset::filled(shape, value).unwrap();
        pipeline.add_node(Box::new(VolumeSource::with_volume(NodeId(id), volume)))
    }

    #[test]
    fn scale_multiplies() {
        let mut pipeline = Pipeline::default();
        let s = source(&mut pipeline, 1, vec![2, 2], 2.0);
        let f = pipeline.add_node(Box::new(ScaleFilter::new(NodeId(2), 1.5)));
        pipeline.connect(f, s, 0, 0).unwrap();

        pipeline.update(f).unwrap();
        let out = pipeline.get_output(f, 0).unwrap().unwrap();
        assert!(out.voxels().iter().all(|&v| v == 3.0));
        assert!(pipeline.is_ready(f).unwrap());
    }

    #[test]
    fn threshold_builds_mask() {
        let mut pipeline = Pipeline::default();
        let volume = Dataset::new(vec![4], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let s = pipeline.add_node(Box::new(VolumeSource::with_volume(NodeId(1), volume)));
        let f = pipeline.add_node(Box::new(ThresholdFilter::new(NodeId(2), 2.0)));
        pipeline.connect(f, s, 0, 0).unwrap();

        pipeline.update(f).unwrap();
        let out = pipeline.get_output(f, 0).unwrap().unwrap();
        assert_eq!(out.voxels(), &[0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn add_sums_matching_shapes() {
        let mut pipeline = Pipeline::default();
        let a = source(&mut pipeline, 1, vec![3], 1.0);
        let b = source(&mut pipeline, 2, vec![3], 2.5);
        let add = pipeline.add_node(Box::new(AddFilter::new(NodeId(3))));
        pipeline.connect(add, a, 0, 0).unwrap();
        pipeline.connect(add, b, 1, 0).unwrap();

        pipeline.update(add).unwrap();
        let out = pipeline.get_output(add, 0).unwrap().unwrap();
        assert_eq!(out.voxels(), &[3.5, 3.5, 3.5]);
    }

    #[test]
    fn add_rejects_shape_mismatch() {
        let mut pipeline = Pipeline::default();
        let a = source(&mut pipeline, 1, vec![3], 1.0);
        let b = source(&mut pipeline, 2, vec![4], 1.0);
        let add = pipeline.add_node(Box::new(AddFilter::new(NodeId(3))));
        pipeline.connect(add, a, 0, 0).unwrap();
        pipeline.connect(add, b, 1, 0).unwrap();

        let err = pipeline.update(add).unwrap_err();
        match err {
            ExecutionError::Apply { handle, source, .. } => {
                assert_eq!(handle, add);
                assert!(source.downcast_ref::<NodeError>().is_some());
            }
            other => panic!("expected apply error, got {other:?}"),
        }
        assert!(!pipeline.is_ready(add).unwrap());
    }

    #[test]
    fn missing_input_clears_output() {
        let mut pipeline = Pipeline::default();
        let s = source(&mut pipeline, 1, vec![2], 1.0);
        let f = pipeline.add_node(Box::new(ScaleFilter::new(NodeId(2), 2.0)));
        pipeline.connect(f, s, 0, 0).unwrap();
        pipeline.update(f).unwrap();
        assert!(pipeline.get_output(f, 0).unwrap().is_some());

        pipeline.disconnect(f, 0).unwrap();
        pipeline.invalidate(f).unwrap();
        pipeline.update(f).unwrap();
        assert!(!pipeline.is_ready(f).unwrap());
        assert!(pipeline.get_output(f, 0).unwrap().is_none());
    }

    #[test]
    fn configure_rejects_bad_values() {
        let mut scale = ScaleFilter::new(NodeId(1), 1.0);
        assert!(scale.configure(ScaleParams { factor: f32::INFINITY }).is_err());
        scale.configure(ScaleParams { factor: 4.0 }).unwrap();
        assert_eq!(scale.factor(), 4.0);

        let mut threshold = ThresholdFilter::new(NodeId(2), 0.0);
        assert!(threshold.configure(ThresholdParams { level: f32::NAN }).is_err());
    }
}

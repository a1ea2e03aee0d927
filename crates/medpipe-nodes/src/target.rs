//! Terminal item summarizing its input.

use std::any::Any;

use medpipe_core::{ApplyError, NodeId, PipelineItem, PortType, Ports};
use serde::Serialize;
use tracing::debug;

use crate::error::NodeError;
use crate::Configure;

const INPUTS: [PortType; 1] = [PortType::IMAGE];

/// Summary of one volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub count: usize,
}

impl Statistics {
    /// `None` for an empty slice.
    pub fn of(voxels: &[f32]) -> Option<Self> {
        let (&first, rest) = voxels.split_first()?;
        let (mut min, mut max, mut sum) = (first, first, f64::from(first));
        for &v in rest {
            min = min.min(v);
            max = max.max(v);
            sum += f64::from(v);
        }
        Some(Statistics {
            min,
            max,
            mean: sum / voxels.len() as f64,
            count: voxels.len(),
        })
    }
}

/// Records [`Statistics`] of whatever arrives on input 0.
#[derive(Debug, Clone)]
pub struct StatisticsTarget {
    id: NodeId,
    last: Option<Statistics>,
}

impl StatisticsTarget {
    pub fn new(id: NodeId) -> Self {
        StatisticsTarget { id, last: None }
    }

    /// Result of the last successful `apply()`, `None` if the input was
    /// absent.
    pub fn statistics(&self) -> Option<Statistics> {
        self.last
    }
}

impl Configure for StatisticsTarget {
    type Params = serde::de::IgnoredAny;

    fn configure(&mut self, _params: serde::de::IgnoredAny) -> Result<(), NodeError> {
        Ok(())
    }
}

impl PipelineItem for StatisticsTarget {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "statistics"
    }

    fn input_types(&self) -> &[PortType] {
        &INPUTS
    }

    fn output_types(&self) -> &[PortType] {
        &[]
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        self.last = ports.get_input(0)?.and_then(|d| Statistics::of(d.voxels()));
        ports.set_ready(self.last.is_some());
        debug!(id = %self.id, stats = ?self.last, "statistics updated");
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        Box::new(StatisticsTarget::new(id))
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
    use crate::filters::ScaleFilter;
    use crate::source::VolumeSource;
    use medpipe_core::{Dataset, Pipeline};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn mean_lies_between_min_and_max(voxels in prop::collection::vec(-1.0e6f32..1.0e6, 1..64)) {
            let stats = Statistics::of(&voxels).unwrap();
            prop_assert_eq!(stats.count, voxels.len());
            prop_assert!(f64::from(stats.min) <= stats.mean + 1e-6);
            prop_assert!(stats.mean <= f64::from(stats.max) + 1e-6);
        }
    }

    #[test]
    fn statistics_of_slice() {
        let stats = Statistics::of(&[1.0, -2.0, 4.0, 5.0]).unwrap();
        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 5.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.count, 4);
        assert!(Statistics::of(&[]).is_none());
    }

    #[test]
    fn target_summarizes_upstream_result() {
        let mut pipeline = Pipeline::default();
        let volume = Dataset::new(vec![2, 2], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let source = pipeline.add_node(Box::new(VolumeSource::with_volume(NodeId(1), volume)));
        let scale = pipeline.add_node(Box::new(ScaleFilter::new(NodeId(2), 2.0)));
        let sink = pipeline.add_node(Box::new(StatisticsTarget::new(NodeId(3))));
        pipeline.connect(scale, source, 0, 0).unwrap();
        pipeline.connect(sink, scale, 0, 0).unwrap();

        let report = pipeline.update(sink).unwrap();
        assert_eq!(report.apply_count(), 3);

        let stats = pipeline.item::<StatisticsTarget>(sink).unwrap().statistics().unwrap();
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.mean, 3.0);
        assert!(pipeline.is_ready(sink).unwrap());
    }

    #[test]
    fn replaced_volume_flows_through_after_touch() {
        let mut pipeline = Pipeline::default();
        let volume = Dataset::filled(vec![4], 1.0).unwrap();
        let source = pipeline.add_node(Box::new(VolumeSource::with_volume(NodeId(1), volume)));
        let sink = pipeline.add_node(Box::new(StatisticsTarget::new(NodeId(2))));
        pipeline.connect(sink, source, 0, 0).unwrap();
        pipeline.update(sink).unwrap();

        pipeline
            .configure(source, |s: &mut VolumeSource| {
                s.replace(Some(Dataset::filled(vec![4], 7.0).unwrap()))
            })
            .unwrap();
        let report = pipeline.update(sink).unwrap();
        assert_eq!(report.apply_count(), 2);
        let stats = pipeline.item::<StatisticsTarget>(sink).unwrap().statistics().unwrap();
        assert_eq!(stats.min, 7.0);
    }

    #[test]
    fn unconnected_target_is_not_ready() {
        let mut pipeline = Pipeline::default();
        let sink = pipeline.add_node(Box::new(StatisticsTarget::new(NodeId(1))));
        pipeline.update(sink).unwrap();
        assert!(!pipeline.is_ready(sink).unwrap());
        assert!(pipeline.item::<StatisticsTarget>(sink).unwrap().statistics().is_none());
    }
}

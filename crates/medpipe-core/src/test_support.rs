//! Instrumented item used by the unit tests.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::dataset::Dataset;
use crate::error::ApplyError;
use crate::id::NodeId;
use crate::item::PipelineItem;
use crate::port::{PortType, Ports};

/// Shared record of `apply()` calls, in call order.
pub type ApplyLog = Rc<RefCell<Vec<NodeId>>>;

/// Emits `1 + sum of the first voxel of every present input` as a fresh
/// one-voxel dataset on each output.
#[derive(Debug, Clone)]
pub struct Recorder {
    id: NodeId,
    inputs: Vec<PortType>,
    outputs: Vec<PortType>,
    pub fail: bool,
    pub panic: bool,
    pub applies: usize,
    /// First voxel of each input as seen by the last `apply()`.
    pub last_inputs: Vec<Option<f32>>,
    log: ApplyLog,
}

impl Recorder {
    pub fn new(id: u64, inputs: Vec<PortType>, outputs: Vec<PortType>) -> Self {
        Recorder {
            id: NodeId(id),
            inputs,
            outputs,
            fail: false,
            panic: false,
            applies: 0,
            last_inputs: Vec::new(),
            log: ApplyLog::default(),
        }
    }

    pub fn source(id: u64, ty: PortType) -> Self {
        Recorder::new(id, vec![], vec![ty])
    }

    pub fn filter(id: u64, ty: PortType) -> Self {
        Recorder::new(id, vec![ty], vec![ty])
    }

    pub fn target(id: u64, ty: PortType) -> Self {
        Recorder::new(id, vec![ty], vec![])
    }

    pub fn logging(mut self, log: &ApplyLog) -> Self {
        self.log = Rc::clone(log);
        self
    }

    pub fn boxed(self) -> Box<dyn PipelineItem> {
        Box::new(self)
    }
}

impl PipelineItem for Recorder {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &str {
        "recorder"
    }

    fn input_types(&self) -> &[PortType] {
        &self.inputs
    }

    fn output_types(&self) -> &[PortType] {
        &self.outputs
    }

    fn apply(&mut self, ports: &mut Ports) -> Result<(), ApplyError> {
        self.applies += 1;
        self.log.borrow_mut().push(self.id);
        if self.panic {
            panic!("recorder {} panicked", self.id);
        }
        if self.fail {
            return Err("recorder failure".into());
        }

        self.last_inputs.clear();
        for i in 0..ports.fan_in() {
            let first = ports.get_input(i)?.and_then(|d| d.voxels().first().copied());
            self.last_inputs.push(first);
        }
        ports.set_ready(self.last_inputs.iter().all(Option::is_some));

        let value = 1.0 + self.last_inputs.iter().flatten().sum::<f32>();
        for i in 0..ports.fan_out() {
            ports.set_output(Some(Dataset::filled(vec![1], value)?), i)?;
        }
        Ok(())
    }

    fn new_instance(&self, id: NodeId) -> Box<dyn PipelineItem> {
        let mut fresh = Recorder::new(id.0, self.inputs.clone(), self.outputs.clone());
        fresh.log = Rc::clone(&self.log);
        Box::new(fresh)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

//! Prototype registry: builds items by kind name.

use indexmap::IndexMap;
use medpipe_core::{NodeId, PipelineItem};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::NodeError;
use crate::filters::{AddFilter, ScaleFilter, ThresholdFilter};
use crate::source::VolumeSource;
use crate::target::StatisticsTarget;
use crate::Configure;

type ConfigureFn = fn(&mut dyn PipelineItem, &Value) -> Result<(), NodeError>;

struct Entry {
    prototype: Box<dyn PipelineItem>,
    configure: ConfigureFn,
}

/// Registered prototypes, in registration order.
#[derive(Default)]
pub struct NodeRegistry {
    entries: IndexMap<String, Entry>,
}

fn configure_as<T: PipelineItem + Configure>(
    item: &mut dyn PipelineItem,
    params: &Value,
) -> Result<(), NodeError> {
    let kind = item.kind().to_string();
    let item = item
        .as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| NodeError::PrototypeMismatch { kind: kind.clone() })?;
    let params = T::Params::deserialize(params)
        .map_err(|source| NodeError::InvalidParameters { kind, source })?;
    item.configure(params)
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every item this crate ships.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(VolumeSource::new(NodeId(0)));
        registry.insert(ScaleFilter::new(NodeId(0), 1.0));
        registry.insert(ThresholdFilter::new(NodeId(0), 0.0));
        registry.insert(AddFilter::new(NodeId(0)));
        registry.insert(StatisticsTarget::new(NodeId(0)));
        registry
    }

    fn insert<T: PipelineItem + Configure>(&mut self, prototype: T) {
        let kind = prototype.kind().to_string();
        self.entries.insert(
            kind,
            Entry {
                prototype: Box::new(prototype),
                configure: configure_as::<T>,
            },
        );
    }

    /// Registers `prototype` under its `kind()`.
    pub fn register<T: PipelineItem + Configure>(&mut self, prototype: T) -> Result<(), NodeError> {
        if self.entries.contains_key(prototype.kind()) {
            return Err(NodeError::DuplicateKind {
                kind: prototype.kind().to_string(),
            });
        }
        self.insert(prototype);
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn entry(&self, kind: &str) -> Result<&Entry, NodeError> {
        self.entries.get(kind).ok_or_else(|| NodeError::UnknownKind {
            kind: kind.to_string(),
        })
    }

    /// Fresh, unconfigured instance of `kind`.
    pub fn create(&self, kind: &str, id: NodeId) -> Result<Box<dyn PipelineItem>, NodeError> {
        let item = self.entry(kind)?.prototype.new_instance(id);
        debug!(kind, %id, "created item");
        Ok(item)
    }

    /// Fresh instance of `kind` configured from JSON parameters.
    pub fn create_with(
        &self,
        kind: &str,
        id: NodeId,
        params: &Value,
    ) -> Result<Box<dyn PipelineItem>, NodeError> {
        let entry = self.entry(kind)?;
        let mut item = entry.prototype.new_instance(id);
        (entry.configure)(item.as_mut(), params)?;
        debug!(kind, %id, "created configured item");
        Ok(item)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("kinds", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

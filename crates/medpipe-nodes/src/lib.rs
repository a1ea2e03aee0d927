//! Concrete pipeline items and a registry that builds them by kind name.

use serde::de::DeserializeOwned;

pub mod error;
pub mod filters;
pub mod registry;
pub mod source;
pub mod target;

pub use error::NodeError;
pub use filters::{AddFilter, ScaleFilter, ThresholdFilter};
pub use registry::NodeRegistry;
pub use source::VolumeSource;
pub use target::{Statistics, StatisticsTarget};

/// An item whose parameters can be set from serialized form.
pub trait Configure {
    type Params: DeserializeOwned;

    fn configure(&mut self, params: Self::Params) -> Result<(), NodeError>;
}

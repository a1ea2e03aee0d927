//! Reference-counted volume handles exchanged between nodes.
//!
//! The engine only moves [`Dataset`] handles around and compares their
//! identity. Output ports own a strong handle; input ports hold a
//! [`WeakDataset`] that stops resolving as soon as the producer releases its
//! output.

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::error::CoreError;

/// Shape of a volume, fastest-varying axis first.
pub type Shape = SmallVec<[usize; 4]>;

#[derive(Debug, PartialEq)]
struct Volume {
    shape: Shape,
    voxels: Vec<f32>,
}

/// Shared, immutable n-dimensional `f32` array.
#[derive(Clone, PartialEq)]
pub struct Dataset(Arc<Volume>);

/// Non-owning view of a [`Dataset`].
#[derive(Clone, Default)]
pub struct WeakDataset(Weak<Volume>);

impl Dataset {
    /// Builds a dataset, checking that `voxels` holds exactly one value per
    /// cell of `shape`.
    pub fn new(shape: impl Into<Shape>, voxels: Vec<f32>) -> Result<Self, CoreError> {
        let shape = shape.into();
        let expected = element_count(&shape)?;
        if voxels.len() != expected {
            return Err(CoreError::InvalidDataset {
                reason: format!(
                    "shape {:?} needs {} voxels, got {}",
                    shape.as_slice(),
                    expected,
                    voxels.len()
                ),
            });
        }
        Ok(Dataset(Arc::new(Volume { shape, voxels })))
    }

    /// A dataset of the given shape filled with `value`.
    pub fn filled(shape: impl Into<Shape>, value: f32) -> Result<Self, CoreError> {
        let shape = shape.into();
        let len = element_count(&shape)?;
        Dataset::new(shape, vec![value; len])
    }

    pub fn shape(&self) -> &[usize] {
        &self.0.shape
    }

    pub fn voxels(&self) -> &[f32] {
        &self.0.voxels
    }

    pub fn len(&self) -> usize {
        self.0.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.voxels.is_empty()
    }

    /// Builds a new dataset of the same shape by mapping every voxel.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Dataset {
        Dataset(Arc::new(Volume {
            shape: self.0.shape.clone(),
            voxels: self.0.voxels.iter().map(|&v| f(v)).collect(),
        }))
    }

    /// True if both handles refer to the same allocation.
    pub fn ptr_eq(&self, other: &Dataset) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakDataset {
        WeakDataset(Arc::downgrade(&self.0))
    }

    /// Number of strong handles alive, owners and readers included.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl WeakDataset {
    /// Resolves the view, or `None` once every owner dropped the dataset.
    pub fn upgrade(&self) -> Option<Dataset> {
        self.0.upgrade().map(Dataset)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

fn element_count(shape: &[usize]) -> Result<usize, CoreError> {
    if shape.is_empty() {
        return Err(CoreError::InvalidDataset {
            reason: "shape has no axes".into(),
        });
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| CoreError::InvalidDataset {
            reason: format!("shape {:?} overflows", shape),
        })
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("shape", &self.shape())
            .field("len", &self.len())
            .finish()
    }
}

impl fmt::Debug for WeakDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDataset")
            .field("alive", &self.is_alive())
            .finish()
    }
}

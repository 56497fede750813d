//! In-memory volumes, their acquisition parameters and the maps derived from them.

mod acquisition;
mod map;

pub use acquisition::{AcquisitionParameters, Contrast, VolumeSet, WeightedVolume};
pub use map::{DerivedMap, MapKind};

use crate::prelude::{StageError, StageResult};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};

/// Largest per-axis voxel-size difference (mm) still considered the same grid.
pub const SPACING_TOLERANCE: f64 = 1e-6;

/// Spatial placement of a voxel grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Voxel edge lengths in mm along x, y, z.
    pub voxel_size: [f64; 3],
    /// First three rows of the voxel-to-world affine, when the source carried one.
    pub sform: Option<[[f64; 4]; 3]>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::isotropic(1.0)
    }
}

impl Geometry {
    pub fn isotropic(size: f64) -> Self {
        Self {
            voxel_size: [size; 3],
            sform: None,
        }
    }

    pub fn same_spacing(&self, other: &Geometry) -> bool {
        self.voxel_size
            .iter()
            .zip(other.voxel_size.iter())
            .all(|(a, b)| (a - b).abs() <= SPACING_TOLERANCE)
    }
}

/// Real-valued intensities on a voxel grid, optionally with an echo axis.
///
/// Volumes are never mutated: every stage builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: ArrayD<f64>,
    geometry: Geometry,
    echo_axis: Option<usize>,
}

impl Volume {
    pub fn new(data: ArrayD<f64>, geometry: Geometry) -> Self {
        Self {
            data,
            geometry,
            echo_axis: None,
        }
    }

    pub fn with_echo_axis(data: ArrayD<f64>, geometry: Geometry, axis: usize) -> StageResult<Self> {
        if axis >= data.ndim() {
            return Err(StageError::ShapeMismatch(format!(
                "echo axis {} out of range for {}-dimensional data",
                axis,
                data.ndim()
            )));
        }
        Ok(Self {
            data,
            geometry,
            echo_axis: Some(axis),
        })
    }

    /// Constant-intensity volume on a unit-spaced grid.
    pub fn uniform(shape: &[usize], value: f64) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value), Geometry::default())
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    pub fn into_data(self) -> ArrayD<f64> {
        self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn echo_axis(&self) -> Option<usize> {
        self.echo_axis
    }

    pub fn echo_count(&self) -> Option<usize> {
        self.echo_axis.map(|axis| self.data.len_of(Axis(axis)))
    }

    /// Shape of the spatial grid, i.e. the data shape without the echo axis.
    pub fn grid_shape(&self) -> Vec<usize> {
        self.data
            .shape()
            .iter()
            .enumerate()
            .filter(|(axis, _)| Some(*axis) != self.echo_axis)
            .map(|(_, &len)| len)
            .collect()
    }

    /// New echo-free volume on this volume's geometry.
    pub fn derive(&self, data: ArrayD<f64>) -> Volume {
        Volume::new(data, self.geometry.clone())
    }

    /// Fails unless the echo axis has already been collapsed.
    pub fn ensure_resolved(&self, what: &str) -> StageResult<()> {
        match self.echo_count() {
            None => Ok(()),
            Some(echoes) => Err(StageError::ShapeMismatch(format!(
                "{} still carries an unresolved echo axis ({} echoes)",
                what, echoes
            ))),
        }
    }

    pub fn ensure_same_grid(&self, other: &Volume, what: &str) -> StageResult<()> {
        let (mine, theirs) = (self.grid_shape(), other.grid_shape());
        if mine != theirs {
            return Err(StageError::ShapeMismatch(format!(
                "{}: grid {:?} does not match {:?}",
                what, mine, theirs
            )));
        }
        if !self.geometry.same_spacing(&other.geometry) {
            return Err(StageError::ShapeMismatch(format!(
                "{}: voxel size {:?} does not match {:?}",
                what, self.geometry.voxel_size, other.geometry.voxel_size
            )));
        }
        Ok(())
    }
}

//! Core data types shared across the pipeline
//!
//! This module contains the value types that flow between the simulation,
//! the stage graph and the view targets:
//!
//! - [`Vec3`], [`Bounds`] and [`ScalarRange`] - geometry and scalar extents
//! - [`Rgba`] and [`ColorStop`] - transfer function building blocks
//! - [`CameraOverrides`] and [`Camera`] - per-step camera steering
//! - [`PartitionedDataset`] and [`DataDescription`] - the per-step input contract

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A point or direction in 3D space.
pub type Vec3 = [f64; 3];

/// Component-wise `a + s * b`.
#[inline]
pub fn add_scaled(a: Vec3, s: f64, b: Vec3) -> Vec3 {
    [a[0] + s * b[0], a[1] + s * b[1], a[2] + s * b[2]]
}

/// Component-wise negation.
#[inline]
pub fn negate(v: Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

/// Returns the vector only when none of its coordinates is NaN.
///
/// NaN marks "no override" in the camera steering vectors supplied by the
/// simulation.
#[inline]
pub fn non_nan(v: Vec3) -> Option<Vec3> {
    if v.iter().any(|c| c.is_nan()) {
        None
    } else {
        Some(v)
    }
}

/// Axis-aligned bounding box laid out as `[xmin, xmax, ymin, ymax, zmin, zmax]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub [f64; 6]);

impl Bounds {
    /// Inverted box that acts as the identity for [`Bounds::union`] and for
    /// MIN/MAX reductions. A partition with no geometry reports this.
    pub const EMPTY: Bounds = Bounds([
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    ]);

    pub fn new(bounds: [f64; 6]) -> Self {
        Self(bounds)
    }

    /// Whether every axis has `min <= max`.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|axis| self.0[2 * axis] <= self.0[2 * axis + 1])
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = self.0;
        for axis in 0..3 {
            out[2 * axis] = out[2 * axis].min(other.0[2 * axis]);
            out[2 * axis + 1] = out[2 * axis + 1].max(other.0[2 * axis + 1]);
        }
        Bounds(out)
    }

    /// Lower corners `[xmin, ymin, zmin]`.
    pub fn mins(&self) -> [f64; 3] {
        [self.0[0], self.0[2], self.0[4]]
    }

    /// Upper corners `[xmax, ymax, zmax]`.
    pub fn maxs(&self) -> [f64; 3] {
        [self.0[1], self.0[3], self.0[5]]
    }

    pub fn from_corners(mins: [f64; 3], maxs: [f64; 3]) -> Self {
        Self([mins[0], maxs[0], mins[1], maxs[1], mins[2], maxs[2]])
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Closed scalar interval used for color mapping and contour diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarRange {
    pub low: f64,
    pub high: f64,
}

impl ScalarRange {
    /// Identity for [`ScalarRange::union`].
    pub const EMPTY: ScalarRange = ScalarRange {
        low: f64::INFINITY,
        high: f64::NEG_INFINITY,
    };

    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn is_valid(&self) -> bool {
        self.low <= self.high
    }

    pub fn union(&self, other: &ScalarRange) -> ScalarRange {
        ScalarRange {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

impl Default for ScalarRange {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

/// One control point of a transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Normalized scalar position of the stop
    pub position: f32,
    pub color: Rgba,
}

impl ColorStop {
    pub fn new(position: f32, color: [u8; 4]) -> Self {
        Self {
            position,
            color: Rgba(color),
        }
    }
}

/// Camera steering vectors supplied by the simulation for one step.
///
/// Each vector may contain NaN, meaning "leave this camera component alone".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraOverrides {
    pub eye: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    pub background: Vec3,
}

impl CameraOverrides {
    /// No overrides at all.
    pub const NONE: CameraOverrides = CameraOverrides {
        eye: [f64::NAN; 3],
        focal_point: [f64::NAN; 3],
        view_up: [f64::NAN; 3],
        background: [f64::NAN; 3],
    };
}

impl Default for CameraOverrides {
    fn default() -> Self {
        Self::NONE
    }
}

/// Camera state of a view target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub focal_point: Vec3,
    pub view_up: Vec3,
    pub background: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 1.0],
            focal_point: [0.0, 0.0, 0.0],
            view_up: [0.0, 1.0, 0.0],
            background: [0.32, 0.34, 0.43],
        }
    }
}

/// Simulation time and step index of the current co-processing call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    pub time: f64,
    pub step: u64,
}

impl StepInfo {
    pub fn new(time: f64, step: u64) -> Self {
        Self { time, step }
    }
}

/// Per-partition dataset handed over by the simulation each time step.
///
/// The mesh and field storage are owned by the simulation and only reach the
/// stage backend; the core reads the metadata below.
pub trait PartitionedDataset: Send + Sync + 'static {
    /// Names of the fields carried by the dataset, indexed by field number.
    fn field_names(&self) -> &[String];

    /// Contour thresholds, read once at initialization.
    fn isovalues(&self) -> &[f64];

    /// Camera steering for this step.
    fn camera_overrides(&self) -> CameraOverrides;

    /// Whether diagnostics (global bounds, contour range, camera) are wanted.
    fn print_metadata(&self) -> bool;

    /// Prefix of rendered image file names.
    fn filename_prefix(&self) -> &str;
}

/// The description of one co-processing request.
#[derive(Debug)]
pub struct DataDescription<D> {
    pub time: f64,
    pub step: u64,
    /// The partition's dataset, absent when the simulation has nothing to hand over.
    pub dataset: Option<Arc<D>>,
    /// Set by `request_data_description`: every field must be provided.
    pub all_fields: bool,
    /// Set by `request_data_description`: the mesh must be generated.
    pub generate_mesh: bool,
}

impl<D> DataDescription<D> {
    pub fn new(time: f64, step: u64, dataset: Arc<D>) -> Self {
        Self {
            time,
            step,
            dataset: Some(dataset),
            all_fields: false,
            generate_mesh: false,
        }
    }

    pub fn empty(time: f64, step: u64) -> Self {
        Self {
            time,
            step,
            dataset: None,
            all_fields: false,
            generate_mesh: false,
        }
    }

    pub fn step_info(&self) -> StepInfo {
        StepInfo::new(self.time, self.step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_nan() {
        assert_eq!(non_nan([1.0, 2.0, 3.0]), Some([1.0, 2.0, 3.0]));
        assert_eq!(non_nan([1.0, f64::NAN, 3.0]), None);
        assert_eq!(non_nan([f64::NAN; 3]), None);
    }

    #[test]
    fn test_bounds_union() {
        let a = Bounds::new([0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let b = Bounds::new([-1.0, 0.5, 0.0, 2.0, 0.5, 0.7]);
        assert_eq!(a.union(&b).0, [-1.0, 1.0, 0.0, 2.0, 0.0, 1.0]);
        assert_eq!(Bounds::EMPTY.union(&a), a);
        assert!(!Bounds::EMPTY.is_valid());
    }

    #[test]
    fn test_bounds_corners() {
        let b = Bounds::from_corners([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]);
        assert_eq!(b.0, [0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(b.mins(), [0.0, 1.0, 2.0]);
        assert_eq!(b.maxs(), [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_scalar_range() {
        assert!(ScalarRange::new(5.0, 10.0).is_valid());
        assert!(!ScalarRange::new(10.0, 5.0).is_valid());
        let r = ScalarRange::EMPTY.union(&ScalarRange::new(-2.0, 3.0));
        assert_eq!(r, ScalarRange::new(-2.0, 3.0));
    }

    #[test]
    fn test_vector_helpers() {
        assert_eq!(add_scaled([1.0, 2.0, 3.0], 2.0, [0.0, 1.0, 0.0]), [1.0, 4.0, 3.0]);
        assert_eq!(negate([1.0, -2.0, 0.5]), [-1.0, 2.0, -0.5]);
    }
}

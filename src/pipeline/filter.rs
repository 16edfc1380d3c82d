//! Contracts of the external filter, render and writer collaborators.
//!
//! Every stage wraps one backend filter. Instead of recovering behaviour by
//! down-casting an opaque client object, each stage kind exposes a
//! capability trait, chosen when the backend creates the stage:
//!
//! ```text
//! Filter ─┬─ ProducerCapable   (data hand-over from the simulation)
//!         ├─ ClipCapable       (one clip plane)
//!         ├─ ColorCapable ─┬─ ContourCapable (iso-surfaces)
//!         │                └─ SliceCapable   (parallel slices)
//!         └─ WriterCapable     (intermediate dumps)
//! ```
//!
//! Setters taking an `Option` restore the backend's default value on `None`.

use crate::pipeline::color::ColorPalette;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::id::ProxyId;
use crate::pipeline::slab::ClipPlane;
use crate::pipeline::view::ViewTarget;
use crate::types::{PartitionedDataset, ScalarRange, Vec3};
use std::path::Path;
use std::sync::Arc;

/// Behaviour shared by every backend filter.
pub trait Filter: Send {
    /// Backend-side identity, used to wire inputs and attach to views.
    fn proxy(&self) -> ProxyId;

    /// Connect input `port` to the output of `upstream`.
    fn set_input(&mut self, port: usize, upstream: ProxyId) -> PipelineResult<()>;

    /// Bring the filter output up to date for simulation time `time`.
    fn update_to_time(&mut self, time: f64) -> PipelineResult<()>;
}

/// The stage that hands the simulation dataset to the rest of the graph.
pub trait ProducerCapable<D>: Filter {
    /// Point the producer at a new dataset. No recomputation happens here.
    fn set_output(&mut self, dataset: Arc<D>, time: f64);
}

/// One crinkle clip bounded by a single plane.
pub trait ClipCapable: Filter {
    fn set_plane(&mut self, plane: Option<&ClipPlane>) -> PipelineResult<()>;
}

/// Stages whose output is colored by a dataset field.
pub trait ColorCapable: Filter {
    fn set_color_field(&mut self, field: Option<usize>) -> PipelineResult<()>;
    fn set_color_palette(&mut self, palette: Option<&ColorPalette>) -> PipelineResult<()>;
    fn set_color_range(&mut self, range: Option<ScalarRange>) -> PipelineResult<()>;
}

/// Iso-surface extraction.
pub trait ContourCapable: ColorCapable {
    fn set_contour_field(&mut self, field: Option<usize>) -> PipelineResult<()>;
    fn set_isovalues(&mut self, values: &[f64]) -> PipelineResult<()>;

    /// Local value range of the extracted surfaces.
    fn range(&self) -> ScalarRange;
}

/// A family of parallel slice planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePlanes {
    pub origin: Vec3,
    pub normal: Vec3,
    pub count: u32,
    pub spacing: f64,
}

impl Default for SlicePlanes {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            count: 1,
            spacing: 0.0,
        }
    }
}

/// Parallel slicing.
pub trait SliceCapable: ColorCapable {
    fn set_planes(&mut self, planes: &SlicePlanes) -> PipelineResult<()>;
}

/// On-disk dump of an upstream output.
pub trait WriterCapable: Filter {
    fn set_file_name(&mut self, path: &str) -> PipelineResult<()>;
}

/// Format of an intermediate dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    /// Producer output converted to an unstructured grid (`.vtu`).
    UnstructuredGrid,
    /// Contour output converted to poly data (`.vtp`).
    PolyData,
}

impl DumpFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DumpFormat::UnstructuredGrid => "vtu",
            DumpFormat::PolyData => "vtp",
        }
    }
}

/// Factory for everything the pipeline needs from the visualization backend.
///
/// The orchestrator calls it only during initialization.
pub trait StageBackend {
    type Dataset: PartitionedDataset;

    fn create_producer(
        &mut self,
        name: &str,
    ) -> PipelineResult<Box<dyn ProducerCapable<Self::Dataset>>>;

    fn create_clip(&mut self, name: &str) -> PipelineResult<Box<dyn ClipCapable>>;

    fn create_contour(&mut self, name: &str) -> PipelineResult<Box<dyn ContourCapable>>;

    fn create_slice(&mut self, name: &str) -> PipelineResult<Box<dyn SliceCapable>>;

    fn create_writer(
        &mut self,
        name: &str,
        format: DumpFormat,
    ) -> PipelineResult<Box<dyn WriterCapable>>;

    fn create_view(&mut self, name: &str) -> PipelineResult<Box<dyn ViewTarget>>;

    /// Load the static overlay geometry and return its proxy.
    fn load_reference_geometry(&mut self, path: &Path) -> PipelineResult<ProxyId>;
}

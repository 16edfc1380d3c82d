//! Color mapping for the two logical branches.
//!
//! Branch 1 is the pair of contour stages of the slab pipeline, branch 2 is
//! the slice stage. Palette, range and color-field edits on branch 1 always
//! reach both contour stages as one edit: if either stage rejects it, both
//! keep what they had, so the twin stages never render with mismatched maps.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph::StageGraph;
use crate::pipeline::id::StageId;
use crate::pipeline::stage::StageSetting;
use crate::types::{ColorStop, Rgba, ScalarRange};

/// Logical branch selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// Both contour stages of the slab pipeline.
    Contours,
    /// The slice stage.
    Slice,
}

impl Branch {
    /// Position of this branch in per-branch arrays.
    pub fn index(&self) -> usize {
        match self {
            Branch::Contours => 0,
            Branch::Slice => 1,
        }
    }
}

impl TryFrom<u8> for Branch {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Branch::Contours),
            2 => Ok(Branch::Slice),
            other => Err(PipelineError::UnknownBranch(other)),
        }
    }
}

/// An ordered transfer function.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    stops: Vec<ColorStop>,
}

impl ColorPalette {
    /// Build a palette. Stops must be non-empty with finite, non-decreasing positions.
    pub fn new(stops: Vec<ColorStop>) -> PipelineResult<Self> {
        if stops.is_empty() {
            return Err(PipelineError::InvalidPalette("no color stops".to_string()));
        }
        if stops.iter().any(|s| !s.position.is_finite()) {
            return Err(PipelineError::InvalidPalette(
                "non-finite stop position".to_string(),
            ));
        }
        if stops.windows(2).any(|w| w[1].position < w[0].position) {
            return Err(PipelineError::InvalidPalette(
                "stop positions must be non-decreasing".to_string(),
            ));
        }
        Ok(Self { stops })
    }

    /// Build a palette from a flat RGBA byte buffer and matching positions.
    pub fn from_parts(rgba: &[u8], positions: &[f32]) -> PipelineResult<Self> {
        if rgba.len() != positions.len() * 4 {
            return Err(PipelineError::InvalidPalette(format!(
                "{} color bytes for {} positions",
                rgba.len(),
                positions.len()
            )));
        }
        let stops = rgba
            .chunks_exact(4)
            .zip(positions)
            .map(|(c, &position)| ColorStop {
                position,
                color: Rgba([c[0], c[1], c[2], c[3]]),
            })
            .collect();
        Self::new(stops)
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct BranchState {
    palette: Option<ColorPalette>,
    range: Option<ScalarRange>,
    color_field: Option<usize>,
}

/// Applies palette, range and field selections to the stages of one branch.
pub struct ColorMappingController {
    contours: [StageId; 2],
    slice: StageId,
    field_count: usize,
    branches: [BranchState; 2],
    contour_field: Option<usize>,
}

impl ColorMappingController {
    /// `field_count` is the number of fields of the incoming dataset.
    pub fn new(contours: [StageId; 2], slice: StageId, field_count: usize) -> Self {
        Self {
            contours,
            slice,
            field_count,
            branches: [BranchState::default(), BranchState::default()],
            contour_field: None,
        }
    }

    fn stages(&self, branch: Branch) -> Vec<StageId> {
        match branch {
            Branch::Contours => self.contours.to_vec(),
            Branch::Slice => vec![self.slice],
        }
    }

    fn check_field(&self, index: usize) -> PipelineResult<()> {
        if index >= self.field_count {
            return Err(PipelineError::FieldOutOfBounds {
                index,
                available: self.field_count,
            });
        }
        Ok(())
    }

    fn apply_all<D>(
        graph: &mut StageGraph<D>,
        ids: &[StageId],
        setting: StageSetting,
    ) -> PipelineResult<()> {
        let edits: Vec<_> = ids.iter().map(|&id| (id, setting.clone())).collect();
        graph.apply_settings(&edits)
    }

    /// Replace the branch's transfer function on every stage of the branch.
    pub fn set_palette<D>(
        &mut self,
        graph: &mut StageGraph<D>,
        branch: Branch,
        palette: ColorPalette,
    ) -> PipelineResult<()> {
        let ids = self.stages(branch);
        Self::apply_all(graph, &ids, StageSetting::ColorPalette(palette.clone()))?;
        tracing::debug!("Branch {:?} palette set ({} stops)", branch, palette.len());
        self.branches[branch.index()].palette = Some(palette);
        Ok(())
    }

    /// Set the scalar-to-color domain. Rejected when `low > high`.
    pub fn set_range<D>(
        &mut self,
        graph: &mut StageGraph<D>,
        branch: Branch,
        low: f64,
        high: f64,
    ) -> PipelineResult<()> {
        let range = ScalarRange::new(low, high);
        if !range.is_valid() {
            return Err(PipelineError::InvalidRange { low, high });
        }
        let ids = self.stages(branch);
        Self::apply_all(graph, &ids, StageSetting::ColorRange(range))?;
        tracing::debug!("Branch {:?} color range [{}, {}]", branch, low, high);
        self.branches[branch.index()].range = Some(range);
        Ok(())
    }

    /// Select the field that drives coloring of a branch.
    pub fn set_color_field<D>(
        &mut self,
        graph: &mut StageGraph<D>,
        branch: Branch,
        field: usize,
    ) -> PipelineResult<()> {
        self.check_field(field)?;
        let ids = self.stages(branch);
        Self::apply_all(graph, &ids, StageSetting::ColorField(field))?;
        self.branches[branch.index()].color_field = Some(field);
        Ok(())
    }

    /// Select the contour field; always applies to both contour stages.
    pub fn set_contour_field<D>(
        &mut self,
        graph: &mut StageGraph<D>,
        field: usize,
    ) -> PipelineResult<()> {
        self.check_field(field)?;
        Self::apply_all(graph, &self.contours, StageSetting::ContourField(field))?;
        self.contour_field = Some(field);
        Ok(())
    }

    pub fn palette(&self, branch: Branch) -> Option<&ColorPalette> {
        self.branches[branch.index()].palette.as_ref()
    }

    pub fn range(&self, branch: Branch) -> Option<ScalarRange> {
        self.branches[branch.index()].range
    }

    pub fn color_field(&self, branch: Branch) -> Option<usize> {
        self.branches[branch.index()].color_field
    }

    pub fn contour_field(&self) -> Option<usize> {
        self.contour_field
    }
}

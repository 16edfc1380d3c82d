//! View targets: the render surfaces the pipeline draws into.
//!
//! A [`ViewSet`] owns every view of the pipeline. Per step each selected view
//! gets its time set, its camera optionally reset, the simulation's camera
//! overrides applied, and one PNG written.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::DumpFormat;
use crate::pipeline::id::{ProxyId, ViewId};
use crate::types::{non_nan, Bounds, Camera, CameraOverrides, StepInfo, Vec3};
use std::path::{Path, PathBuf};

/// Camera and render surface of one view (external collaborator).
pub trait ViewTarget: Send {
    /// Render the output of `proxy` in this view, shifted along the stacking axis.
    fn add_representation(&mut self, proxy: ProxyId, vertical_offset: f64) -> PipelineResult<()>;

    fn set_time(&mut self, time: f64);
    fn reset_camera(&mut self);
    fn camera(&self) -> Camera;
    fn set_camera_position(&mut self, eye: Vec3);
    fn set_focal_point(&mut self, focal_point: Vec3);
    fn set_view_up(&mut self, view_up: Vec3);
    fn set_background(&mut self, color: Vec3);

    fn resize(&mut self, width: u32, height: u32) -> PipelineResult<()>;

    /// Specular lighting of every representation in the view.
    fn set_specular(&mut self, coefficient: f64, power: f64) -> PipelineResult<()>;

    /// Local bounding box of everything rendered in the view.
    fn bounds(&self) -> Bounds;

    fn write_image(&mut self, path: &Path, magnification: u32, quality: u32) -> PipelineResult<()>;
}

/// Which views are rendered each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewSelection {
    #[default]
    All,
    Only(ViewId),
}

impl ViewSelection {
    pub fn includes(&self, view: ViewId) -> bool {
        match self {
            ViewSelection::All => true,
            ViewSelection::Only(only) => *only == view,
        }
    }
}

/// Image output settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSettings {
    pub magnification: u32,
    pub quality: u32,
    pub reset_camera: bool,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            magnification: 1,
            quality: 100,
            reset_camera: true,
        }
    }
}

/// Image file name for `step`.
///
/// The `-v<index>` suffix only appears when the pipeline has more than one view.
pub fn image_file_name(prefix: &str, step: u64, view: ViewId, view_count: usize) -> String {
    if view_count > 1 {
        format!("{}{:04}-v{}.png", prefix, step, view.0)
    } else {
        format!("{}{:04}.png", prefix, step)
    }
}

/// Dump file name: `file_name` up to its last `.`, then `_<time>.<ext>`.
pub fn dump_file_name(file_name: &str, time: f64, format: DumpFormat) -> String {
    let stem = match file_name.rfind('.') {
        Some(dot) => &file_name[..dot],
        None => file_name,
    };
    format!("{}_{:.3}.{}", stem, time, format.extension())
}

/// Apply the step's camera overrides. A vector with any NaN coordinate is skipped.
pub fn apply_camera_overrides(target: &mut dyn ViewTarget, overrides: &CameraOverrides) {
    if let Some(eye) = non_nan(overrides.eye) {
        target.set_camera_position(eye);
    }
    if let Some(focal_point) = non_nan(overrides.focal_point) {
        target.set_focal_point(focal_point);
    }
    if let Some(view_up) = non_nan(overrides.view_up) {
        target.set_view_up(view_up);
    }
    if let Some(background) = non_nan(overrides.background) {
        target.set_background(background);
    }
}

/// Result of rendering one view.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedView {
    pub view: ViewId,
    pub path: PathBuf,
    /// Camera after overrides were applied.
    pub camera: Camera,
}

/// All views of the pipeline, indexed by [`ViewId`].
#[derive(Default)]
pub struct ViewSet {
    views: Vec<Box<dyn ViewTarget>>,
    selection: ViewSelection,
}

impl ViewSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, target: Box<dyn ViewTarget>) -> ViewId {
        let id = ViewId(self.views.len() as u32);
        self.views.push(target);
        id
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, view: ViewId) -> PipelineResult<&dyn ViewTarget> {
        self.views
            .get(view.index())
            .map(|v| v.as_ref())
            .ok_or(PipelineError::UnknownView(view))
    }

    pub fn get_mut(&mut self, view: ViewId) -> PipelineResult<&mut dyn ViewTarget> {
        match self.views.get_mut(view.index()) {
            Some(v) => Ok(v.as_mut()),
            None => Err(PipelineError::UnknownView(view)),
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = ViewId> {
        (0..self.views.len() as u32).map(ViewId)
    }

    pub fn selection(&self) -> ViewSelection {
        self.selection
    }

    /// Change which views are rendered. An unknown view is rejected.
    pub fn select(&mut self, selection: ViewSelection) -> PipelineResult<()> {
        if let ViewSelection::Only(view) = selection {
            self.get(view)?;
        }
        self.selection = selection;
        Ok(())
    }

    /// Resize every view.
    pub fn resize(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        for (i, view) in self.views.iter_mut().enumerate() {
            view.resize(width, height).map_err(|e| PipelineError::View {
                view: ViewId(i as u32),
                message: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Render every selected view for `step` and write its image.
    ///
    /// A failing view does not stop the others; each gets its own result.
    pub fn render_step(
        &mut self,
        step: StepInfo,
        overrides: &CameraOverrides,
        prefix: &str,
        settings: &ImageSettings,
    ) -> Vec<(ViewId, PipelineResult<RenderedView>)> {
        let view_count = self.views.len();
        let selection = self.selection;
        let mut results = Vec::new();

        for (i, target) in self.views.iter_mut().enumerate() {
            let view = ViewId(i as u32);
            if !selection.includes(view) {
                continue;
            }

            target.set_time(step.time);
            if settings.reset_camera {
                target.reset_camera();
            }
            apply_camera_overrides(target.as_mut(), overrides);

            let path = PathBuf::from(image_file_name(prefix, step.step, view, view_count));
            tracing::debug!("Saving {} (view {})", path.display(), i);
            let result = target
                .write_image(&path, settings.magnification, settings.quality)
                .map(|()| RenderedView {
                    view,
                    path,
                    camera: target.camera(),
                })
                .map_err(|e| PipelineError::View {
                    view,
                    message: e.to_string(),
                });
            results.push((view, result));
        }

        results
    }
}

//! Top-level driver of the in-situ pipeline.
//!
//! The orchestrator builds the stage graph and the two views once, from the
//! first data description, then runs the update protocol for every
//! co-processing call:
//!
//! 1. point the producer at the step's dataset (no recomputation)
//! 2. notify the live link of `(time, step)`
//! 3. apply queued steering commands
//! 4. update every stage in topological order
//! 5. reduce and log diagnostics when the dataset asks for them
//! 6. render the selected views and write one image each
//! 7. notify the live link of post-processing, then wait while paused
//!
//! A resume while paused repeats steps 2-7 for the same time; the dataset is
//! not fetched again.

use crate::config::{self, PipelineConfig};
use crate::pipeline::color::{Branch, ColorMappingController, ColorPalette};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{SlicePlanes, StageBackend};
use crate::pipeline::graph::{SlabPipelineBuilder, SlabStageIds, StageGraph, UpdateReport};
use crate::pipeline::id::{ProxyId, StageId, ViewId};
use crate::pipeline::live_link::{LinkState, LiveLinkController, StepEnd, WaitOutcome};
use crate::pipeline::reducer::{Communicator, DistributedReducer};
use crate::pipeline::slab::{SlabGeometryComputer, SlabPlanes};
use crate::pipeline::stage::StageSetting;
use crate::pipeline::steering::{self, SteeringCommand, SteeringHandle};
use crate::pipeline::view::{dump_file_name, ViewSelection, ViewSet};
use crate::types::{Bounds, DataDescription, PartitionedDataset, ScalarRange, Vec3};
use crossbeam_channel::Receiver;
use std::path::PathBuf;

/// View hosting both contour stages and the reference geometry.
pub const CONTOUR_VIEW: &str = "RenderView1";
/// View hosting the slice stage.
pub const SLICE_VIEW: &str = "RenderView2";

/// Reduced diagnostics of one step. Global on the root partition, local elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    /// Bounding box of each view, indexed by view.
    pub view_bounds: Vec<Bounds>,
    /// Value range over both contour stages.
    pub contour_range: ScalarRange,
}

/// Outcome of one co-processing call.
#[derive(Debug)]
pub struct StepReport {
    pub time: f64,
    pub step: u64,
    /// Passes through the update protocol; more than one after a resume.
    pub passes: u32,
    /// Stage updates of the last pass.
    pub update: UpdateReport,
    /// Images written in the last pass.
    pub images: Vec<PathBuf>,
    /// Views that failed to render in the last pass.
    pub failed_views: Vec<ViewId>,
    pub diagnostics: Option<Diagnostics>,
}

impl StepReport {
    fn new(time: f64, step: u64) -> Self {
        Self {
            time,
            step,
            passes: 0,
            update: UpdateReport::default(),
            images: Vec::new(),
            failed_views: Vec::new(),
            diagnostics: None,
        }
    }
}

/// Everything built at initialization.
struct Pipeline<D> {
    graph: StageGraph<D>,
    ids: SlabStageIds,
    colors: ColorMappingController,
    views: ViewSet,
    clip_planes: Option<SlabPlanes>,
    slice_planes: SlicePlanes,
}

fn proxy_of<D>(graph: &StageGraph<D>, id: StageId) -> PipelineResult<ProxyId> {
    graph
        .stage(id)
        .map(|s| s.proxy())
        .ok_or(PipelineError::NotUpdated { stage_id: id })
}

impl<D> Pipeline<D> {
    fn set_clip_planes(&mut self, origin: Vec3, normal: Vec3, pitch: f64) -> PipelineResult<()> {
        let planes = SlabGeometryComputer::compute(origin, normal, pitch)?;
        let edits: Vec<_> = self
            .ids
            .clips
            .iter()
            .zip(planes.as_array())
            .map(|(&id, plane)| (id, StageSetting::ClipPlane(plane)))
            .collect();
        self.graph.apply_settings(&edits)?;

        tracing::debug!("Clip planes set: origin {:?}, normal {:?}, pitch {}", origin, normal, pitch);
        self.clip_planes = Some(planes);
        Ok(())
    }

    fn set_slice_planes(&mut self, planes: SlicePlanes) -> PipelineResult<()> {
        if planes.count == 0 {
            return Err(PipelineError::InvalidSlice("at least one plane required".to_string()));
        }
        if !planes.spacing.is_finite() || planes.spacing < 0.0 {
            return Err(PipelineError::InvalidSlice(format!(
                "invalid spacing {}",
                planes.spacing
            )));
        }
        if planes.normal.iter().all(|c| *c == 0.0) || planes.normal.iter().any(|c| !c.is_finite()) {
            return Err(PipelineError::InvalidSlice(format!(
                "invalid normal {:?}",
                planes.normal
            )));
        }

        let slice = self.ids.slice;
        self.graph.modify(slice, |s| s.set_slice_planes(&planes))?;
        self.slice_planes = planes;
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Configuration(format!(
                "invalid resolution {}x{}",
                width, height
            )));
        }
        self.views.resize(width, height)
    }

    fn set_specular_lighting(&mut self, coefficient: f64, power: f64, view: ViewId) -> PipelineResult<()> {
        self.views.get_mut(view)?.set_specular(coefficient, power)
    }

    fn apply(&mut self, cmd: SteeringCommand) -> PipelineResult<()> {
        match cmd {
            SteeringCommand::SetPalette { branch, palette } => {
                self.colors.set_palette(&mut self.graph, branch, palette)
            }
            SteeringCommand::SetRange { branch, low, high } => {
                self.colors.set_range(&mut self.graph, branch, low, high)
            }
            SteeringCommand::SetColorField { branch, field } => {
                self.colors.set_color_field(&mut self.graph, branch, field)
            }
            SteeringCommand::SetContourField(field) => {
                self.colors.set_contour_field(&mut self.graph, field)
            }
            SteeringCommand::SetClipPlanes {
                origin,
                normal,
                pitch,
            } => self.set_clip_planes(origin, normal, pitch),
            SteeringCommand::SetSlicePlanes(planes) => self.set_slice_planes(planes),
            SteeringCommand::SetResolution { width, height } => self.set_resolution(width, height),
            SteeringCommand::SetSpecular {
                coefficient,
                power,
                view,
            } => self.set_specular_lighting(coefficient, power, view),
            SteeringCommand::SetViewToCoProcess(selection) => self.views.select(selection),
        }
    }

    /// Reduce the bounds of every view, then the contour range.
    ///
    /// Every partition issues the same reductions in the same order, whether
    /// or not its own stages updated.
    fn diagnostics(&self, reducer: &mut DistributedReducer) -> PipelineResult<Diagnostics> {
        let mut view_bounds = Vec::with_capacity(self.views.len());
        for id in self.views.ids() {
            let local = self.views.get(id)?.bounds();
            view_bounds.push(reducer.reduce_bounds(local)?);
        }

        let mut local = ScalarRange::EMPTY;
        for id in self.ids.contours {
            match self.graph.stage(id).map(|s| s.contour_range()) {
                Some(Ok(range)) => local = local.union(&range),
                Some(Err(e)) => tracing::debug!("No contour range: {}", e),
                None => {}
            }
        }
        let contour_range = reducer.reduce_range(local)?;

        if reducer.is_root() {
            for (i, bounds) in view_bounds.iter().enumerate() {
                tracing::info!("world bounds (view {}): {:?}", i, bounds.0);
            }
            tracing::info!("range: {}--{}", contour_range.low, contour_range.high);
        }

        Ok(Diagnostics {
            view_bounds,
            contour_range,
        })
    }
}

/// Drives the stage graph, the views and the live link for one partition.
pub struct PipelineOrchestrator<B: StageBackend> {
    backend: B,
    config: PipelineConfig,
    link: LiveLinkController,
    reducer: DistributedReducer,
    steering: Option<Receiver<SteeringCommand>>,
    pipeline: Option<Pipeline<B::Dataset>>,
}

impl<B: StageBackend> PipelineOrchestrator<B> {
    pub fn new(
        backend: B,
        link: LiveLinkController,
        comm: Box<dyn Communicator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            config,
            link,
            reducer: DistributedReducer::new(comm),
            steering: None,
            pipeline: None,
        }
    }

    /// Create the steering channel. Commands are applied once per pass.
    pub fn steering_handle(&mut self) -> SteeringHandle {
        let (handle, cmd_rx) = SteeringHandle::new();
        self.steering = Some(cmd_rx);
        handle
    }

    /// Drain steering commands from a channel created elsewhere.
    pub fn attach_steering(&mut self, cmd_rx: Receiver<SteeringCommand>) {
        self.steering = Some(cmd_rx);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn reducer(&self) -> &DistributedReducer {
        &self.reducer
    }

    pub fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn stage_graph(&self) -> Option<&StageGraph<B::Dataset>> {
        self.pipeline.as_ref().map(|p| &p.graph)
    }

    pub fn stage_ids(&self) -> Option<SlabStageIds> {
        self.pipeline.as_ref().map(|p| p.ids)
    }

    pub fn color_mapping(&self) -> Option<&ColorMappingController> {
        self.pipeline.as_ref().map(|p| &p.colors)
    }

    pub fn clip_planes(&self) -> Option<SlabPlanes> {
        self.pipeline.as_ref().and_then(|p| p.clip_planes)
    }

    pub fn slice_planes(&self) -> Option<SlicePlanes> {
        self.pipeline.as_ref().map(|p| p.slice_planes)
    }

    pub fn view_count(&self) -> usize {
        self.pipeline.as_ref().map(|p| p.views.len()).unwrap_or(0)
    }

    fn pipeline_mut(&mut self) -> PipelineResult<&mut Pipeline<B::Dataset>> {
        self.pipeline.as_mut().ok_or(PipelineError::NotInitialized)
    }

    /// Tell the simulation what to provide. Returns false, leaving the
    /// description untouched, when there is no description or no output
    /// file name.
    pub fn request_data_description(
        &self,
        description: Option<&mut DataDescription<B::Dataset>>,
    ) -> bool {
        let Some(description) = description else {
            tracing::warn!("No data description given");
            return false;
        };
        if self.config.output.file_name.is_empty() {
            tracing::warn!("No output file name given to output results to");
            return false;
        }
        description.all_fields = true;
        description.generate_mesh = true;
        true
    }

    /// Build the stage graph and views from the first description.
    ///
    /// Fails if any stage or view cannot be created. A live link that cannot
    /// connect only degrades the run to headless.
    pub fn initialize(&mut self, description: &DataDescription<B::Dataset>) -> PipelineResult<()> {
        if self.pipeline.is_some() {
            return Err(PipelineError::Configuration("already initialized".to_string()));
        }
        let dataset = description.dataset.as_ref().ok_or_else(|| {
            PipelineError::Configuration("no dataset to initialize from".to_string())
        })?;

        if self.config.link.enabled && self.link.state() == LinkState::Uninitialized {
            if let Err(e) = self.link.connect(&self.config.link.endpoint()) {
                tracing::warn!("{}; running without a viewer", e);
            }
        }

        let (mut graph, ids) = SlabPipelineBuilder::new(dataset.isovalues())
            .with_mesh_dump(self.config.output.write_mesh_dump)
            .with_contour_dump(self.config.output.write_contour_dump)
            .build(&mut self.backend)?;

        let render = &self.config.render;
        let mut views = ViewSet::new();
        let contour_view = views.add(self.backend.create_view(CONTOUR_VIEW)?);
        let slice_view = views.add(self.backend.create_view(SLICE_VIEW)?);

        {
            let view = views.get_mut(contour_view)?;
            view.add_representation(proxy_of(&graph, ids.contours[0])?, 0.0)?;
            view.add_representation(proxy_of(&graph, ids.contours[1])?, render.contour_stack_offset)?;
        }
        if render.reference_geometry {
            let path = config::reference_geometry_path();
            match self.backend.load_reference_geometry(&path) {
                Ok(proxy) => views.get_mut(contour_view)?.add_representation(proxy, 0.0)?,
                Err(e) => tracing::warn!("Reference geometry {} unavailable: {}", path.display(), e),
            }
        }
        views
            .get_mut(slice_view)?
            .add_representation(proxy_of(&graph, ids.slice)?, 0.0)?;

        views.resize(render.width, render.height)?;
        for view in [contour_view, slice_view] {
            views
                .get_mut(view)?
                .set_specular(render.specular_coefficient, render.specular_power)?;
        }

        let fields = &self.config.fields;
        let mut colors =
            ColorMappingController::new(ids.contours, ids.slice, dataset.field_names().len());
        if let Err(e) = colors.set_contour_field(&mut graph, fields.contour_field) {
            tracing::warn!("Initial contour field not applied: {}", e);
        }
        for branch in [Branch::Contours, Branch::Slice] {
            if let Err(e) = colors.set_color_field(&mut graph, branch, fields.color_field) {
                tracing::warn!("Initial color field of {:?} not applied: {}", branch, e);
            }
        }

        tracing::info!(
            "Pipeline initialized: {} stages, {} views, link {:?}",
            graph.len(),
            views.len(),
            self.link.state()
        );

        self.pipeline = Some(Pipeline {
            graph,
            ids,
            colors,
            views,
            clip_planes: None,
            slice_planes: SlicePlanes::default(),
        });
        Ok(())
    }

    /// Run the update protocol for one time step.
    ///
    /// Returns once the step is released back to the simulation, which may be
    /// after several passes if the viewer paused and resumed.
    pub fn co_process(
        &mut self,
        description: &DataDescription<B::Dataset>,
    ) -> PipelineResult<StepReport> {
        let step = description.step_info();
        let Some(dataset) = description.dataset.clone() else {
            tracing::warn!("No dataset for step {}, skipping", step.step);
            return Err(PipelineError::Configuration(format!(
                "no dataset for step {}",
                step.step
            )));
        };
        let pipeline = self.pipeline.as_mut().ok_or(PipelineError::NotInitialized)?;

        pipeline
            .graph
            .refresh_producer(pipeline.ids.producer, dataset.clone(), step.time)?;
        for (writer, format) in pipeline.ids.writers() {
            let path = dump_file_name(&self.config.output.file_name, step.time, format);
            if let Err(e) = pipeline.graph.modify(writer, |s| s.set_file_name(&path)) {
                tracing::warn!("Dump file name not set: {}", e);
            }
        }

        let print_metadata = dataset.print_metadata();
        let overrides = dataset.camera_overrides();
        let image_settings = self.config.image_settings();
        let mut report = StepReport::new(step.time, step.step);

        loop {
            report.passes += 1;
            self.link.begin_step(step);

            if let Some(cmd_rx) = &self.steering {
                for cmd in steering::drain(cmd_rx) {
                    if let Err(e) = pipeline.apply(cmd) {
                        tracing::warn!("Steering command rejected: {}", e);
                    }
                }
            }

            report.update = pipeline.graph.update_all(step.time)?;

            if print_metadata {
                report.diagnostics = Some(pipeline.diagnostics(&mut self.reducer)?);
            }

            report.images.clear();
            report.failed_views.clear();
            let rendered = pipeline.views.render_step(
                step,
                &overrides,
                dataset.filename_prefix(),
                &image_settings,
            );
            for (view, result) in rendered {
                match result {
                    Ok(image) => {
                        if print_metadata && self.reducer.is_root() {
                            let camera = image.camera;
                            tracing::info!(
                                "camera (view {}): position {:?}, focal point {:?}, view up {:?}",
                                view.0,
                                camera.position,
                                camera.focal_point,
                                camera.view_up
                            );
                        }
                        report.images.push(image.path);
                    }
                    Err(e) => {
                        tracing::warn!("{}", e);
                        report.failed_views.push(view);
                    }
                }
            }

            match self.link.end_step(step) {
                StepEnd::Done => break,
                StepEnd::Paused => match self.link.wait() {
                    WaitOutcome::Resumed => continue,
                    WaitOutcome::Released => break,
                },
            }
        }

        tracing::debug!(
            "Step {} (t={}) done in {} pass(es), {} images",
            step.step,
            step.time,
            report.passes,
            report.images.len()
        );
        Ok(report)
    }

    // ── Parameter setters ──

    pub fn set_color_table(&mut self, branch: Branch, palette: ColorPalette) -> PipelineResult<()> {
        let p = self.pipeline_mut()?;
        p.colors.set_palette(&mut p.graph, branch, palette)
    }

    pub fn set_color_range(&mut self, branch: Branch, low: f64, high: f64) -> PipelineResult<()> {
        let p = self.pipeline_mut()?;
        p.colors.set_range(&mut p.graph, branch, low, high)
    }

    pub fn set_color_field(&mut self, branch: Branch, field: usize) -> PipelineResult<()> {
        let p = self.pipeline_mut()?;
        p.colors.set_color_field(&mut p.graph, branch, field)
    }

    pub fn set_contour_field(&mut self, field: usize) -> PipelineResult<()> {
        let p = self.pipeline_mut()?;
        p.colors.set_contour_field(&mut p.graph, field)
    }

    /// Derive the four slab planes and push them to Clip1..Clip4.
    pub fn set_clip_planes(&mut self, origin: Vec3, normal: Vec3, pitch: f64) -> PipelineResult<()> {
        self.pipeline_mut()?.set_clip_planes(origin, normal, pitch)
    }

    pub fn set_slice_planes(
        &mut self,
        origin: Vec3,
        normal: Vec3,
        count: u32,
        spacing: f64,
    ) -> PipelineResult<()> {
        self.pipeline_mut()?.set_slice_planes(SlicePlanes {
            origin,
            normal,
            count,
            spacing,
        })
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        self.pipeline_mut()?.set_resolution(width, height)
    }

    pub fn set_specular_lighting(&mut self, coefficient: f64, power: f64, view: ViewId) -> PipelineResult<()> {
        self.pipeline_mut()?.set_specular_lighting(coefficient, power, view)
    }

    /// Render every view, or only one. Image suffixes do not change.
    pub fn set_view_to_coprocess(&mut self, selection: ViewSelection) -> PipelineResult<()> {
        self.pipeline_mut()?.views.select(selection)
    }
}

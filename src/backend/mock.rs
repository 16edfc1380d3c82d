//! In-memory stage backend for dry runs and tests
//!
//! Every filter, view and live link created here appends what it is asked to
//! do to a shared [`CallLog`], so tests can assert on call order without a
//! real visualization backend.
//!
//! # Features
//!
//! - **Recording filters**: one [`MockFilter`] type implements every stage capability
//! - **Dataset-driven diagnostics**: views and contours report the bounds and
//!   range of the [`MockDataset`] last handed to the producer
//! - **Failure injection**: stage creation, stage updates, parameter edits and
//!   image writes can be made to fail
//! - **Scripted viewer**: [`ScriptedLink`] pauses at chosen steps and can queue
//!   steering commands while paused
//!
//! # Enabling
//!
//! The mock backend is compiled for tests and when the `mock-backend` feature
//! is enabled (on by default).

use crate::pipeline::color::ColorPalette;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{
    ClipCapable, ColorCapable, ContourCapable, DumpFormat, Filter, ProducerCapable, SliceCapable,
    SlicePlanes, StageBackend, WriterCapable,
};
use crate::pipeline::id::ProxyId;
use crate::pipeline::live_link::{LinkEndpoint, LiveLink};
use crate::pipeline::slab::ClipPlane;
use crate::pipeline::steering::{SteeringCommand, SteeringHandle};
use crate::pipeline::view::ViewTarget;
use crate::types::{Bounds, Camera, CameraOverrides, PartitionedDataset, ScalarRange, Vec3};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

// ==================== Dataset ====================

/// Field names of a typical compressible flow solution
const DEFAULT_FIELDS: [&str; 9] = [
    "density",
    "velocity-x",
    "velocity-y",
    "velocity-z",
    "pressure",
    "vorticity-x",
    "vorticity-y",
    "vorticity-z",
    "vorticity-magnitude",
];

/// One partition's dataset
#[derive(Debug, Clone)]
pub struct MockDataset {
    pub field_names: Vec<String>,
    pub isovalues: Vec<f64>,
    pub camera: CameraOverrides,
    pub print_metadata: bool,
    pub prefix: String,
    /// Local bounds reported by every view rendering this partition
    pub bounds: Bounds,
    /// Local value range of the contour surfaces
    pub contour_range: ScalarRange,
}

impl Default for MockDataset {
    fn default() -> Self {
        Self {
            field_names: DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect(),
            isovalues: vec![0.5],
            camera: CameraOverrides::NONE,
            print_metadata: false,
            prefix: "pyfr_".to_string(),
            bounds: Bounds::new([0.0, 1.0, 0.0, 1.0, 0.0, 1.0]),
            contour_range: ScalarRange::new(0.0, 1.0),
        }
    }
}

impl MockDataset {
    pub fn with_bounds(mut self, bounds: [f64; 6]) -> Self {
        self.bounds = Bounds::new(bounds);
        self
    }

    pub fn with_contour_range(mut self, low: f64, high: f64) -> Self {
        self.contour_range = ScalarRange::new(low, high);
        self
    }

    pub fn with_isovalues(mut self, isovalues: Vec<f64>) -> Self {
        self.isovalues = isovalues;
        self
    }

    pub fn with_camera(mut self, camera: CameraOverrides) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_print_metadata(mut self, enabled: bool) -> Self {
        self.print_metadata = enabled;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_field_count(mut self, count: usize) -> Self {
        self.field_names = (0..count).map(|i| format!("field{}", i)).collect();
        self
    }
}

impl PartitionedDataset for MockDataset {
    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn isovalues(&self) -> &[f64] {
        &self.isovalues
    }

    fn camera_overrides(&self) -> CameraOverrides {
        self.camera
    }

    fn print_metadata(&self) -> bool {
        self.print_metadata
    }

    fn filename_prefix(&self) -> &str {
        &self.prefix
    }
}

// ==================== Call Log ====================

/// Something the pipeline asked the backend to do
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Create { name: String, proxy: ProxyId },
    SetInput { name: String, port: usize, upstream: ProxyId },
    SetOutput { name: String, time: f64 },
    SetParameter { name: String, parameter: &'static str },
    ResetParameter { name: String, parameter: &'static str },
    Update { name: String, time: f64 },
    WriteDump { name: String, path: String },
    LoadReference { path: PathBuf },
    AddRepresentation { view: String, proxy: ProxyId, offset: f64 },
    SetViewTime { view: String, time: f64 },
    ResetCamera { view: String },
    Resize { view: String, width: u32, height: u32 },
    SetSpecular { view: String, coefficient: f64, power: f64 },
    WriteImage { view: String, path: PathBuf },
    LinkInitialize { endpoint: String },
    LinkUpdate { time: f64, step: u64 },
    LinkPostProcess { time: f64, step: u64 },
    LinkWait { released: bool },
}

/// Shared, append-only record of backend calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<BackendCall>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<BackendCall>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, call: BackendCall) {
        self.lock().push(call);
    }

    pub fn snapshot(&self) -> Vec<BackendCall> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Names of updated stages, in call order
    pub fn updated_stages(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Update { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Paths of written images, in call order
    pub fn written_images(&self) -> Vec<PathBuf> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::WriteImage { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }
}

type SharedDataset = Arc<Mutex<Option<Arc<MockDataset>>>>;
type FailureSet = Arc<Mutex<HashSet<String>>>;

fn contains(set: &FailureSet, name: &str) -> bool {
    set.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .contains(name)
}

fn current(dataset: &SharedDataset) -> Option<Arc<MockDataset>> {
    dataset
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// State shared by everything one backend creates
#[derive(Clone, Default)]
struct MockContext {
    log: CallLog,
    dataset: SharedDataset,
    failing: FailureSet,
    rejecting: FailureSet,
}

// ==================== Filters ====================

/// A recording filter usable as any stage kind
pub struct MockFilter {
    name: String,
    proxy: ProxyId,
    file_name: Option<String>,
    ctx: MockContext,
}

impl MockFilter {
    fn parameter(&self, parameter: &'static str) -> PipelineResult<()> {
        self.edit(parameter, true)
    }

    /// Record a set (`present`) or a reset to the default
    fn edit(&self, parameter: &'static str, present: bool) -> PipelineResult<()> {
        if contains(&self.ctx.rejecting, &self.name) {
            return Err(PipelineError::Backend(format!(
                "{} rejected {}",
                self.name, parameter
            )));
        }
        let name = self.name.clone();
        self.ctx.log.push(if present {
            BackendCall::SetParameter { name, parameter }
        } else {
            BackendCall::ResetParameter { name, parameter }
        });
        Ok(())
    }
}

impl Filter for MockFilter {
    fn proxy(&self) -> ProxyId {
        self.proxy
    }

    fn set_input(&mut self, port: usize, upstream: ProxyId) -> PipelineResult<()> {
        self.ctx.log.push(BackendCall::SetInput {
            name: self.name.clone(),
            port,
            upstream,
        });
        Ok(())
    }

    fn update_to_time(&mut self, time: f64) -> PipelineResult<()> {
        if contains(&self.ctx.failing, &self.name) {
            return Err(PipelineError::Backend(format!(
                "{} failed to update",
                self.name
            )));
        }
        self.ctx.log.push(BackendCall::Update {
            name: self.name.clone(),
            time,
        });
        if let Some(path) = &self.file_name {
            self.ctx.log.push(BackendCall::WriteDump {
                name: self.name.clone(),
                path: path.clone(),
            });
        }
        Ok(())
    }
}

impl ProducerCapable<MockDataset> for MockFilter {
    fn set_output(&mut self, dataset: Arc<MockDataset>, time: f64) {
        *self
            .ctx
            .dataset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(dataset);
        self.ctx.log.push(BackendCall::SetOutput {
            name: self.name.clone(),
            time,
        });
    }
}

impl ClipCapable for MockFilter {
    fn set_plane(&mut self, plane: Option<&ClipPlane>) -> PipelineResult<()> {
        self.edit("ClipPlane", plane.is_some())
    }
}

impl ColorCapable for MockFilter {
    fn set_color_field(&mut self, field: Option<usize>) -> PipelineResult<()> {
        self.edit("ColorField", field.is_some())
    }

    fn set_color_palette(&mut self, palette: Option<&ColorPalette>) -> PipelineResult<()> {
        self.edit("ColorPalette", palette.is_some())
    }

    fn set_color_range(&mut self, range: Option<ScalarRange>) -> PipelineResult<()> {
        self.edit("ColorRange", range.is_some())
    }
}

impl ContourCapable for MockFilter {
    fn set_contour_field(&mut self, field: Option<usize>) -> PipelineResult<()> {
        self.edit("ContourField", field.is_some())
    }

    fn set_isovalues(&mut self, _values: &[f64]) -> PipelineResult<()> {
        self.parameter("ContourValues")
    }

    fn range(&self) -> ScalarRange {
        current(&self.ctx.dataset)
            .map(|d| d.contour_range)
            .unwrap_or(ScalarRange::EMPTY)
    }
}

impl SliceCapable for MockFilter {
    fn set_planes(&mut self, _planes: &SlicePlanes) -> PipelineResult<()> {
        self.parameter("SlicePlanes")
    }
}

impl WriterCapable for MockFilter {
    fn set_file_name(&mut self, path: &str) -> PipelineResult<()> {
        self.parameter("FileName")?;
        self.file_name = Some(path.to_string());
        Ok(())
    }
}

// ==================== Views ====================

/// A recording render view
pub struct MockView {
    name: String,
    camera: Camera,
    representations: Vec<(ProxyId, f64)>,
    ctx: MockContext,
}

impl MockView {
    /// A standalone view with no dataset attached
    pub fn new(name: impl Into<String>, log: CallLog) -> Self {
        Self::with_context(
            name.into(),
            MockContext {
                log,
                ..MockContext::default()
            },
        )
    }

    fn with_context(name: String, ctx: MockContext) -> Self {
        Self {
            name,
            camera: Camera::default(),
            representations: Vec::new(),
            ctx,
        }
    }

    fn record(&self, call: BackendCall) {
        self.ctx.log.push(call);
    }
}

impl ViewTarget for MockView {
    fn add_representation(&mut self, proxy: ProxyId, vertical_offset: f64) -> PipelineResult<()> {
        self.representations.push((proxy, vertical_offset));
        self.record(BackendCall::AddRepresentation {
            view: self.name.clone(),
            proxy,
            offset: vertical_offset,
        });
        Ok(())
    }

    fn set_time(&mut self, time: f64) {
        self.record(BackendCall::SetViewTime {
            view: self.name.clone(),
            time,
        });
    }

    fn reset_camera(&mut self) {
        let background = self.camera.background;
        self.camera = Camera {
            background,
            ..Camera::default()
        };
        self.record(BackendCall::ResetCamera {
            view: self.name.clone(),
        });
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn set_camera_position(&mut self, eye: Vec3) {
        self.camera.position = eye;
    }

    fn set_focal_point(&mut self, focal_point: Vec3) {
        self.camera.focal_point = focal_point;
    }

    fn set_view_up(&mut self, view_up: Vec3) {
        self.camera.view_up = view_up;
    }

    fn set_background(&mut self, color: Vec3) {
        self.camera.background = color;
    }

    fn resize(&mut self, width: u32, height: u32) -> PipelineResult<()> {
        self.record(BackendCall::Resize {
            view: self.name.clone(),
            width,
            height,
        });
        Ok(())
    }

    fn set_specular(&mut self, coefficient: f64, power: f64) -> PipelineResult<()> {
        self.record(BackendCall::SetSpecular {
            view: self.name.clone(),
            coefficient,
            power,
        });
        Ok(())
    }

    fn bounds(&self) -> Bounds {
        if self.representations.is_empty() {
            return Bounds::EMPTY;
        }
        current(&self.ctx.dataset)
            .map(|d| d.bounds)
            .unwrap_or(Bounds::EMPTY)
    }

    fn write_image(&mut self, path: &Path, _magnification: u32, _quality: u32) -> PipelineResult<()> {
        if contains(&self.ctx.failing, &self.name) {
            return Err(PipelineError::Backend(format!(
                "{} could not write {}",
                self.name,
                path.display()
            )));
        }
        self.record(BackendCall::WriteImage {
            view: self.name.clone(),
            path: path.to_path_buf(),
        });
        Ok(())
    }
}

// ==================== Backend ====================

/// Backend creating recording filters and views
pub struct MockBackend {
    ctx: MockContext,
    next_proxy: u64,
    failing_creation: HashSet<String>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            ctx: MockContext::default(),
            next_proxy: 1,
            failing_creation: HashSet::new(),
        }
    }

    /// Handle to the call log, valid after the backend moves into an orchestrator
    pub fn log(&self) -> CallLog {
        self.ctx.log.clone()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.ctx.log.snapshot()
    }

    pub fn clear_calls(&self) {
        self.ctx.log.clear();
    }

    /// Make every update of stage `name` fail
    pub fn fail_updates_of(&self, name: &str) {
        self.ctx
            .failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string());
    }

    /// Make every parameter edit of stage `name` fail
    pub fn fail_parameters_of(&self, name: &str) {
        self.ctx
            .rejecting
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string());
    }

    /// Make image writes of view `name` fail
    pub fn fail_images_of(&self, name: &str) {
        self.fail_updates_of(name);
    }

    /// Make creation of stage or view `name` fail
    pub fn fail_creation_of(mut self, name: &str) -> Self {
        self.failing_creation.insert(name.to_string());
        self
    }

    fn allocate(&mut self, name: &str) -> PipelineResult<ProxyId> {
        if self.failing_creation.contains(name) {
            return Err(PipelineError::Backend(format!("cannot create {}", name)));
        }
        let proxy = ProxyId(self.next_proxy);
        self.next_proxy += 1;
        self.ctx.log.push(BackendCall::Create {
            name: name.to_string(),
            proxy,
        });
        Ok(proxy)
    }

    fn filter(&mut self, name: &str) -> PipelineResult<MockFilter> {
        Ok(MockFilter {
            name: name.to_string(),
            proxy: self.allocate(name)?,
            file_name: None,
            ctx: self.ctx.clone(),
        })
    }
}

impl StageBackend for MockBackend {
    type Dataset = MockDataset;

    fn create_producer(
        &mut self,
        name: &str,
    ) -> PipelineResult<Box<dyn ProducerCapable<MockDataset>>> {
        Ok(Box::new(self.filter(name)?))
    }

    fn create_clip(&mut self, name: &str) -> PipelineResult<Box<dyn ClipCapable>> {
        Ok(Box::new(self.filter(name)?))
    }

    fn create_contour(&mut self, name: &str) -> PipelineResult<Box<dyn ContourCapable>> {
        Ok(Box::new(self.filter(name)?))
    }

    fn create_slice(&mut self, name: &str) -> PipelineResult<Box<dyn SliceCapable>> {
        Ok(Box::new(self.filter(name)?))
    }

    fn create_writer(
        &mut self,
        name: &str,
        _format: DumpFormat,
    ) -> PipelineResult<Box<dyn WriterCapable>> {
        Ok(Box::new(self.filter(name)?))
    }

    fn create_view(&mut self, name: &str) -> PipelineResult<Box<dyn ViewTarget>> {
        self.allocate(name)?;
        Ok(Box::new(MockView::with_context(
            name.to_string(),
            self.ctx.clone(),
        )))
    }

    fn load_reference_geometry(&mut self, path: &Path) -> PipelineResult<ProxyId> {
        let proxy = self.allocate("ReferenceGeometry")?;
        self.ctx.log.push(BackendCall::LoadReference {
            path: path.to_path_buf(),
        });
        Ok(proxy)
    }
}

// ==================== Live Link ====================

/// A viewer that pauses at chosen steps
///
/// A step registered with [`ScriptedLink::pause_at`] reports a pause after
/// each pass; the first `resumes` waits ask for a repeat, the next one
/// releases the step.
pub struct ScriptedLink {
    log: CallLog,
    pauses: HashMap<u64, usize>,
    current_step: Option<u64>,
    refuse_connection: bool,
    steering: Option<(SteeringHandle, Vec<SteeringCommand>)>,
}

impl ScriptedLink {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            pauses: HashMap::new(),
            current_step: None,
            refuse_connection: false,
            steering: None,
        }
    }

    pub fn pause_at(mut self, step: u64, resumes: usize) -> Self {
        self.pauses.insert(step, resumes);
        self
    }

    pub fn refuse_connection(mut self) -> Self {
        self.refuse_connection = true;
        self
    }

    /// Queue `commands` on `handle` during the first wait
    pub fn steer_while_paused(mut self, handle: SteeringHandle, commands: Vec<SteeringCommand>) -> Self {
        self.steering = Some((handle, commands));
        self
    }
}

impl LiveLink for ScriptedLink {
    fn initialize(&mut self, endpoint: &LinkEndpoint) -> PipelineResult<()> {
        if self.refuse_connection {
            return Err(PipelineError::Link(format!("{} refused connection", endpoint)));
        }
        self.log.push(BackendCall::LinkInitialize {
            endpoint: endpoint.to_string(),
        });
        Ok(())
    }

    fn update(&mut self, time: f64, step: u64) -> PipelineResult<()> {
        self.current_step = Some(step);
        self.log.push(BackendCall::LinkUpdate { time, step });
        Ok(())
    }

    fn post_process(&mut self, time: f64, step: u64) -> PipelineResult<()> {
        self.log.push(BackendCall::LinkPostProcess { time, step });
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.current_step
            .map(|step| self.pauses.contains_key(&step))
            .unwrap_or(false)
    }

    fn wait_for_resume(&mut self) -> PipelineResult<bool> {
        if let Some((handle, commands)) = self.steering.take() {
            for cmd in commands {
                handle.send_command(cmd);
            }
        }

        let Some(step) = self.current_step else {
            return Ok(true);
        };
        let released = match self.pauses.get_mut(&step) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            _ => {
                self.pauses.remove(&step);
                true
            }
        };
        self.log.push(BackendCall::LinkWait { released });
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_bounds_follow_dataset() {
        let mut backend = MockBackend::new();
        let mut producer = backend.create_producer("Source").unwrap();
        let mut view = backend.create_view("RenderView1").unwrap();
        assert_eq!(view.bounds(), Bounds::EMPTY);

        view.add_representation(producer.proxy(), 0.0).unwrap();
        let dataset = MockDataset::default().with_bounds([0.0, 2.0, 0.0, 1.0, 0.0, 1.0]);
        producer.set_output(Arc::new(dataset), 1.0);
        assert_eq!(view.bounds().0, [0.0, 2.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_injected_update_failure() {
        let mut backend = MockBackend::new();
        let mut clip = backend.create_clip("Clip1").unwrap();
        backend.fail_updates_of("Clip1");
        assert!(matches!(clip.update_to_time(1.0), Err(PipelineError::Backend(_))));
        assert!(backend.log().updated_stages().is_empty());
    }

    #[test]
    fn test_injected_parameter_failure() {
        let mut backend = MockBackend::new();
        let mut contour = backend.create_contour("Contour2").unwrap();
        backend.fail_parameters_of("Contour2");
        assert!(contour.set_color_range(Some(ScalarRange::new(0.0, 1.0))).is_err());
        assert!(contour.set_contour_field(None).is_err());
        assert!(contour.update_to_time(1.0).is_ok());
    }

    #[test]
    fn test_creation_failure() {
        let mut backend = MockBackend::new().fail_creation_of("Slice");
        assert!(backend.create_slice("Slice").is_err());
        assert!(backend.create_slice("Other").is_ok());
    }

    #[test]
    fn test_scripted_link_repeats_then_releases() {
        let log = CallLog::default();
        let mut link = ScriptedLink::new(log.clone()).pause_at(3, 1);

        link.update(3.0, 3).unwrap();
        assert!(link.is_paused());
        assert!(!link.wait_for_resume().unwrap());
        assert!(link.is_paused());
        assert!(link.wait_for_resume().unwrap());
        assert!(!link.is_paused());

        link.update(4.0, 4).unwrap();
        assert!(!link.is_paused());
    }
}

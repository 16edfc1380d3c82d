//! Stage abstraction for the pipeline.
//!
//! A stage is one node of the fixed stage graph. It owns the typed handle of
//! its backend filter ([`StageHandle`]), remembers its upstream stages by id
//! (never owning them) and records every parameter it has pushed to the
//! backend so the current configuration can be inspected.
//!
//! Settings that several stages must share (clip planes, color mapping,
//! contour field) go through [`StageSetting`]. A stage keeps the last one of
//! each kind it accepted, so an edit spanning several stages can put every
//! stage back to exactly what it had before.
//!
//! `StageHandle` uses enum dispatch over the capability traits, so
//! stage-specific behaviour is selected by variant rather than by down-casting.

use crate::pipeline::color::ColorPalette;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{
    ClipCapable, ContourCapable, ProducerCapable, SliceCapable, SlicePlanes, WriterCapable,
};
use crate::pipeline::id::{ProxyId, StageId};
use crate::pipeline::slab::ClipPlane;
use crate::types::{ScalarRange, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Maximum number of upstream stages a stage may read from.
pub const MAX_UPSTREAMS: usize = 2;

/// The kinds of stage the graph knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Producer,
    ClipSlab,
    Contour,
    Slice,
    Writer,
}

impl StageKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Producer => "Producer",
            StageKind::ClipSlab => "ClipSlab",
            StageKind::Contour => "Contour",
            StageKind::Slice => "Slice",
            StageKind::Writer => "Writer",
        }
    }

    /// Whether this kind has an input port at all.
    pub fn has_input(&self) -> bool {
        !matches!(self, StageKind::Producer)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A recorded stage parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Vector(Vec3),
    List(Vec<f64>),
    Text(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match self {
            ParamValue::Vector(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            ParamValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Kinds of [`StageSetting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ClipPlane,
    ColorField,
    ColorPalette,
    ColorRange,
    ContourField,
}

/// A parameter value edited on several stages as one unit.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSetting {
    ClipPlane(ClipPlane),
    ColorField(usize),
    ColorPalette(ColorPalette),
    ColorRange(ScalarRange),
    ContourField(usize),
}

impl StageSetting {
    pub fn key(&self) -> SettingKey {
        match self {
            StageSetting::ClipPlane(_) => SettingKey::ClipPlane,
            StageSetting::ColorField(_) => SettingKey::ColorField,
            StageSetting::ColorPalette(_) => SettingKey::ColorPalette,
            StageSetting::ColorRange(_) => SettingKey::ColorRange,
            StageSetting::ContourField(_) => SettingKey::ContourField,
        }
    }
}

/// Typed handle of a stage's backend filter.
pub enum StageHandle<D> {
    Producer(Box<dyn ProducerCapable<D>>),
    Clip(Box<dyn ClipCapable>),
    Contour(Box<dyn ContourCapable>),
    Slice(Box<dyn SliceCapable>),
    Writer(Box<dyn WriterCapable>),
}

impl<D> StageHandle<D> {
    pub fn kind(&self) -> StageKind {
        match self {
            StageHandle::Producer(_) => StageKind::Producer,
            StageHandle::Clip(_) => StageKind::ClipSlab,
            StageHandle::Contour(_) => StageKind::Contour,
            StageHandle::Slice(_) => StageKind::Slice,
            StageHandle::Writer(_) => StageKind::Writer,
        }
    }

    pub fn proxy(&self) -> ProxyId {
        match self {
            StageHandle::Producer(f) => f.proxy(),
            StageHandle::Clip(f) => f.proxy(),
            StageHandle::Contour(f) => f.proxy(),
            StageHandle::Slice(f) => f.proxy(),
            StageHandle::Writer(f) => f.proxy(),
        }
    }

    pub fn set_input(&mut self, port: usize, upstream: ProxyId) -> PipelineResult<()> {
        match self {
            StageHandle::Producer(f) => f.set_input(port, upstream),
            StageHandle::Clip(f) => f.set_input(port, upstream),
            StageHandle::Contour(f) => f.set_input(port, upstream),
            StageHandle::Slice(f) => f.set_input(port, upstream),
            StageHandle::Writer(f) => f.set_input(port, upstream),
        }
    }

    pub fn update_to_time(&mut self, time: f64) -> PipelineResult<()> {
        match self {
            StageHandle::Producer(f) => f.update_to_time(time),
            StageHandle::Clip(f) => f.update_to_time(time),
            StageHandle::Contour(f) => f.update_to_time(time),
            StageHandle::Slice(f) => f.update_to_time(time),
            StageHandle::Writer(f) => f.update_to_time(time),
        }
    }
}

/// One node of the stage graph.
pub struct Stage<D> {
    id: StageId,
    name: String,
    handle: StageHandle<D>,
    upstream: Vec<StageId>,
    parameters: BTreeMap<&'static str, ParamValue>,
    /// Last accepted value of each shared setting.
    applied: HashMap<SettingKey, StageSetting>,
    /// Graph clock value of the last parameter edit (or data refresh for the producer).
    pub(crate) modified_at: u64,
    /// Graph clock value of the last completed recomputation.
    pub(crate) computed_at: Option<u64>,
    last_updated_time: Option<f64>,
}

impl<D> Stage<D> {
    pub(crate) fn new(
        id: StageId,
        name: impl Into<String>,
        handle: StageHandle<D>,
        upstream: Vec<StageId>,
        modified_at: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            handle,
            upstream,
            parameters: BTreeMap::new(),
            applied: HashMap::new(),
            modified_at,
            computed_at: None,
            last_updated_time: None,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.handle.kind()
    }

    pub fn proxy(&self) -> ProxyId {
        self.handle.proxy()
    }

    pub fn upstream(&self) -> &[StageId] {
        &self.upstream
    }

    /// Simulation time of the last completed update, `None` before the first one.
    pub fn last_updated_time(&self) -> Option<f64> {
        self.last_updated_time
    }

    pub fn parameter(&self, key: &str) -> Option<&ParamValue> {
        self.parameters.get(key)
    }

    pub fn parameters(&self) -> &BTreeMap<&'static str, ParamValue> {
        &self.parameters
    }

    pub(crate) fn record(&mut self, key: &'static str, value: ParamValue) {
        self.parameters.insert(key, value);
    }

    fn forget(&mut self, keys: &[&'static str]) {
        for key in keys {
            self.parameters.remove(key);
        }
    }

    /// Last value of `key` this stage accepted, `None` if it still has the
    /// backend default.
    pub fn applied(&self, key: SettingKey) -> Option<&StageSetting> {
        self.applied.get(&key)
    }

    /// Push a shared setting to the backend filter.
    pub(crate) fn apply(&mut self, setting: &StageSetting) -> PipelineResult<()> {
        match setting {
            StageSetting::ClipPlane(plane) => self.set_clip_plane(Some(plane))?,
            StageSetting::ColorField(field) => self.set_color_field(Some(*field))?,
            StageSetting::ColorPalette(palette) => self.set_color_palette(Some(palette))?,
            StageSetting::ColorRange(range) => self.set_color_range(Some(*range))?,
            StageSetting::ContourField(field) => self.set_contour_field(Some(*field))?,
        }
        self.applied.insert(setting.key(), setting.clone());
        Ok(())
    }

    /// Put `key` back to `previous`, or to the backend default when `None`.
    pub(crate) fn restore(
        &mut self,
        key: SettingKey,
        previous: Option<&StageSetting>,
    ) -> PipelineResult<()> {
        if let Some(setting) = previous {
            return self.apply(setting);
        }
        match key {
            SettingKey::ClipPlane => self.set_clip_plane(None)?,
            SettingKey::ColorField => self.set_color_field(None)?,
            SettingKey::ColorPalette => self.set_color_palette(None)?,
            SettingKey::ColorRange => self.set_color_range(None)?,
            SettingKey::ContourField => self.set_contour_field(None)?,
        }
        self.applied.remove(&key);
        Ok(())
    }

    pub(crate) fn handle_mut(&mut self) -> &mut StageHandle<D> {
        &mut self.handle
    }

    pub(crate) fn mark_updated(&mut self, clock: u64, time: f64) {
        self.computed_at = Some(clock);
        self.last_updated_time = Some(time);
    }

    fn wrong_kind(&self, expected: &'static str) -> PipelineError {
        PipelineError::WrongKind {
            stage_id: self.id,
            expected,
            actual: self.kind().display_name(),
        }
    }

    // ── Producer ──

    pub(crate) fn set_dataset(&mut self, dataset: Arc<D>, time: f64) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Producer(p) => {
                p.set_output(dataset, time);
                Ok(())
            }
            _ => Err(self.wrong_kind("Producer")),
        }
    }

    // ── Clip ──

    fn set_clip_plane(&mut self, plane: Option<&ClipPlane>) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Clip(c) => c.set_plane(plane)?,
            _ => return Err(self.wrong_kind("ClipSlab")),
        }
        match plane {
            Some(plane) => {
                self.record("Origin", ParamValue::Vector(plane.origin));
                self.record("Normal", ParamValue::Vector(plane.normal));
            }
            None => self.forget(&["Origin", "Normal"]),
        }
        Ok(())
    }

    // ── Color (contour and slice) ──

    fn set_color_field(&mut self, field: Option<usize>) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Contour(c) => c.set_color_field(field)?,
            StageHandle::Slice(s) => s.set_color_field(field)?,
            _ => return Err(self.wrong_kind("Contour or Slice")),
        }
        match field {
            Some(field) => self.record("ColorField", ParamValue::Int(field as i64)),
            None => self.forget(&["ColorField"]),
        }
        Ok(())
    }

    fn set_color_palette(&mut self, palette: Option<&ColorPalette>) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Contour(c) => c.set_color_palette(palette)?,
            StageHandle::Slice(s) => s.set_color_palette(palette)?,
            _ => return Err(self.wrong_kind("Contour or Slice")),
        }
        match palette {
            Some(palette) => self.record("ColorStops", ParamValue::Int(palette.len() as i64)),
            None => self.forget(&["ColorStops"]),
        }
        Ok(())
    }

    fn set_color_range(&mut self, range: Option<ScalarRange>) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Contour(c) => c.set_color_range(range)?,
            StageHandle::Slice(s) => s.set_color_range(range)?,
            _ => return Err(self.wrong_kind("Contour or Slice")),
        }
        match range {
            Some(r) => self.record("ColorRange", ParamValue::List(vec![r.low, r.high])),
            None => self.forget(&["ColorRange"]),
        }
        Ok(())
    }

    // ── Contour ──

    fn set_contour_field(&mut self, field: Option<usize>) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Contour(c) => c.set_contour_field(field)?,
            _ => return Err(self.wrong_kind("Contour")),
        }
        match field {
            Some(field) => self.record("ContourField", ParamValue::Int(field as i64)),
            None => self.forget(&["ContourField"]),
        }
        Ok(())
    }

    pub(crate) fn set_isovalues(&mut self, values: &[f64]) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Contour(c) => c.set_isovalues(values)?,
            _ => return Err(self.wrong_kind("Contour")),
        }
        self.record("ContourValues", ParamValue::List(values.to_vec()));
        Ok(())
    }

    /// Local contour value range. Only valid after the first update.
    pub fn contour_range(&self) -> PipelineResult<ScalarRange> {
        if self.computed_at.is_none() {
            return Err(PipelineError::NotUpdated { stage_id: self.id });
        }
        match &self.handle {
            StageHandle::Contour(c) => Ok(c.range()),
            _ => Err(self.wrong_kind("Contour")),
        }
    }

    // ── Slice ──

    pub(crate) fn set_slice_planes(&mut self, planes: &SlicePlanes) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Slice(s) => s.set_planes(planes)?,
            _ => return Err(self.wrong_kind("Slice")),
        }
        self.record("Origin", ParamValue::Vector(planes.origin));
        self.record("Normal", ParamValue::Vector(planes.normal));
        self.record("NumberOfPlanes", ParamValue::Int(planes.count as i64));
        self.record("Spacing", ParamValue::Float(planes.spacing));
        Ok(())
    }

    // ── Writer ──

    pub(crate) fn set_file_name(&mut self, path: &str) -> PipelineResult<()> {
        match &mut self.handle {
            StageHandle::Writer(w) => w.set_file_name(path)?,
            _ => return Err(self.wrong_kind("Writer")),
        }
        self.record("FileName", ParamValue::Text(path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_accessors() {
        assert_eq!(ParamValue::Int(8).as_int(), Some(8));
        assert_eq!(ParamValue::Float(0.5).as_float(), Some(0.5));
        assert_eq!(ParamValue::Vector([1.0, 2.0, 3.0]).as_vector(), Some([1.0, 2.0, 3.0]));
        assert_eq!(ParamValue::List(vec![1.0]).as_list(), Some(&[1.0][..]));
        assert_eq!(ParamValue::Text("a.vtu".into()).as_str(), Some("a.vtu"));
        assert_eq!(ParamValue::Int(1).as_float(), None);
    }

    #[test]
    fn test_setting_key() {
        let plane = ClipPlane::new([0.0; 3], [0.0, 1.0, 0.0]);
        assert_eq!(StageSetting::ClipPlane(plane).key(), SettingKey::ClipPlane);
        assert_eq!(StageSetting::ContourField(0).key(), SettingKey::ContourField);
        assert_eq!(
            StageSetting::ColorRange(ScalarRange::new(0.0, 1.0)).key(),
            SettingKey::ColorRange
        );
    }

    #[test]
    fn test_stage_kind() {
        assert!(!StageKind::Producer.has_input());
        assert!(StageKind::Contour.has_input());
        assert_eq!(StageKind::ClipSlab.to_string(), "ClipSlab");
    }
}

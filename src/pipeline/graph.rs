//! The fixed stage graph and its update scheduler.
//!
//! ```text
//! Producer ─┬─► Clip1 ─► Clip2 ─► Contour1      (branch 1, slab A)
//!           ├─► Clip3 ─► Clip4 ─► Contour2      (branch 1, slab B)
//!           └─► Slice                           (branch 2)
//! ```
//!
//! Stages are registered leaves-first: registering a stage whose upstream is
//! not yet in the graph fails. The execution order is a topological sort
//! (Kahn's algorithm, smallest stage id first), which for a leaves-first
//! build is exactly the registration order.
//!
//! Every stage carries two values of the graph's monotonic clock: when it
//! was last modified (parameter edit, or data refresh for the producer) and
//! when it last recomputed. A stage recomputes only if it was modified, an
//! upstream recomputed after it, or the requested time differs from its own
//! last update time.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::filter::{DumpFormat, StageBackend};
use crate::pipeline::id::StageId;
use crate::pipeline::stage::{
    SettingKey, Stage, StageHandle, StageKind, StageSetting, MAX_UPSTREAMS,
};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

/// Outcome of one pass over the graph.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Stages that recomputed, in execution order.
    pub recomputed: Vec<StageId>,
    /// Stages whose inputs were already current.
    pub unchanged: Vec<StageId>,
    /// Stages not run because an upstream failed this pass.
    pub skipped: Vec<StageId>,
    /// Stages whose backend update failed.
    pub failed: Vec<(StageId, PipelineError)>,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Owns every stage and schedules their updates.
pub struct StageGraph<D> {
    stages: Vec<Stage<D>>,
    /// Topological execution order. Recomputed after registration.
    execution_order: Vec<StageId>,
    /// True when execution_order needs recomputing (deferred topo sort).
    execution_order_dirty: bool,
    clock: u64,
}

impl<D> Default for StageGraph<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> StageGraph<D> {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            execution_order: Vec::new(),
            execution_order_dirty: false,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // ── Graph building ──

    /// Register a stage reading from `upstream` (in port order). Returns its id.
    pub fn register(
        &mut self,
        name: &str,
        mut handle: StageHandle<D>,
        upstream: &[StageId],
    ) -> PipelineResult<StageId> {
        if self.stages.iter().any(|s| s.name() == name) {
            return Err(PipelineError::DuplicateStage(name.to_string()));
        }

        let kind = handle.kind();
        let max = if kind.has_input() { MAX_UPSTREAMS } else { 0 };
        if upstream.len() > max {
            return Err(PipelineError::TooManyUpstreams {
                stage: name.to_string(),
                max,
                got: upstream.len(),
            });
        }
        if kind.has_input() && upstream.is_empty() {
            return Err(PipelineError::MissingUpstream {
                stage: name.to_string(),
                upstream: StageId::INVALID,
            });
        }

        for (port, &up) in upstream.iter().enumerate() {
            let proxy = self
                .stages
                .get(up.index())
                .map(|s| s.proxy())
                .ok_or_else(|| PipelineError::MissingUpstream {
                    stage: name.to_string(),
                    upstream: up,
                })?;
            handle.set_input(port, proxy)?;
        }

        let id = StageId(self.stages.len() as u32);
        let modified_at = self.tick();
        self.stages
            .push(Stage::new(id, name, handle, upstream.to_vec(), modified_at));
        self.execution_order_dirty = true;

        tracing::debug!("Registered stage '{}' as {:?} ({})", name, id, kind);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage<D>> {
        self.stages.get(id.index())
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage<D>> {
        self.stages.iter()
    }

    /// Edit a stage through `f`. On success the stage counts as modified and
    /// recomputes at the next update.
    pub fn modify<R, F>(&mut self, id: StageId, f: F) -> PipelineResult<R>
    where
        F: FnOnce(&mut Stage<D>) -> PipelineResult<R>,
    {
        let clock = self.clock + 1;
        let stage = self
            .stages
            .get_mut(id.index())
            .ok_or(PipelineError::NotUpdated { stage_id: id })?;
        let out = f(stage)?;
        stage.modified_at = clock;
        self.clock = clock;
        Ok(out)
    }

    /// Apply each `(stage, setting)` pair as one edit.
    ///
    /// If any stage rejects its setting, the stages already changed get back
    /// the value they held before, or the backend default if they had none,
    /// and the first error is returned.
    pub fn apply_settings(&mut self, edits: &[(StageId, StageSetting)]) -> PipelineResult<()> {
        let mut changed: Vec<(StageId, SettingKey, Option<StageSetting>)> =
            Vec::with_capacity(edits.len());
        for (id, setting) in edits {
            let key = setting.key();
            let previous = self.stage(*id).and_then(|s| s.applied(key)).cloned();
            if let Err(e) = self.modify(*id, |stage| stage.apply(setting)) {
                for (done, key, previous) in changed.into_iter().rev() {
                    let restored = self.modify(done, |stage| stage.restore(key, previous.as_ref()));
                    if let Err(rollback) = restored {
                        tracing::error!("Rollback of stage {:?} failed: {}", done, rollback);
                    }
                }
                return Err(e);
            }
            changed.push((*id, key, previous));
        }
        Ok(())
    }

    /// Point the producer at a new dataset for `time`. Nothing recomputes yet.
    pub fn refresh_producer(
        &mut self,
        producer: StageId,
        dataset: Arc<D>,
        time: f64,
    ) -> PipelineResult<()> {
        let clock = self.tick();
        let stage = self
            .stages
            .get_mut(producer.index())
            .ok_or(PipelineError::NotUpdated { stage_id: producer })?;
        stage.set_dataset(dataset, time)?;
        stage.modified_at = clock;
        stage.mark_updated(clock, time);
        Ok(())
    }

    // ── Topological sort (Kahn's algorithm) ──

    /// Execution order of all stages, producer included.
    pub fn execution_order(&mut self) -> PipelineResult<&[StageId]> {
        self.flush_execution_order()?;
        Ok(&self.execution_order)
    }

    fn flush_execution_order(&mut self) -> PipelineResult<()> {
        if self.execution_order_dirty {
            self.recompute_execution_order()?;
            self.execution_order_dirty = false;
        }
        Ok(())
    }

    fn recompute_execution_order(&mut self) -> PipelineResult<()> {
        let n = self.stages.len();
        let mut in_degree = vec![0u32; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];

        for stage in &self.stages {
            let to = stage.id().index();
            for up in stage.upstream() {
                adj[up.index()].push(to);
                in_degree[to] += 1;
            }
        }

        // Min-heap keeps the order deterministic: lowest id first among ready stages
        let mut queue: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&i| in_degree[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(node)) = queue.pop() {
            order.push(StageId(node as u32));
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(Reverse(next));
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Stage graph has a cycle! Only {} of {} stages scheduled.",
                order.len(),
                n
            );
            return Err(PipelineError::CycleDetected);
        }

        self.execution_order = order;
        Ok(())
    }

    // ── Updates ──

    /// Update one stage to `time`. Returns whether it recomputed.
    ///
    /// Fails with [`PipelineError::NotUpdated`] if an upstream has never been
    /// updated, which is what updating out of topological order looks like.
    pub fn update_stage(&mut self, id: StageId, time: f64) -> PipelineResult<bool> {
        let stage = self
            .stages
            .get(id.index())
            .ok_or(PipelineError::NotUpdated { stage_id: id })?;

        let mut newest_upstream = 0;
        for up in stage.upstream() {
            match self.stages[up.index()].computed_at {
                Some(c) => newest_upstream = newest_upstream.max(c),
                None => return Err(PipelineError::NotUpdated { stage_id: *up }),
            }
        }

        let stale = match stage.computed_at {
            None => true,
            Some(computed) => {
                stage.modified_at > computed
                    || newest_upstream > computed
                    || stage.last_updated_time() != Some(time)
            }
        };
        if !stale {
            return Ok(false);
        }

        let clock = self.tick();
        let stage = &mut self.stages[id.index()];
        if let Err(e) = stage.handle_mut().update_to_time(time) {
            return Err(PipelineError::Stage {
                stage_id: id,
                name: stage.name().to_string(),
                message: e.to_string(),
            });
        }
        stage.mark_updated(clock, time);
        tracing::debug!("Stage '{}' updated to t={}", stage.name(), time);
        Ok(true)
    }

    /// Update every non-producer stage in execution order.
    ///
    /// A failing stage does not stop its siblings; its downstream stages are
    /// skipped for this pass.
    pub fn update_all(&mut self, time: f64) -> PipelineResult<UpdateReport> {
        self.flush_execution_order()?;
        let order = self.execution_order.clone();
        let mut report = UpdateReport::default();
        let mut broken: HashSet<StageId> = HashSet::new();

        for id in order {
            let stage = &self.stages[id.index()];
            if stage.kind() == StageKind::Producer {
                continue;
            }
            if stage.upstream().iter().any(|up| broken.contains(up)) {
                tracing::warn!("Skipping stage '{}': upstream failed", stage.name());
                broken.insert(id);
                report.skipped.push(id);
                continue;
            }

            match self.update_stage(id, time) {
                Ok(true) => report.recomputed.push(id),
                Ok(false) => report.unchanged.push(id),
                Err(e) => {
                    tracing::warn!("{}", e);
                    broken.insert(id);
                    report.failed.push((id, e));
                }
            }
        }

        Ok(report)
    }
}

/// Ids of the stages of the slab pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabStageIds {
    pub producer: StageId,
    /// Clip1..Clip4, in slab-plane order.
    pub clips: [StageId; 4],
    /// Contour1 (slab A) and Contour2 (slab B).
    pub contours: [StageId; 2],
    pub slice: StageId,
    pub mesh_writer: Option<StageId>,
    pub contour_writer: Option<StageId>,
}

impl SlabStageIds {
    /// Writer stages present in the graph.
    pub fn writers(&self) -> impl Iterator<Item = (StageId, DumpFormat)> {
        self.mesh_writer
            .map(|id| (id, DumpFormat::UnstructuredGrid))
            .into_iter()
            .chain(self.contour_writer.map(|id| (id, DumpFormat::PolyData)))
    }
}

/// Builder for the fixed two-branch slab pipeline.
pub struct SlabPipelineBuilder<'a> {
    isovalues: &'a [f64],
    mesh_dump: bool,
    contour_dump: bool,
}

impl<'a> SlabPipelineBuilder<'a> {
    /// Both contour stages receive `isovalues`.
    pub fn new(isovalues: &'a [f64]) -> Self {
        Self {
            isovalues,
            mesh_dump: false,
            contour_dump: false,
        }
    }

    /// Dump the producer output every step.
    pub fn with_mesh_dump(mut self, enabled: bool) -> Self {
        self.mesh_dump = enabled;
        self
    }

    /// Dump Contour1's output every step.
    pub fn with_contour_dump(mut self, enabled: bool) -> Self {
        self.contour_dump = enabled;
        self
    }

    /// Build the graph, leaves first.
    pub fn build<B: StageBackend>(
        self,
        backend: &mut B,
    ) -> PipelineResult<(StageGraph<B::Dataset>, SlabStageIds)> {
        let mut graph = StageGraph::new();

        let producer = graph.register(
            "Source",
            StageHandle::Producer(backend.create_producer("Source")?),
            &[],
        )?;

        let clip1 = graph.register(
            "Clip1",
            StageHandle::Clip(backend.create_clip("Clip1")?),
            &[producer],
        )?;
        let clip2 = graph.register(
            "Clip2",
            StageHandle::Clip(backend.create_clip("Clip2")?),
            &[clip1],
        )?;
        let clip3 = graph.register(
            "Clip3",
            StageHandle::Clip(backend.create_clip("Clip3")?),
            &[producer],
        )?;
        let clip4 = graph.register(
            "Clip4",
            StageHandle::Clip(backend.create_clip("Clip4")?),
            &[clip3],
        )?;

        let contour1 = graph.register(
            "Contour1",
            StageHandle::Contour(backend.create_contour("Contour1")?),
            &[clip2],
        )?;
        let contour2 = graph.register(
            "Contour2",
            StageHandle::Contour(backend.create_contour("Contour2")?),
            &[clip4],
        )?;

        let slice = graph.register(
            "Slice",
            StageHandle::Slice(backend.create_slice("Slice")?),
            &[producer],
        )?;

        for (i, value) in self.isovalues.iter().enumerate() {
            tracing::debug!("Setting isovalue {}: {}", i, value);
        }
        for id in [contour1, contour2] {
            graph.modify(id, |stage| stage.set_isovalues(self.isovalues))?;
        }

        let mesh_writer = if self.mesh_dump {
            let writer = backend.create_writer("UnstructuredGridWriter", DumpFormat::UnstructuredGrid)?;
            Some(graph.register("UnstructuredGridWriter", StageHandle::Writer(writer), &[producer])?)
        } else {
            None
        };

        let contour_writer = if self.contour_dump {
            let writer = backend.create_writer("PolyDataWriter", DumpFormat::PolyData)?;
            Some(graph.register("PolyDataWriter", StageHandle::Writer(writer), &[contour1])?)
        } else {
            None
        };

        // Fails here rather than on the first step if the wiring is broken
        graph.flush_execution_order()?;

        let ids = SlabStageIds {
            producer,
            clips: [clip1, clip2, clip3, clip4],
            contours: [contour1, contour2],
            slice,
            mesh_writer,
            contour_writer,
        };

        tracing::info!(
            "Stage graph built: {} stages ({} writers)",
            graph.len(),
            ids.writers().count()
        );

        Ok((graph, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{BackendCall, MockBackend, MockDataset};
    use crate::pipeline::slab::ClipPlane;

    fn build_default() -> (MockBackend, StageGraph<MockDataset>, SlabStageIds) {
        let mut backend = MockBackend::new();
        let (graph, ids) = SlabPipelineBuilder::new(&[0.5, 1.5])
            .build(&mut backend)
            .unwrap();
        (backend, graph, ids)
    }

    fn names(graph: &StageGraph<MockDataset>, ids: &[StageId]) -> Vec<String> {
        ids.iter()
            .map(|&id| graph.stage(id).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_execution_order_matches_slab_topology() {
        let (_backend, mut graph, _ids) = build_default();
        let order = graph.execution_order().unwrap().to_vec();
        assert_eq!(
            names(&graph, &order),
            vec!["Source", "Clip1", "Clip2", "Clip3", "Clip4", "Contour1", "Contour2", "Slice"]
        );
    }

    #[test]
    fn test_register_requires_upstream() {
        let mut backend = MockBackend::new();
        let mut graph: StageGraph<MockDataset> = StageGraph::new();
        let clip = StageHandle::Clip(backend.create_clip("Clip1").unwrap());
        let err = graph.register("Clip1", clip, &[StageId(0)]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingUpstream { .. }));

        let clip = StageHandle::Clip(backend.create_clip("Clip1").unwrap());
        let err = graph.register("Clip1", clip, &[]).unwrap_err();
        assert!(matches!(err, PipelineError::MissingUpstream { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_register_rejects_duplicates_and_producer_inputs() {
        let mut backend = MockBackend::new();
        let mut graph: StageGraph<MockDataset> = StageGraph::new();
        let p = graph
            .register("Source", StageHandle::Producer(backend.create_producer("Source").unwrap()), &[])
            .unwrap();

        let dup = StageHandle::Producer(backend.create_producer("Source").unwrap());
        assert!(matches!(
            graph.register("Source", dup, &[]),
            Err(PipelineError::DuplicateStage(_))
        ));

        let second = StageHandle::Producer(backend.create_producer("Other").unwrap());
        assert!(matches!(
            graph.register("Other", second, &[p]),
            Err(PipelineError::TooManyUpstreams { .. })
        ));
    }

    #[test]
    fn test_update_before_upstream_fails() {
        let (_backend, mut graph, ids) = build_default();
        // Producer never refreshed
        let err = graph.update_stage(ids.clips[0], 1.0).unwrap_err();
        assert!(matches!(err, PipelineError::NotUpdated { .. }));
    }

    #[test]
    fn test_update_all_follows_topological_order() {
        let (backend, mut graph, ids) = build_default();
        let dataset = Arc::new(MockDataset::default());
        graph.refresh_producer(ids.producer, dataset, 1.0).unwrap();
        backend.clear_calls();

        let report = graph.update_all(1.0).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.recomputed.len(), 7);

        let updated: Vec<String> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Update { name, .. } => Some(name),
                _ => None,
            })
            .collect();
        assert_eq!(
            updated,
            vec!["Clip1", "Clip2", "Clip3", "Clip4", "Contour1", "Contour2", "Slice"]
        );
    }

    #[test]
    fn test_update_is_noop_when_nothing_changed() {
        let (_backend, mut graph, ids) = build_default();
        graph
            .refresh_producer(ids.producer, Arc::new(MockDataset::default()), 2.0)
            .unwrap();
        graph.update_all(2.0).unwrap();

        let report = graph.update_all(2.0).unwrap();
        assert!(report.recomputed.is_empty());
        assert_eq!(report.unchanged.len(), 7);
    }

    #[test]
    fn test_parameter_edit_recomputes_downstream_only() {
        let (_backend, mut graph, ids) = build_default();
        graph
            .refresh_producer(ids.producer, Arc::new(MockDataset::default()), 2.0)
            .unwrap();
        graph.update_all(2.0).unwrap();

        let plane = ClipPlane::new([0.0; 3], [0.0, 1.0, 0.0]);
        graph
            .apply_settings(&[(ids.clips[2], StageSetting::ClipPlane(plane))])
            .unwrap();

        let report = graph.update_all(2.0).unwrap();
        assert_eq!(
            names(&graph, &report.recomputed),
            vec!["Clip3", "Clip4", "Contour2"]
        );
    }

    #[test]
    fn test_downstream_time_never_behind_upstream() {
        let (_backend, mut graph, ids) = build_default();
        for (step, t) in [1.0, 2.0, 3.0].iter().enumerate() {
            graph
                .refresh_producer(ids.producer, Arc::new(MockDataset::default()), *t)
                .unwrap();
            graph.update_all(*t).unwrap();
            for stage in graph.stages() {
                for up in stage.upstream() {
                    let up_time = graph.stage(*up).unwrap().last_updated_time();
                    assert!(stage.last_updated_time() >= up_time, "step {}", step);
                }
            }
        }
    }

    #[test]
    fn test_failed_stage_skips_its_downstream() {
        let (backend, mut graph, ids) = build_default();
        graph
            .refresh_producer(ids.producer, Arc::new(MockDataset::default()), 1.0)
            .unwrap();
        backend.fail_updates_of("Clip1");

        let report = graph.update_all(1.0).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(names(&graph, &report.skipped), vec!["Clip2", "Contour1"]);
        assert_eq!(
            names(&graph, &report.recomputed),
            vec!["Clip3", "Clip4", "Contour2", "Slice"]
        );
    }

    #[test]
    fn test_isovalues_shared_by_both_contours() {
        let (_backend, graph, ids) = build_default();
        for id in ids.contours {
            let values = graph.stage(id).unwrap().parameter("ContourValues").unwrap();
            assert_eq!(values.as_list(), Some(&[0.5, 1.5][..]));
        }
    }

    #[test]
    fn test_writers_run_after_all_other_stages() {
        let mut backend = MockBackend::new();
        let (mut graph, ids) = SlabPipelineBuilder::new(&[1.0])
            .with_mesh_dump(true)
            .with_contour_dump(true)
            .build(&mut backend)
            .unwrap();
        assert_eq!(ids.writers().count(), 2);

        let order = graph.execution_order().unwrap().to_vec();
        assert_eq!(
            names(&graph, &order[order.len() - 2..]),
            vec!["UnstructuredGridWriter", "PolyDataWriter"]
        );
    }
}

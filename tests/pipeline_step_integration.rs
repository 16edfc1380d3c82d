//! Integration tests for the per-step update protocol
//!
//! These tests validate one co-processing call end to end:
//! - Stage update order and change-driven recomputation
//! - Image and dump naming
//! - Error isolation between sibling stages and views
//! - Steering commands and reference geometry

#![cfg(feature = "mock-backend")]

mod common;

use common::builders::OrchestratorBuilder;
use common::mock_helpers::{describe, initialize, test_dataset, STAGE_ORDER};
use insitu_rs::backend::{BackendCall, MockBackend};
use insitu_rs::config::DATA_DIR_ENV;
use insitu_rs::pipeline::{
    Branch, PipelineError, SteeringCommand, SteeringHandle, ViewId, ViewSelection,
};
use insitu_rs::types::{CameraOverrides, DataDescription};
use serial_test::serial;
use std::path::PathBuf;

#[test]
fn test_stages_update_in_topological_order() {
    let (mut orch, log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());
    log.clear();

    orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();
    assert_eq!(log.updated_stages(), STAGE_ORDER);
}

#[test]
fn test_every_stage_recomputes_on_new_time() {
    let (mut orch, log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());

    for step in 1..=3u64 {
        log.clear();
        let report = orch
            .co_process(&describe(step as f64, step, test_dataset()))
            .unwrap();
        assert_eq!(report.update.recomputed.len(), STAGE_ORDER.len());
        assert_eq!(log.updated_stages(), STAGE_ORDER);
    }
}

#[test]
fn test_image_names_for_two_views() {
    let (mut orch, log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());

    let report = orch.co_process(&describe(4.2, 42, test_dataset())).unwrap();
    let expected = vec![
        PathBuf::from("run_0042-v0.png"),
        PathBuf::from("run_0042-v1.png"),
    ];
    assert_eq!(report.images, expected);
    assert_eq!(log.written_images(), expected);
}

#[test]
fn test_single_view_selection_keeps_suffix() {
    let (mut orch, _log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());
    orch.set_view_to_coprocess(ViewSelection::Only(ViewId(1))).unwrap();

    let report = orch.co_process(&describe(1.0, 7, test_dataset())).unwrap();
    assert_eq!(report.images, vec![PathBuf::from("run_0007-v1.png")]);
}

#[test]
fn test_dumps_use_time_stamped_names() {
    let (mut orch, log) = OrchestratorBuilder::new()
        .configure(|c| {
            c.output.write_mesh_dump = true;
            c.output.write_contour_dump = true;
        })
        .build();
    initialize(&mut orch, test_dataset());
    log.clear();

    orch.co_process(&describe(1.5, 1, test_dataset())).unwrap();

    let dumps: Vec<String> = log
        .snapshot()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::WriteDump { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(dumps, vec!["out/run_1.500.vtu", "out/run_1.500.vtp"]);

    let updated = log.updated_stages();
    assert_eq!(&updated[..STAGE_ORDER.len()], STAGE_ORDER);
}

#[test]
fn test_failed_stage_does_not_stop_siblings() {
    let backend = MockBackend::new();
    backend.fail_updates_of("Clip1");
    let (mut orch, log) = OrchestratorBuilder::new().backend(backend).build();
    initialize(&mut orch, test_dataset());
    log.clear();

    let report = orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();
    assert_eq!(report.update.failed.len(), 1);
    assert_eq!(report.update.skipped.len(), 2);
    assert_eq!(
        log.updated_stages(),
        vec!["Clip3", "Clip4", "Contour2", "Slice"]
    );
    assert_eq!(report.images.len(), 2);
}

#[test]
fn test_failed_view_does_not_stop_other_view() {
    let backend = MockBackend::new();
    backend.fail_images_of("RenderView1");
    let (mut orch, _log) = OrchestratorBuilder::new().backend(backend).build();
    initialize(&mut orch, test_dataset());

    let report = orch.co_process(&describe(1.0, 3, test_dataset())).unwrap();
    assert_eq!(report.failed_views, vec![ViewId(0)]);
    assert_eq!(report.images, vec![PathBuf::from("run_0003-v1.png")]);
}

#[test]
fn test_missing_dataset_skips_step() {
    let (mut orch, log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());
    log.clear();

    let err = orch.co_process(&DataDescription::empty(1.0, 1)).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)));
    assert!(log.snapshot().is_empty());
}

#[test]
fn test_camera_reset_before_overrides() {
    let (mut orch, log) = OrchestratorBuilder::new().build();
    initialize(&mut orch, test_dataset());
    log.clear();

    let dataset = test_dataset().with_camera(CameraOverrides {
        eye: [0.0, 0.0, 5.0],
        ..CameraOverrides::NONE
    });
    orch.co_process(&describe(1.0, 1, dataset)).unwrap();

    let resets = log
        .snapshot()
        .into_iter()
        .filter(|c| matches!(c, BackendCall::ResetCamera { .. }))
        .count();
    assert_eq!(resets, 2);
}

#[test]
fn test_steering_applied_before_stage_updates() {
    let (handle, cmd_rx) = SteeringHandle::new();
    let (mut orch, log) = OrchestratorBuilder::new().steering(cmd_rx).build();
    initialize(&mut orch, test_dataset());
    log.clear();

    assert!(handle.set_clip_planes([0.0; 3], [0.0, 1.0, 0.0], 0.25));
    assert!(handle.send_command(SteeringCommand::SetRange {
        branch: Branch::Slice,
        low: -1.0,
        high: 1.0,
    }));
    orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();

    let calls = log.snapshot();
    let first_plane = calls
        .iter()
        .position(|c| matches!(c, BackendCall::SetParameter { parameter: "ClipPlane", .. }))
        .unwrap();
    let first_update = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Update { .. }))
        .unwrap();
    assert!(first_plane < first_update);

    let planes = orch.clip_planes().unwrap();
    assert_eq!(planes.p4.origin, [0.0, 0.5, 0.0]);
    assert_eq!(
        orch.color_mapping().unwrap().range(Branch::Slice).unwrap().high,
        1.0
    );
}

#[test]
fn test_rejected_steering_keeps_running() {
    let (handle, cmd_rx) = SteeringHandle::new();
    let (mut orch, _log) = OrchestratorBuilder::new().steering(cmd_rx).build();
    initialize(&mut orch, test_dataset());

    assert!(handle.set_range(Branch::Contours, 10.0, 5.0));
    let report = orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();
    assert!(report.update.is_clean());
    assert_eq!(orch.color_mapping().unwrap().range(Branch::Contours), None);
}

#[test]
#[serial]
fn test_reference_geometry_loaded_from_data_dir() {
    std::env::set_var(DATA_DIR_ENV, "/tmp/pyfr-data");
    let (mut orch, log) = OrchestratorBuilder::new()
        .configure(|c| c.render.reference_geometry = true)
        .build();
    initialize(&mut orch, test_dataset());
    std::env::remove_var(DATA_DIR_ENV);

    let loaded: Vec<PathBuf> = log
        .snapshot()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::LoadReference { path } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(loaded, vec![PathBuf::from("/tmp/pyfr-data/wall.vtu")]);
}

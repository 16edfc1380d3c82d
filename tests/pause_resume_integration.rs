//! Integration tests for pause/resume with a remote viewer
//!
//! These tests validate the live link handshake around each step:
//! - A paused step repeats for the same time, once per resume
//! - No new dataset is fetched while repeating
//! - Edits made while paused show up in the repeat
//! - Transport failures degrade to headless operation

#![cfg(feature = "mock-backend")]

mod common;

use common::builders::OrchestratorBuilder;
use common::mock_helpers::{
    describe, initialize, link_calls, producer_refreshes, test_dataset, STAGE_ORDER,
};
use insitu_rs::backend::BackendCall;
use insitu_rs::pipeline::{Branch, LinkState, SteeringCommand, SteeringHandle};

#[test]
fn test_paused_step_repeats_same_time() {
    let (mut orch, log) = OrchestratorBuilder::new()
        .link(|l| l.pause_at(3, 1))
        .build();
    initialize(&mut orch, test_dataset());
    assert_eq!(orch.link_state(), LinkState::Connected);

    let mut passes = Vec::new();
    for step in 1..=4u64 {
        let report = orch
            .co_process(&describe(step as f64, step, test_dataset()))
            .unwrap();
        passes.push(report.passes);
    }
    assert_eq!(passes, vec![1, 1, 2, 1]);

    let updates: Vec<(f64, u64)> = link_calls(&log)
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::LinkUpdate { time, step } => Some((time, step)),
            _ => None,
        })
        .collect();
    assert_eq!(
        updates,
        vec![(1.0, 1), (2.0, 2), (3.0, 3), (3.0, 3), (4.0, 4)]
    );

    // One producer refresh per call, none for the repeat
    assert_eq!(producer_refreshes(&log), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_one_repeat_per_resume_signal() {
    let (mut orch, log) = OrchestratorBuilder::new()
        .link(|l| l.pause_at(2, 3))
        .build();
    initialize(&mut orch, test_dataset());

    let report = orch.co_process(&describe(2.0, 2, test_dataset())).unwrap();
    assert_eq!(report.passes, 4);

    let waits: Vec<bool> = link_calls(&log)
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::LinkWait { released } => Some(released),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![false, false, false, true]);
    assert_eq!(orch.link_state(), LinkState::Connected);
}

#[test]
fn test_link_notified_around_stage_updates() {
    let (mut orch, log) = OrchestratorBuilder::new().link(|l| l).build();
    initialize(&mut orch, test_dataset());
    log.clear();

    orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();

    let calls = log.snapshot();
    let update = calls
        .iter()
        .position(|c| matches!(c, BackendCall::LinkUpdate { .. }))
        .unwrap();
    let first_stage = calls
        .iter()
        .position(|c| matches!(c, BackendCall::Update { .. }))
        .unwrap();
    let last_image = calls
        .iter()
        .rposition(|c| matches!(c, BackendCall::WriteImage { .. }))
        .unwrap();
    let post = calls
        .iter()
        .position(|c| matches!(c, BackendCall::LinkPostProcess { .. }))
        .unwrap();
    assert!(update < first_stage);
    assert!(last_image < post);
}

#[test]
fn test_repeat_without_edits_recomputes_nothing() {
    let (mut orch, log) = OrchestratorBuilder::new()
        .link(|l| l.pause_at(1, 1))
        .build();
    initialize(&mut orch, test_dataset());
    log.clear();

    let report = orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();
    assert_eq!(report.passes, 2);
    assert!(report.update.recomputed.is_empty());
    assert_eq!(report.update.unchanged.len(), STAGE_ORDER.len());
    assert_eq!(log.updated_stages(), STAGE_ORDER);
    assert_eq!(log.written_images().len(), 4);
}

#[test]
fn test_edits_while_paused_apply_to_repeat() {
    let (handle, cmd_rx) = SteeringHandle::new();
    let commands = vec![
        SteeringCommand::SetRange {
            branch: Branch::Slice,
            low: 0.0,
            high: 5.0,
        },
        SteeringCommand::SetClipPlanes {
            origin: [0.0; 3],
            normal: [0.0, 1.0, 0.0],
            pitch: 0.1,
        },
    ];
    let (mut orch, log) = OrchestratorBuilder::new()
        .link(|l| l.pause_at(3, 1).steer_while_paused(handle, commands))
        .steering(cmd_rx)
        .build();
    initialize(&mut orch, test_dataset());
    log.clear();

    let report = orch.co_process(&describe(3.0, 3, test_dataset())).unwrap();
    assert_eq!(report.passes, 2);

    // Second pass recomputes the edited stages and everything below them
    assert_eq!(report.update.recomputed.len(), STAGE_ORDER.len());
    assert_eq!(log.updated_stages().len(), 2 * STAGE_ORDER.len());
    assert_eq!(
        orch.color_mapping().unwrap().range(Branch::Slice).map(|r| r.high),
        Some(5.0)
    );
    assert!(orch.clip_planes().is_some());
}

#[test]
fn test_refused_connection_runs_headless() {
    let (mut orch, log) = OrchestratorBuilder::new()
        .link(|l| l.refuse_connection().pause_at(1, 5))
        .build();
    initialize(&mut orch, test_dataset());
    assert_eq!(orch.link_state(), LinkState::Disconnected);

    let report = orch.co_process(&describe(1.0, 1, test_dataset())).unwrap();
    assert_eq!(report.passes, 1);
    assert!(link_calls(&log).is_empty());
}

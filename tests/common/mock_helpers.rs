//! Mock construction helpers

use insitu_rs::backend::{BackendCall, CallLog, MockBackend, MockDataset};
use insitu_rs::pipeline::PipelineOrchestrator;
use insitu_rs::types::DataDescription;
use std::sync::Arc;

/// Stages in the order the update protocol must visit them
pub const STAGE_ORDER: [&str; 7] = [
    "Clip1", "Clip2", "Clip3", "Clip4", "Contour1", "Contour2", "Slice",
];

/// Dataset with the image prefix used across the tests
pub fn test_dataset() -> MockDataset {
    MockDataset::default().with_prefix("run_")
}

pub fn describe(time: f64, step: u64, dataset: MockDataset) -> DataDescription<MockDataset> {
    DataDescription::new(time, step, Arc::new(dataset))
}

/// Initialize from a step-0 description of `dataset`
pub fn initialize(orch: &mut PipelineOrchestrator<MockBackend>, dataset: MockDataset) {
    orch.initialize(&describe(0.0, 0, dataset))
        .expect("pipeline initialization failed");
}

/// Live link calls only, in order
pub fn link_calls(log: &CallLog) -> Vec<BackendCall> {
    log.snapshot()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                BackendCall::LinkInitialize { .. }
                    | BackendCall::LinkUpdate { .. }
                    | BackendCall::LinkPostProcess { .. }
                    | BackendCall::LinkWait { .. }
            )
        })
        .collect()
}

/// Times handed to the producer, one per co-processing call
pub fn producer_refreshes(log: &CallLog) -> Vec<f64> {
    log.snapshot()
        .into_iter()
        .filter_map(|c| match c {
            BackendCall::SetOutput { time, .. } => Some(time),
            _ => None,
        })
        .collect()
}

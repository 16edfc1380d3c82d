//! Pipeline-specific error types.

use crate::pipeline::id::{StageId, ViewId};
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {stage_id:?} ({name}) error: {message}")]
    Stage {
        stage_id: StageId,
        name: String,
        message: String,
    },

    #[error("Stage '{0}' registered twice")]
    DuplicateStage(String),

    #[error("Stage '{stage}' requires upstream {upstream:?}, which is not registered")]
    MissingUpstream { stage: String, upstream: StageId },

    #[error("Stage '{stage}' accepts at most {max} upstream stages, got {got}")]
    TooManyUpstreams {
        stage: String,
        max: usize,
        got: usize,
    },

    #[error("Cycle detected in stage graph")]
    CycleDetected,

    #[error("Stage {stage_id:?} was queried before its first update")]
    NotUpdated { stage_id: StageId },

    #[error("Stage {stage_id:?} is a {actual}, expected {expected}")]
    WrongKind {
        stage_id: StageId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid color range: low {low} > high {high}")]
    InvalidRange { low: f64, high: f64 },

    #[error("Field index {index} out of bounds (dataset has {available} fields)")]
    FieldOutOfBounds { index: usize, available: usize },

    #[error("Invalid slab pitch {0}: must be finite and positive")]
    InvalidPitch(f64),

    #[error("Invalid color palette: {0}")]
    InvalidPalette(String),

    #[error("Invalid slice planes: {0}")]
    InvalidSlice(String),

    #[error("Unknown branch {0} (expected 1 or 2)")]
    UnknownBranch(u8),

    #[error("View {view:?} error: {message}")]
    View { view: ViewId, message: String },

    #[error("Unknown view {0:?}")]
    UnknownView(ViewId),

    #[error("Live link error: {0}")]
    Link(String),

    #[error("Collective reduction error: {0}")]
    Collective(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pipeline not initialized")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelRecv,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

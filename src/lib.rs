//! # insitu-rs: In-situ co-processing pipeline
//!
//! Drives a visualization pipeline from inside a distributed simulation. At
//! every time step the simulation hands over its partition of the solution;
//! the pipeline cuts two stacked slabs out of the volume, extracts
//! iso-surfaces from each, slices the domain, reduces diagnostics across
//! partitions and writes one image per view. A remote viewer may pause the
//! run and steer parameters while paused.
//!
//! ## Architecture
//!
//! - **Pipeline**: fixed stage graph, update protocol and live link state machine ([`pipeline`])
//! - **Backend**: the filters and views the stages wrap, behind [`pipeline::StageBackend`] ([`backend`])
//! - **Configuration**: JSON/TOML pipeline settings ([`config`])
//! - **Communication**: collective reductions and steering over crossbeam channels
//!
//! ## Example
//!
//! ```ignore
//! use insitu_rs::{
//!     backend::{MockBackend, MockDataset},
//!     config::PipelineConfig,
//!     pipeline::{LiveLinkController, PipelineOrchestrator, SingleProcess},
//!     types::DataDescription,
//! };
//! use std::sync::Arc;
//!
//! let config = PipelineConfig::load("pipeline.toml")?;
//! let mut orchestrator = PipelineOrchestrator::new(
//!     MockBackend::new(),
//!     LiveLinkController::headless(),
//!     Box::new(SingleProcess),
//!     config,
//! );
//!
//! let first = DataDescription::new(0.0, 0, Arc::new(MockDataset::default()));
//! orchestrator.initialize(&first)?;
//! orchestrator.set_clip_planes([0.0; 3], [0.0, 1.0, 0.0], 0.05)?;
//!
//! for step in 1..=10 {
//!     let desc = DataDescription::new(step as f64 * 0.1, step, Arc::new(MockDataset::default()));
//!     orchestrator.co_process(&desc)?;
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use error::{InsituError, Result};
pub use pipeline::{PipelineError, PipelineOrchestrator, PipelineResult, StageBackend};
pub use types::{Bounds, DataDescription, PartitionedDataset, ScalarRange, StepInfo};

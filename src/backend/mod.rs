//! Stage backends
//!
//! The pipeline core only talks to a backend through
//! [`StageBackend`](crate::pipeline::StageBackend) and the capability traits
//! of [`crate::pipeline::filter`]. A production deployment plugs in the
//! visualization toolkit of the simulation; this module ships the in-memory
//! backend used by the dry-run binary and the tests.
//!
//! # Components
//!
//! - [`MockBackend`] - Recording filters and views (feature-gated)
//! - [`ScriptedLink`] - Live link that pauses at chosen steps (feature-gated)
//!
//! # Example
//!
//! ```ignore
//! use insitu_rs::backend::{MockBackend, MockDataset, ScriptedLink};
//! use insitu_rs::pipeline::{LiveLinkController, PipelineOrchestrator, SingleProcess};
//!
//! let backend = MockBackend::new();
//! let link = LiveLinkController::new(Box::new(ScriptedLink::new(backend.log())));
//! let mut orchestrator =
//!     PipelineOrchestrator::new(backend, link, Box::new(SingleProcess), config);
//! ```

#[cfg(any(test, feature = "mock-backend"))]
pub mod mock;

#[cfg(any(test, feature = "mock-backend"))]
pub use mock::{BackendCall, CallLog, MockBackend, MockDataset, MockFilter, MockView, ScriptedLink};

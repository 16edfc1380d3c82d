//! Stage-graph pipeline for in-situ co-processing.
//!
//! One partitioned dataset per time step flows through a fixed two-branch
//! graph of backend filters into two views. The orchestrator sequences the
//! updates, reduces diagnostics across partitions and coordinates pause and
//! resume with a remote viewer.
//!
//! # Architecture
//!
//! ```text
//! [Producer] ─┬─► [Clip1] ─► [Clip2] ─► [Contour1] ─┐
//!             ├─► [Clip3] ─► [Clip4] ─► [Contour2] ─┴─► RenderView1
//!             └─► [Slice] ──────────────────────────────► RenderView2
//! ```
//!
//! # Design
//!
//! - **Capability handles** - each stage stores a typed `StageHandle` variant
//!   chosen when the backend creates it; no runtime down-casting.
//! - **Explicit ownership** - `StageGraph` owns its stages and hands out
//!   `StageId`s; there is no name-keyed registry.
//! - **Generation clock** - stages recompute only when they or an upstream changed.
//! - **Single suspension point** - the live link is waited on once per pass,
//!   after post-processing.

pub mod color;
pub mod error;
pub mod filter;
pub mod graph;
pub mod id;
pub mod live_link;
pub mod orchestrator;
pub mod reducer;
pub mod slab;
pub mod stage;
pub mod steering;
pub mod view;

pub use color::{Branch, ColorMappingController, ColorPalette};
pub use error::{PipelineError, PipelineResult};
pub use filter::{
    ClipCapable, ColorCapable, ContourCapable, DumpFormat, Filter, ProducerCapable, SliceCapable,
    SlicePlanes, StageBackend, WriterCapable,
};
pub use graph::{SlabPipelineBuilder, SlabStageIds, StageGraph, UpdateReport};
pub use id::{ProxyId, StageId, ViewId};
pub use live_link::{LinkEndpoint, LinkState, LiveLink, LiveLinkController, StepEnd, WaitOutcome};
pub use orchestrator::{Diagnostics, PipelineOrchestrator, StepReport};
pub use reducer::{
    Communicator, DistributedReducer, ReduceOp, SingleProcess, ThreadCommunicator, ROOT_RANK,
};
pub use slab::{ClipPlane, SlabGeometryComputer, SlabPlanes};
pub use stage::{ParamValue, SettingKey, Stage, StageHandle, StageKind, StageSetting};
pub use steering::{SteeringCommand, SteeringHandle};
pub use view::{image_file_name, ImageSettings, ViewSelection, ViewSet, ViewTarget};

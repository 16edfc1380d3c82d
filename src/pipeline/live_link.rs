//! Live link to a remote viewer and the state machine around it.
//!
//! ```text
//!   Uninitialized ──connect──► Connected ──begin_step──► Running
//!                                  ▲                        │ end_step
//!                                  │   not paused           ▼
//!                                  └────────────────── (check pause) ──► Paused
//!                                                                          │ wait
//!                         Running ◄──── resumed (repeat same step) ────────┤
//!                         Connected ◄── released ──────────────────────────┘
//! ```
//!
//! Any transport failure moves the controller to `Disconnected`. From then
//! on every call is a no-op and the pipeline runs headless.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::types::StepInfo;
use serde::{Deserialize, Serialize};

/// Where the viewer listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEndpoint {
    pub host: String,
    pub port: u16,
}

impl Default for LinkEndpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22222,
        }
    }
}

impl std::fmt::Display for LinkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport to the remote viewer (external collaborator).
#[cfg_attr(test, mockall::automock)]
pub trait LiveLink: Send {
    fn initialize(&mut self, endpoint: &LinkEndpoint) -> PipelineResult<()>;

    /// A new step is being processed.
    fn update(&mut self, time: f64, step: u64) -> PipelineResult<()>;

    /// Images and diagnostics for the step are done.
    fn post_process(&mut self, time: f64, step: u64) -> PipelineResult<()>;

    fn is_paused(&self) -> bool;

    /// Block until the viewer resumes or edits the pipeline.
    ///
    /// Returns true when the step should be released back to the simulation,
    /// false when the same step should be processed again.
    fn wait_for_resume(&mut self) -> PipelineResult<bool>;
}

/// Lifecycle of the link session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    Connected,
    Running,
    Paused,
    Disconnected,
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEnd {
    /// Return control to the simulation.
    Done,
    /// The viewer asked for a pause; call [`LiveLinkController::wait`].
    Paused,
}

/// What the viewer did while the pipeline was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Process the same step again.
    Resumed,
    /// Return control to the simulation.
    Released,
}

/// Drives a [`LiveLink`] through the session lifecycle.
pub struct LiveLinkController {
    link: Option<Box<dyn LiveLink>>,
    state: LinkState,
}

impl LiveLinkController {
    pub fn new(link: Box<dyn LiveLink>) -> Self {
        Self {
            link: Some(link),
            state: LinkState::Uninitialized,
        }
    }

    /// A controller with no viewer at all.
    pub fn headless() -> Self {
        Self {
            link: None,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_headless(&self) -> bool {
        self.state == LinkState::Disconnected
    }

    fn disconnect(&mut self, error: &PipelineError) {
        tracing::warn!("Live link lost ({}), continuing headless", error);
        self.state = LinkState::Disconnected;
        self.link = None;
    }

    /// One-time handshake. On failure the controller is disconnected and the
    /// error is returned.
    pub fn connect(&mut self, endpoint: &LinkEndpoint) -> PipelineResult<()> {
        if self.state != LinkState::Uninitialized {
            return Err(PipelineError::Link(format!(
                "connect called in state {:?}",
                self.state
            )));
        }
        let Some(link) = self.link.as_mut() else {
            return Err(PipelineError::Link("no transport".to_string()));
        };

        match link.initialize(endpoint) {
            Ok(()) => {
                tracing::info!("Live link connected to {}", endpoint);
                self.state = LinkState::Connected;
                Ok(())
            }
            Err(e) => {
                let err = PipelineError::Link(format!("cannot connect to {}: {}", endpoint, e));
                self.disconnect(&err);
                Err(err)
            }
        }
    }

    /// Notify the viewer that `step` is being processed. Also used when a
    /// paused step is repeated.
    pub fn begin_step(&mut self, step: StepInfo) {
        if !matches!(
            self.state,
            LinkState::Connected | LinkState::Running | LinkState::Paused
        ) {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };
        match link.update(step.time, step.step) {
            Ok(()) => self.state = LinkState::Running,
            Err(e) => self.disconnect(&e),
        }
    }

    /// Notify post-processing completion and check for a pause request.
    pub fn end_step(&mut self, step: StepInfo) -> StepEnd {
        if self.state != LinkState::Running {
            return StepEnd::Done;
        }
        let Some(link) = self.link.as_mut() else {
            return StepEnd::Done;
        };
        if let Err(e) = link.post_process(step.time, step.step) {
            self.disconnect(&e);
            return StepEnd::Done;
        }

        if link.is_paused() {
            tracing::info!("Simulation paused by viewer at t={}", step.time);
            self.state = LinkState::Paused;
            StepEnd::Paused
        } else {
            self.state = LinkState::Connected;
            StepEnd::Done
        }
    }

    /// Block until the viewer acts. Only meaningful in `Paused`.
    pub fn wait(&mut self) -> WaitOutcome {
        if self.state != LinkState::Paused {
            return WaitOutcome::Released;
        }
        let Some(link) = self.link.as_mut() else {
            return WaitOutcome::Released;
        };
        match link.wait_for_resume() {
            Ok(true) => {
                self.state = LinkState::Connected;
                WaitOutcome::Released
            }
            Ok(false) => {
                tracing::debug!("Viewer resumed, repeating step");
                self.state = LinkState::Running;
                WaitOutcome::Resumed
            }
            Err(e) => {
                self.disconnect(&e);
                WaitOutcome::Released
            }
        }
    }
}

//! Test data builders for creating orchestrators

use insitu_rs::backend::{CallLog, MockBackend, ScriptedLink};
use insitu_rs::config::PipelineConfig;
use insitu_rs::pipeline::{
    Communicator, LiveLinkController, PipelineOrchestrator, SingleProcess, SteeringCommand,
};
use crossbeam_channel::Receiver;

/// Builder for an orchestrator over the mock backend
pub struct OrchestratorBuilder {
    backend: MockBackend,
    config: PipelineConfig,
    link: Option<ScriptedLink>,
    comm: Box<dyn Communicator>,
    steering: Option<Receiver<SteeringCommand>>,
}

impl OrchestratorBuilder {
    /// Headless, single partition, no reference geometry
    pub fn new() -> Self {
        let mut config = PipelineConfig::default();
        config.output.file_name = "out/run.vtu".to_string();
        config.render.reference_geometry = false;
        config.link.enabled = false;

        Self {
            backend: MockBackend::new(),
            config,
            link: None,
            comm: Box::new(SingleProcess),
            steering: None,
        }
    }

    pub fn backend(mut self, backend: MockBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Attach a scripted viewer recording into the backend's call log
    pub fn link(mut self, f: impl FnOnce(ScriptedLink) -> ScriptedLink) -> Self {
        self.link = Some(f(ScriptedLink::new(self.backend.log())));
        self.config.link.enabled = true;
        self
    }

    pub fn comm(mut self, comm: Box<dyn Communicator>) -> Self {
        self.comm = comm;
        self
    }

    pub fn steering(mut self, cmd_rx: Receiver<SteeringCommand>) -> Self {
        self.steering = Some(cmd_rx);
        self
    }

    pub fn build(self) -> (PipelineOrchestrator<MockBackend>, CallLog) {
        let log = self.backend.log();
        let link = match self.link {
            Some(link) => LiveLinkController::new(Box::new(link)),
            None => LiveLinkController::headless(),
        };
        let mut orch = PipelineOrchestrator::new(self.backend, link, self.comm, self.config);
        if let Some(cmd_rx) = self.steering {
            orch.attach_steering(cmd_rx);
        }
        (orch, log)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insitu_rs::pipeline::LinkState;

    #[test]
    fn test_orchestrator_builder() {
        let (orch, _log) = OrchestratorBuilder::new()
            .configure(|c| c.render.width = 640)
            .build();

        assert_eq!(orch.config().render.width, 640);
        assert_eq!(orch.link_state(), LinkState::Disconnected);
        assert!(!orch.is_initialized());
    }
}

//! Thread boundary between a viewer-side controller and the orchestrator.
//!
//! Commands are queued on a bounded channel and applied by the orchestrator
//! at one point per loop iteration: after the live link has been told about
//! the step and before any stage updates. Edits queued while the pipeline is
//! paused therefore show up in the repeat of the same step.

use crate::pipeline::color::{Branch, ColorPalette};
use crate::pipeline::filter::SlicePlanes;
use crate::pipeline::id::ViewId;
use crate::pipeline::view::ViewSelection;
use crate::types::Vec3;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Parameter edits a viewer can request.
#[derive(Debug, Clone, PartialEq)]
pub enum SteeringCommand {
    SetPalette {
        branch: Branch,
        palette: ColorPalette,
    },
    SetRange {
        branch: Branch,
        low: f64,
        high: f64,
    },
    SetColorField {
        branch: Branch,
        field: usize,
    },
    SetContourField(usize),
    SetClipPlanes {
        origin: Vec3,
        normal: Vec3,
        pitch: f64,
    },
    SetSlicePlanes(SlicePlanes),
    SetResolution {
        width: u32,
        height: u32,
    },
    SetSpecular {
        coefficient: f64,
        power: f64,
        view: ViewId,
    },
    SetViewToCoProcess(ViewSelection),
}

/// Channel capacity for steering commands.
const STEERING_CHANNEL_CAPACITY: usize = 64;

/// Sender side, handed to the viewer-side thread.
#[derive(Clone)]
pub struct SteeringHandle {
    cmd_tx: Sender<SteeringCommand>,
}

impl SteeringHandle {
    /// Create a handle and the receiver the orchestrator drains.
    pub fn new() -> (Self, Receiver<SteeringCommand>) {
        let (cmd_tx, cmd_rx) = bounded(STEERING_CHANNEL_CAPACITY);
        (Self { cmd_tx }, cmd_rx)
    }

    /// Queue a command. Returns false once the orchestrator is gone.
    pub fn send_command(&self, cmd: SteeringCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn set_range(&self, branch: Branch, low: f64, high: f64) -> bool {
        self.send_command(SteeringCommand::SetRange { branch, low, high })
    }

    pub fn set_palette(&self, branch: Branch, palette: ColorPalette) -> bool {
        self.send_command(SteeringCommand::SetPalette { branch, palette })
    }

    pub fn set_clip_planes(&self, origin: Vec3, normal: Vec3, pitch: f64) -> bool {
        self.send_command(SteeringCommand::SetClipPlanes {
            origin,
            normal,
            pitch,
        })
    }

    pub fn set_view_to_coprocess(&self, selection: ViewSelection) -> bool {
        self.send_command(SteeringCommand::SetViewToCoProcess(selection))
    }
}

/// Take every pending command without blocking.
pub fn drain(cmd_rx: &Receiver<SteeringCommand>) -> Vec<SteeringCommand> {
    let mut cmds = Vec::new();
    while let Ok(cmd) = cmd_rx.try_recv() {
        cmds.push(cmd);
    }
    cmds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_preserves_order() {
        let (handle, rx) = SteeringHandle::new();
        assert!(handle.set_range(Branch::Slice, 0.0, 1.0));
        assert!(handle.send_command(SteeringCommand::SetContourField(2)));

        let cmds = drain(&rx);
        assert_eq!(cmds.len(), 2);
        assert!(matches!(cmds[0], SteeringCommand::SetRange { .. }));
        assert_eq!(cmds[1], SteeringCommand::SetContourField(2));
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (handle, rx) = SteeringHandle::new();
        drop(rx);
        assert!(!handle.set_view_to_coprocess(ViewSelection::All));
    }
}

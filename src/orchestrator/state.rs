use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

/// Lifecycle state of one managed service process.
///
/// `Stopped` and `Failed` are resting states; the rest are transient. Every
/// state change goes through [`ProcessState::transition`] so an illegal move
/// is a typed error instead of a silent coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Failed,
    Restarting,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("illegal state transition {from} -> {to}")]
pub struct StateTransitionError {
    pub from: ProcessState,
    pub to: ProcessState,
}

impl ProcessState {
    /// States backed by a live child process.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Restarting
        )
    }

    pub fn can_transition_to(&self, to: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, to),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Failed)
                | (Starting, Stopped)
                | (Running, Stopped)
                | (Running, Failed)
                | (Running, Restarting)
                | (Failed, Starting)
                | (Failed, Restarting)
                | (Restarting, Starting)
                | (Restarting, Stopped)
        )
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), StateTransitionError> {
        if !self.can_transition_to(to) {
            return Err(StateTransitionError { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

impl Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Failed => "failed",
            ProcessState::Restarting => "restarting",
        };
        f.write_str(s)
    }
}

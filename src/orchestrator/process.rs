use std::sync::Arc;
use std::time::Instant;

use crate::command::{exit_watch, ChildHandle, ExitNotifier, ExitWatch};
use crate::event::cancellation::{cancel_pair, CancelHandle, CancelSignal};

use super::state::ProcessState;

/// Mutable table entry for one managed service. Created on the first Start
/// and retained across Stopped/Failed so the info provider can report
/// last-known data; a later Start reuses the slot and keeps `restarts`.
pub(crate) struct ServiceProcess {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Instant,
    pub restarts: u32,
    pub last_error: Option<String>,
    pub handle: Option<Arc<dyn ChildHandle>>,
    /// Closing side of the per-service cancellation token. Shared so that
    /// whichever of Stop, Shutdown or config-removal first observes the need
    /// can close it; closing twice is harmless.
    pub stop_handle: Arc<CancelHandle>,
    pub stop_signal: CancelSignal,
    pub exit: ExitWatch,
}

impl ServiceProcess {
    /// Fresh entry in `Starting` state, ready for a spawn attempt. Returns
    /// the exit notifier the waiter thread resolves once the child is up.
    pub(crate) fn starting() -> (Self, ExitNotifier) {
        let (stop_handle, stop_signal) = cancel_pair();
        let (notifier, exit) = exit_watch();
        (
            Self {
                state: ProcessState::Starting,
                pid: None,
                started_at: Instant::now(),
                restarts: 0,
                last_error: None,
                handle: None,
                stop_handle: Arc::new(stop_handle),
                stop_signal,
                exit,
            },
            notifier,
        )
    }

    /// Re-arms a retained slot for a new start attempt, preserving the
    /// restart counter. The previous stop token and exit watch are replaced;
    /// any late observer of the old generation keeps its own clones.
    pub(crate) fn rearm(&mut self) -> ExitNotifier {
        let (stop_handle, stop_signal) = cancel_pair();
        let (notifier, exit) = exit_watch();
        self.pid = None;
        self.started_at = Instant::now();
        self.last_error = None;
        self.handle = None;
        self.stop_handle = Arc::new(stop_handle);
        self.stop_signal = stop_signal;
        self.exit = exit;
        notifier
    }
}

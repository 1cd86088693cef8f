use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, Sender};

use super::ExitOutcome;

/// Builds an exit notification pair for one child process. The waiter thread
/// resolves the notifier exactly once; every watch clone then observes the
/// outcome without consuming it, so the supervisor and a concurrent Stop can
/// both wait on the same exit.
pub fn exit_watch() -> (ExitNotifier, ExitWatch) {
    let outcome = Arc::new(Mutex::new(None));
    let (tx, rx) = bounded::<()>(0);
    (
        ExitNotifier {
            outcome: outcome.clone(),
            _guard: tx,
        },
        ExitWatch { outcome, rx },
    )
}

pub struct ExitNotifier {
    outcome: Arc<Mutex<Option<ExitOutcome>>>,
    _guard: Sender<()>,
}

impl ExitNotifier {
    /// Publishes the outcome and wakes every watcher. Consumes the notifier;
    /// dropping the guard sender is what disconnects the watchers.
    pub fn notify(self, outcome: ExitOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome);
    }
}

#[derive(Clone)]
pub struct ExitWatch {
    outcome: Arc<Mutex<Option<ExitOutcome>>>,
    rx: Receiver<()>,
}

impl ExitWatch {
    pub fn has_exited(&self) -> bool {
        self.outcome.lock().unwrap().is_some()
    }

    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome.lock().unwrap().clone()
    }

    /// Blocks until the child exits.
    pub fn wait(&self) -> ExitOutcome {
        let _ = self.rx.recv();
        self.resolved()
    }

    /// Blocks until the child exits or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitOutcome> {
        match self.rx.recv_timeout(timeout) {
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => None,
            _ => Some(self.resolved()),
        }
    }

    /// Raw receiver, for `select!` arms. Disconnection means the child exited.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    fn resolved(&self) -> ExitOutcome {
        self.outcome.lock().unwrap().clone().unwrap_or_else(|| {
            // The waiter vanished without reporting, e.g. it panicked.
            ExitOutcome::WaitFailed("exit notifier dropped without an outcome".to_string())
        })
    }
}

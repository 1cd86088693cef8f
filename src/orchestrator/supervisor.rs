use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::select;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::command::{ExitOutcome, ExitWatch};
use crate::config::ServiceName;
use crate::event::cancellation::CancelSignal;

use super::state::ProcessState;
use super::Inner;

const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Jitter keeps co-crashing services from restarting in lockstep. Applied on
/// top of the exponential delay and capped by the maximum backoff.
const JITTER_FRACTION: f64 = 0.2;

/// When and how fast crashed services are restarted.
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RESTART_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RestartPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    pub(crate) fn attempts_exhausted(&self, restarts: u32) -> bool {
        restarts >= self.max_attempts
    }

    /// Delay before restart attempt number `restarts + 1`: the exponential
    /// base doubled per previous attempt, jittered upwards, never above the
    /// configured maximum.
    pub(crate) fn backoff_delay(&self, restarts: u32) -> Duration {
        let doubled = self.initial_backoff.as_secs_f64() * 2f64.powi(restarts.min(63) as i32);
        let base = Duration::from_secs_f64(doubled).min(self.max_backoff);
        let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION));
        (base + jitter).min(self.max_backoff)
    }
}

/// Spawns the background watcher for one started service process. `stop`
/// and `exit` belong to the same process generation the caller just
/// started; a later generation gets its own supervisor.
pub(crate) fn spawn_supervisor(
    inner: Arc<Inner>,
    name: ServiceName,
    stop: CancelSignal,
    exit: ExitWatch,
) {
    thread::Builder::new()
        .name(format!("supervisor-{name}"))
        .spawn(move || supervise(inner, name, stop, exit))
        .expect("thread spawn should succeed");
}

fn supervise(inner: Arc<Inner>, name: ServiceName, stop: CancelSignal, exit: ExitWatch) {
    select! {
        recv(stop.receiver()) -> _ => {
            debug!(service = %name, "supervisor cancelled");
            return;
        }
        recv(exit.receiver()) -> _ => {}
    }
    let outcome = exit.wait();

    // Both arms may be ready at once; whoever closed the stop token owns the
    // final state.
    if stop.is_closed() {
        debug!(service = %name, "supervisor cancelled while the process exited");
        return;
    }

    let Some(restarts) = inner.record_exit(&name, &outcome) else {
        return;
    };

    if inner.is_shutting_down() {
        debug!(service = %name, "orchestrator is shutting down, not restarting");
        return;
    }
    if !inner.restart_allowed(&name) {
        info!(service = %name, "automatic restart not allowed, service stays failed");
        return;
    }
    if inner.restart_policy.attempts_exhausted(restarts) {
        error!(
            service = %name,
            restarts,
            "restart attempts exhausted, service stays failed until started explicitly"
        );
        inner.record_wedged(&name, restarts, &outcome);
        return;
    }

    let delay = inner.restart_policy.backoff_delay(restarts);
    if !inner.begin_restart(&name) {
        return;
    }
    info!(
        service = %name,
        attempt = restarts + 1,
        delay_ms = delay.as_millis() as u64,
        "restarting after backoff"
    );
    if stop.wait_timeout(delay) {
        debug!(service = %name, "restart cancelled during backoff");
        return;
    }

    match inner.start(&name) {
        Ok(()) => {}
        Err(super::OrchestratorError::ShuttingDown) => {
            debug!(service = %name, "orchestrator shut down before the restart")
        }
        Err(err) => error!(service = %name, "could not restart service: {err}"),
    }
}

impl Inner {
    /// Records how the child ended. Returns the current restart count when
    /// the supervisor should consider a restart, None when the exit was
    /// voluntary-and-clean or somebody else already owns the state.
    fn record_exit(&self, name: &ServiceName, outcome: &ExitOutcome) -> Option<u32> {
        let mut tables = self.tables.write().unwrap();
        let process = tables.processes.get_mut(name)?;
        process.pid = None;
        process.handle = None;
        if let Err(err) = process.state.transition(ProcessState::Failed) {
            debug!(service = %name, "not recording exit: {err}");
            return None;
        }
        if outcome.is_clean() {
            info!(service = %name, "service exited cleanly on its own");
            process.last_error = None;
            None
        } else {
            warn!(service = %name, "service failed: {outcome}");
            process.last_error = Some(outcome.to_string());
            Some(process.restarts)
        }
    }

    /// Whether the current config still wants this service back up.
    fn restart_allowed(&self, name: &ServiceName) -> bool {
        let tables = self.tables.read().unwrap();
        tables.settings.auto_restart
            && tables
                .services
                .get(name)
                .map(|service| service.enabled)
                .unwrap_or(false)
    }

    /// Failed -> Restarting plus the restart-counter bump, unless a stop or
    /// shutdown won the race in the meantime.
    fn begin_restart(&self, name: &ServiceName) -> bool {
        let mut tables = self.tables.write().unwrap();
        if self.is_shutting_down() {
            return false;
        }
        let Some(process) = tables.processes.get_mut(name) else {
            return false;
        };
        if process.stop_handle.is_closed() {
            return false;
        }
        if process.state.transition(ProcessState::Restarting).is_err() {
            return false;
        }
        process.restarts += 1;
        true
    }

    fn record_wedged(&self, name: &ServiceName, restarts: u32, outcome: &ExitOutcome) {
        let mut tables = self.tables.write().unwrap();
        if let Some(process) = tables.processes.get_mut(name) {
            process.last_error = Some(format!(
                "restart attempts exhausted after {restarts} attempts; last failure: {outcome}"
            ));
        }
    }
}

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::{ChildHandle, CommandSpec, ExitNotifier, ExitWatch, ProcessSignal};
use crate::config::ServiceName;

use super::discovery::is_executable_file;
use super::error::OrchestratorError;
use super::isolation::{build_environment, working_directory};
use super::process::ServiceProcess;
use super::state::{ProcessState, StateTransitionError};
use super::supervisor::spawn_supervisor;
use super::Inner;

impl Inner {
    /// Brings one configured service up. Disabled services and services that
    /// are already active make this a no-op; the write lock is never held
    /// across the spawn syscall.
    pub(crate) fn start(self: &Arc<Self>, name: &ServiceName) -> Result<(), OrchestratorError> {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let (spec, notifier) = {
            let mut tables = self.tables.write().unwrap();
            let Some(service) = tables.services.get(name).cloned() else {
                return Err(OrchestratorError::ServiceNotFound(name.clone()));
            };
            if !service.enabled {
                debug!(service = %name, "service is disabled, start is a no-op");
                return Ok(());
            }
            if let Some(process) = tables.processes.get(name) {
                if process.state.is_live() {
                    debug!(
                        service = %name,
                        state = %process.state,
                        "service already active, start is a no-op"
                    );
                    return Ok(());
                }
            }

            let binary = service.resolved_binary(&tables.settings.services_dir, name);
            let log_level = tables.settings.log_level;

            // Enter Starting before anything can block so a concurrent Start
            // short-circuits on the live state above.
            let notifier = match tables.processes.get_mut(name) {
                Some(process) => {
                    process.state.transition(ProcessState::Starting)?;
                    process.rearm()
                }
                None => {
                    let (process, notifier) = ServiceProcess::starting();
                    tables.processes.insert(name.clone(), process);
                    notifier
                }
            };

            if !is_executable_file(&binary) {
                // tables still holds the entry inserted just above
                if let Some(process) = tables.processes.get_mut(name) {
                    let _ = process.state.transition(ProcessState::Failed);
                    process.last_error = Some(format!(
                        "binary `{}` is missing or not executable",
                        binary.display()
                    ));
                }
                return Err(OrchestratorError::BinaryNotFound {
                    service: name.clone(),
                    path: binary,
                });
            }

            let mut args = vec![
                "--service".to_string(),
                name.to_string(),
                "--log-level".to_string(),
                log_level.to_string(),
            ];
            args.extend(service.args.iter().cloned());

            let spec = CommandSpec::new(name.clone(), binary)
                .with_args(args)
                .with_env(build_environment(&service))
                .with_current_dir(working_directory(&service));
            (spec, notifier)
        };

        debug!(service = %name, binary = %spec.binary.display(), "spawning service process");
        match self.executor.spawn(spec) {
            Ok(handle) => self.record_spawned(name, handle, notifier),
            Err(source) => {
                let mut tables = self.tables.write().unwrap();
                if let Some(process) = tables.processes.get_mut(name) {
                    process.last_error = Some(source.to_string());
                    if let Err(err) = process.state.transition(ProcessState::Failed) {
                        debug!(service = %name, "spawn failed after a concurrent stop: {err}");
                    }
                }
                Err(OrchestratorError::SpawnFailed {
                    service: name.clone(),
                    source,
                })
            }
        }
    }

    fn record_spawned(
        self: &Arc<Self>,
        name: &ServiceName,
        handle: Box<dyn ChildHandle>,
        notifier: ExitNotifier,
    ) -> Result<(), OrchestratorError> {
        let handle: Arc<dyn ChildHandle> = Arc::from(handle);

        // The waiter reaps the child no matter what the tables say, so every
        // exit (including one forced just below) reaches its watchers.
        let waiter_handle = Arc::clone(&handle);
        thread::Builder::new()
            .name(format!("wait-{name}"))
            .spawn(move || notifier.notify(waiter_handle.wait()))
            .expect("thread spawn should succeed");

        let mut tables = self.tables.write().unwrap();
        let Some(process) = tables.processes.get_mut(name) else {
            warn!(service = %name, "service disappeared during start, killing fresh child");
            let _ = handle.kill();
            return Ok(());
        };
        if process.stop_handle.is_closed() || process.state != ProcessState::Starting {
            info!(service = %name, "stop requested during start, killing fresh child");
            let _ = handle.kill();
            return Ok(());
        }

        process.pid = Some(handle.pid());
        process.started_at = Instant::now();
        process.handle = Some(handle);
        process.state.transition(ProcessState::Running)?;
        let stop = process.stop_signal.clone();
        let exit = process.exit.clone();
        drop(tables);

        spawn_supervisor(Arc::clone(self), name.clone(), stop, exit);
        info!(service = %name, "service started");
        Ok(())
    }

    /// Takes one service down: close its stop token, ask nicely with
    /// SIGTERM, escalate to SIGKILL after the configured timeout. No-op for
    /// services that are not running.
    pub(crate) fn stop(&self, name: &ServiceName) -> Result<(), OrchestratorError> {
        let (handle, exit, timeout, in_spawn_window) = {
            let mut tables = self.tables.write().unwrap();
            let timeout = Duration::from_secs(tables.settings.shutdown_timeout_seconds);
            let Some(process) = tables.processes.get_mut(name) else {
                debug!(service = %name, "service has no process entry, stop is a no-op");
                return Ok(());
            };
            match process.state {
                ProcessState::Stopped => {
                    debug!(service = %name, "service already stopped, stop is a no-op");
                    return Ok(());
                }
                ProcessState::Failed => {
                    // Nothing alive; closing the token cancels a restart the
                    // supervisor might be about to schedule.
                    process.stop_handle.close();
                    return Ok(());
                }
                _ => {}
            }

            let in_spawn_window =
                process.state == ProcessState::Starting && process.handle.is_none();
            process.stop_handle.close();
            process.state.transition(ProcessState::Stopped)?;
            process.pid = None;
            (
                process.handle.take(),
                process.exit.clone(),
                timeout,
                in_spawn_window,
            )
        };

        let Some(handle) = handle else {
            if in_spawn_window {
                // The start path observes the closed token and puts the
                // fresh child down; give that a bounded moment to settle.
                let _ = exit.wait_timeout(timeout);
            }
            return Ok(());
        };
        self.graceful_stop(name, handle.as_ref(), &exit, timeout)
    }

    /// SIGTERM, bounded wait, then SIGKILL. Shared by Stop, Shutdown and
    /// config-removal. A failed SIGTERM is a warning; a failed SIGKILL on a
    /// still-living child is an error for the caller.
    pub(crate) fn graceful_stop(
        &self,
        name: &ServiceName,
        handle: &dyn ChildHandle,
        exit: &ExitWatch,
        timeout: Duration,
    ) -> Result<(), OrchestratorError> {
        if exit.has_exited() {
            debug!(service = %name, "process already exited");
            return Ok(());
        }

        if let Err(err) = handle.signal(ProcessSignal::Term) {
            warn!(service = %name, "could not deliver SIGTERM: {err}");
        }
        if exit.wait_timeout(timeout).is_none() {
            warn!(
                service = %name,
                timeout_secs = timeout.as_secs(),
                "graceful stop timed out, escalating to SIGKILL"
            );
            if let Err(source) = handle.kill() {
                if !exit.has_exited() {
                    return Err(OrchestratorError::KillFailed {
                        service: name.clone(),
                        source,
                    });
                }
            }
            // SIGKILL delivery is final, the remaining wait is unbounded.
            exit.wait();
        }
        debug!(service = %name, "service stopped");
        Ok(())
    }

    /// Stop followed by Start, bumping the restart counter once. From
    /// Stopped or Failed this behaves as a Start.
    pub(crate) fn restart(self: &Arc<Self>, name: &ServiceName) -> Result<(), OrchestratorError> {
        {
            let mut tables = self.tables.write().unwrap();
            if !tables.services.contains_key(name) {
                return Err(OrchestratorError::ServiceNotFound(name.clone()));
            }
            if let Some(process) = tables.processes.get_mut(name) {
                match process.state {
                    ProcessState::Running => {
                        process.state.transition(ProcessState::Restarting)?;
                    }
                    ProcessState::Stopped | ProcessState::Failed => {}
                    from @ (ProcessState::Starting | ProcessState::Restarting) => {
                        return Err(StateTransitionError {
                            from,
                            to: ProcessState::Restarting,
                        }
                        .into());
                    }
                }
            }
        }

        self.stop(name)?;
        {
            let mut tables = self.tables.write().unwrap();
            if let Some(process) = tables.processes.get_mut(name) {
                process.restarts += 1;
            }
        }
        self.start(name)
    }

    pub(crate) fn status(&self, name: &ServiceName) -> Result<ProcessState, OrchestratorError> {
        let tables = self.tables.read().unwrap();
        if !tables.services.contains_key(name) {
            return Err(OrchestratorError::ServiceNotFound(name.clone()));
        }
        Ok(tables
            .processes
            .get(name)
            .map(|process| process.state)
            .unwrap_or(ProcessState::Stopped))
    }
}

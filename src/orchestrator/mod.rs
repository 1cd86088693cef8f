pub mod discovery;
pub mod error;
pub mod info;
pub mod isolation;
pub mod lifecycle;
pub mod process;
pub mod state;
pub mod supervisor;

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use crossbeam::channel::bounded;
use crossbeam::select;
use tracing::{debug, error, info, warn};

use crate::command::{CommandExecutor, OsExecutor};
use crate::config::source::ConfigSource;
use crate::config::{Config, ConfigError, OrchestratorConfig, ServiceConfig, ServiceName};
use crate::event::channel::{pub_sub, EventConsumer, EventPublisher};
use crate::event::cancellation::CancelSignal;
use crate::event::ApplicationEvent;

use process::ServiceProcess;

pub use error::OrchestratorError;
pub use info::ServiceInfo;
pub use state::{ProcessState, StateTransitionError};
pub use supervisor::RestartPolicy;

/// Extra slack the run loop grants shutdown beyond the graceful-stop
/// timeout, covering the SIGKILL escalation window.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tables the orchestrator exclusively owns, guarded by one reader-writer
/// lock: the configured services, the per-service process entries, and the
/// orchestrator settings themselves.
pub(crate) struct Tables {
    pub(crate) settings: OrchestratorConfig,
    pub(crate) services: HashMap<ServiceName, ServiceConfig>,
    pub(crate) processes: HashMap<ServiceName, ServiceProcess>,
}

pub(crate) struct Inner {
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) restart_policy: RestartPolicy,
    pub(crate) tables: RwLock<Tables>,
    shutting_down: AtomicBool,
}

impl Inner {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Construction-time knobs: tests substitute the executor, operators tune
/// the restart policy.
pub struct OrchestratorOptions {
    executor: Arc<dyn CommandExecutor>,
    restart_policy: RestartPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            executor: Arc::new(OsExecutor),
            restart_policy: RestartPolicy::default(),
        }
    }
}

impl OrchestratorOptions {
    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_restart_policy(mut self, restart_policy: RestartPolicy) -> Self {
        self.restart_policy = restart_policy;
        self
    }
}

/// The supervisory core: owns the service and process tables, wires the
/// executor, lifecycle operations, supervisors and the info provider, and
/// reacts to config changes and shutdown requests.
pub struct Orchestrator {
    inner: Arc<Inner>,
    stop_publisher: EventPublisher<ApplicationEvent>,
    stop_consumer: EventConsumer<ApplicationEvent>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Validates the current config from `config_source`, prepares the
    /// directories the core is responsible for, and subscribes to config
    /// changes. No service is started yet.
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        options: OrchestratorOptions,
    ) -> Result<Self, OrchestratorError> {
        let config = config_source.current()?;
        config.validate()?;
        fs::create_dir_all(&config.orchestrator.socket_dir).map_err(|source| {
            ConfigError::SocketDirInvalid {
                path: config.orchestrator.socket_dir.clone(),
                source,
            }
        })?;
        info!(
            services = config.services.len(),
            services_dir = %config.orchestrator.services_dir.display(),
            "orchestrator configured"
        );

        let inner = Arc::new(Inner {
            executor: options.executor,
            restart_policy: options.restart_policy,
            tables: RwLock::new(Tables {
                settings: config.orchestrator,
                services: config.services,
                processes: HashMap::new(),
            }),
            shutting_down: AtomicBool::new(false),
        });

        let subscriber = Arc::downgrade(&inner);
        config_source.subscribe(Box::new(move |config| {
            if let Some(inner) = subscriber.upgrade() {
                inner.apply_config(config);
            }
        }));

        let (stop_publisher, stop_consumer) = pub_sub();
        Ok(Self {
            inner,
            stop_publisher,
            stop_consumer,
        })
    }

    pub fn start(&self, name: &ServiceName) -> Result<(), OrchestratorError> {
        self.inner.start(name)
    }

    pub fn stop(&self, name: &ServiceName) -> Result<(), OrchestratorError> {
        self.inner.stop(name)
    }

    pub fn restart(&self, name: &ServiceName) -> Result<(), OrchestratorError> {
        self.inner.restart(name)
    }

    pub fn status(&self, name: &ServiceName) -> Result<ProcessState, OrchestratorError> {
        self.inner.status(name)
    }

    /// Enumerates the executable service binaries under the configured
    /// services directory, configured or not.
    pub fn discover_services(&self) -> Result<Vec<ServiceName>, OrchestratorError> {
        let services_dir = {
            let tables = self.inner.tables.read().unwrap();
            tables.settings.services_dir.clone()
        };
        discovery::discover(&services_dir)
    }

    pub fn service_info(&self, name: &ServiceName) -> Result<ServiceInfo, OrchestratorError> {
        self.inner.service_info(name)
    }

    pub fn all_services(&self) -> HashMap<ServiceName, ServiceInfo> {
        self.inner.all_services()
    }

    /// Starts every enabled configured service, logging failures per service
    /// instead of aborting the rest.
    pub fn start_all(&self) {
        self.inner.start_all()
    }

    /// Stops everything that is live. Returns Ok once every stop finished,
    /// or `ShutdownInterrupted` when `ctx` closes first; pending stops keep
    /// running to completion either way. Idempotent.
    pub fn shutdown(&self, ctx: &CancelSignal) -> Result<(), OrchestratorError> {
        self.inner.shutdown(ctx)
    }

    pub fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), OrchestratorError> {
        self.inner.shutdown(&CancelSignal::deadline(timeout))
    }

    /// Routes SIGINT/SIGTERM into an internal stop request for [`Self::run`].
    /// Process-global, so call it once, from the binary.
    pub fn register_signal_handler(&self) -> Result<(), OrchestratorError> {
        let publisher = self.stop_publisher.clone();
        ctrlc::set_handler(move || {
            info!("termination signal received, requesting shutdown");
            let _ = publisher.publish(ApplicationEvent::StopRequested);
        })
        .map_err(|err| OrchestratorError::SignalHandler(err.to_string()))
    }

    /// Lets embedders request the same shutdown a signal would.
    pub fn stop_requester(&self) -> EventPublisher<ApplicationEvent> {
        self.stop_publisher.clone()
    }

    /// Binary main loop: bring every enabled service up, block until a stop
    /// is requested, then shut down within the configured timeout plus the
    /// escalation grace.
    pub fn run(&self) -> Result<(), OrchestratorError> {
        self.start_all();
        info!("orchestrator is running");
        let _ = self.stop_consumer.recv();

        let timeout = {
            let tables = self.inner.tables.read().unwrap();
            Duration::from_secs(tables.settings.shutdown_timeout_seconds)
        };
        self.shutdown_with_timeout(timeout + SHUTDOWN_GRACE)
    }
}

impl Inner {
    fn start_all(self: &Arc<Self>) {
        let mut names: Vec<ServiceName> = {
            let tables = self.tables.read().unwrap();
            tables
                .services
                .iter()
                .filter(|(_, service)| service.enabled)
                .map(|(name, _)| name.clone())
                .collect()
        };
        names.sort();
        for name in names {
            if let Err(err) = self.start(&name) {
                error!(service = %name, "could not start service: {err}");
            }
        }
    }

    /// Applies a complete new config: insert added services (without
    /// starting them), replace modified entries (running children keep their
    /// old config until restarted), stop and detach removed services.
    pub(crate) fn apply_config(self: &Arc<Self>, config: Config) {
        if let Err(err) = config.validate() {
            error!("ignoring configuration change: {err}");
            return;
        }
        let timeout = Duration::from_secs(config.orchestrator.shutdown_timeout_seconds);

        let removed: Vec<(ServiceName, Option<ServiceProcess>)> = {
            let mut tables = self.tables.write().unwrap();
            let removed_names: Vec<ServiceName> = tables
                .services
                .keys()
                .filter(|name| !config.services.contains_key(*name))
                .cloned()
                .collect();

            for (name, service) in &config.services {
                match tables.services.get(name) {
                    None => info!(service = %name, "service added to configuration"),
                    Some(previous) if previous != service => {
                        info!(
                            service = %name,
                            "service configuration modified, a running process keeps the old config until restarted"
                        )
                    }
                    Some(_) => {}
                }
            }

            tables.settings = config.orchestrator;
            tables.services = config.services;
            removed_names
                .into_iter()
                .map(|name| {
                    let process = tables.processes.remove(&name);
                    (name, process)
                })
                .collect()
        };

        for (name, process) in removed {
            info!(service = %name, "service removed from configuration");
            let Some(process) = process else { continue };
            process.stop_handle.close();
            if !process.state.is_live() {
                continue;
            }
            let Some(handle) = process.handle else {
                continue;
            };
            if let Err(err) = self.graceful_stop(&name, handle.as_ref(), &process.exit, timeout) {
                error!(service = %name, "error stopping removed service: {err}");
            }
        }
    }

    fn shutdown(self: &Arc<Self>, ctx: &CancelSignal) -> Result<(), OrchestratorError> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already requested before");
        }

        let names: Vec<ServiceName> = {
            let tables = self.tables.read().unwrap();
            tables
                .processes
                .iter()
                .filter(|(_, process)| process.state.is_live())
                .map(|(name, _)| name.clone())
                .collect()
        };
        if names.is_empty() {
            info!("shutdown complete, nothing was running");
            return Ok(());
        }

        info!(services = names.len(), "shutting down");
        let (done_tx, done_rx) = bounded::<()>(names.len());
        for name in names.iter().cloned() {
            let inner = Arc::clone(self);
            let done = done_tx.clone();
            thread::Builder::new()
                .name(format!("stop-{name}"))
                .spawn(move || {
                    if let Err(err) = inner.stop(&name) {
                        error!(service = %name, "error stopping service during shutdown: {err}");
                    }
                    let _ = done.send(());
                })
                .expect("thread spawn should succeed");
        }
        drop(done_tx);

        let mut pending = names.len();
        while pending > 0 {
            select! {
                recv(done_rx) -> msg => {
                    if msg.is_err() {
                        // Every stop thread is gone; nothing left to wait for.
                        warn!("stop workers finished without reporting");
                        break;
                    }
                    pending -= 1;
                }
                recv(ctx.receiver()) -> _ => {
                    warn!(pending, "shutdown context cancelled, stops continue in the background");
                    return Err(OrchestratorError::ShutdownInterrupted { pending });
                }
            }
        }
        info!("shutdown complete");
        Ok(())
    }
}

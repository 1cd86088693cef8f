use std::path::PathBuf;

use thiserror::Error;

use crate::command::CommandError;
use crate::config::{ConfigError, ServiceName};

use super::state::StateTransitionError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("service `{0}` not found")]
    ServiceNotFound(ServiceName),

    #[error("binary `{path}` for service `{service}` is missing or not executable")]
    BinaryNotFound { service: ServiceName, path: PathBuf },

    #[error("could not spawn service `{service}`: {source}")]
    SpawnFailed {
        service: ServiceName,
        #[source]
        source: CommandError,
    },

    #[error("could not kill service `{service}`: {source}")]
    KillFailed {
        service: ServiceName,
        #[source]
        source: CommandError,
    },

    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("shutdown interrupted with {pending} stop operations still pending")]
    ShutdownInterrupted { pending: usize },

    #[error("could not register signal handler: {0}")]
    SignalHandler(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateTransitionError),
}

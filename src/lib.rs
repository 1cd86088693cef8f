//! Supervisory process orchestrator for co-located platform services:
//! discovers, launches, monitors, restarts and gracefully terminates a
//! configured set of service subprocesses.

pub mod cli;
pub mod command;
pub mod config;
pub mod event;
pub mod logging;
pub mod orchestrator;

pub use config::source::{ConfigSource, FileConfigSource, MemoryConfigSource};
pub use config::{Config, ConfigError, LogLevel, OrchestratorConfig, ServiceConfig, ServiceName};
pub use event::cancellation::CancelSignal;
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorOptions, ProcessState, RestartPolicy, ServiceInfo,
};

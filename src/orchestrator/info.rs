use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::config::{ServiceConfig, ServiceName};

use super::error::OrchestratorError;
use super::process::ServiceProcess;
use super::state::ProcessState;
use super::Inner;

/// Read-only snapshot of one service, the only view external collaborators
/// (dashboard, CLI) get of core state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: ServiceName,
    pub configured: bool,
    pub enabled: bool,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub uptime: Option<Duration>,
    pub restarts: u32,
    pub last_error: Option<String>,
}

impl Inner {
    pub(crate) fn service_info(&self, name: &ServiceName) -> Result<ServiceInfo, OrchestratorError> {
        let tables = self.tables.read().unwrap();
        let Some(service) = tables.services.get(name) else {
            return Err(OrchestratorError::ServiceNotFound(name.clone()));
        };
        Ok(build_info(name.clone(), service, tables.processes.get(name)))
    }

    pub(crate) fn all_services(&self) -> HashMap<ServiceName, ServiceInfo> {
        let tables = self.tables.read().unwrap();
        tables
            .services
            .iter()
            .map(|(name, service)| {
                (
                    name.clone(),
                    build_info(name.clone(), service, tables.processes.get(name)),
                )
            })
            .collect()
    }
}

fn build_info(
    name: ServiceName,
    service: &ServiceConfig,
    process: Option<&ServiceProcess>,
) -> ServiceInfo {
    match process {
        Some(process) => ServiceInfo {
            name,
            configured: true,
            enabled: service.enabled,
            state: process.state,
            pid: process.pid,
            uptime: process
                .state
                .is_live()
                .then(|| process.started_at.elapsed()),
            restarts: process.restarts,
            last_error: process.last_error.clone(),
        },
        // Configured but never started.
        None => ServiceInfo {
            name,
            configured: true,
            enabled: service.enabled,
            state: ProcessState::Stopped,
            pid: None,
            uptime: None,
            restarts: 0,
            last_error: None,
        },
    }
}

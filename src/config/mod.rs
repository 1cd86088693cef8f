pub mod service_name;
pub mod source;

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::metadata::LevelFilter;

pub use service_name::ServiceName;

const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("services directory `{0}` does not exist or is not a directory")]
    ServicesDirInvalid(PathBuf),

    #[error("could not create socket directory `{path}`: {source}")]
    SocketDirInvalid {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shutdown_timeout_seconds must be at least 1")]
    ShutdownTimeoutInvalid,
}

/// Complete orchestrator configuration: one orchestrator section plus one
/// entry per managed service.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub services: HashMap<ServiceName, ServiceConfig>,
}

impl Config {
    /// Checks the invariants that make a config usable at construction time.
    /// Filesystem state for individual services is checked at Start time
    /// instead, so a missing binary does not prevent the orchestrator from
    /// managing its siblings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let services_dir = &self.orchestrator.services_dir;
        if !services_dir.is_dir() {
            return Err(ConfigError::ServicesDirInvalid(services_dir.clone()));
        }
        if self.orchestrator.shutdown_timeout_seconds < 1 {
            return Err(ConfigError::ShutdownTimeoutInvalid);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct OrchestratorConfig {
    pub services_dir: PathBuf,

    pub socket_dir: PathBuf,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default = "default_true")]
    pub auto_restart: bool,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the `<services_dir>/<name>/<name>` convention.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
}

impl ServiceConfig {
    /// Resolves the binary this service runs, falling back to the
    /// `<services_dir>/<name>/<name>` layout discovery uses.
    pub fn resolved_binary(&self, services_dir: &Path, name: &ServiceName) -> PathBuf {
        self.binary_path
            .clone()
            .unwrap_or_else(|| services_dir.join(name.as_str()).join(name.as_str()))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary_path: None,
            args: Vec::default(),
            env: HashMap::default(),
            data_dir: None,
            memory_limit_mb: None,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_shutdown_timeout() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
orchestrator:
  services_dir: /srv/services
  socket_dir: /run/orchestrator
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();

        assert_eq!(config.orchestrator.log_level, LogLevel::Info);
        assert!(config.orchestrator.auto_restart);
        assert_eq!(config.orchestrator.shutdown_timeout_seconds, 10);
        assert!(config.services.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let yaml = r#"
orchestrator:
  services_dir: /srv/services
  socket_dir: /run/orchestrator
  log_level: warn
  auto_restart: false
  shutdown_timeout_seconds: 3
services:
  gateway:
    args: ["--port", "8080"]
    env:
      MODE: prod
    memory_limit_mb: 256
  indexer:
    enabled: false
    binary_path: /opt/indexer/bin/indexer
    data_dir: /var/lib/indexer
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.orchestrator.log_level, LogLevel::Warn);
        assert!(!config.orchestrator.auto_restart);
        assert_eq!(config.orchestrator.shutdown_timeout_seconds, 3);

        let gateway = &config.services[&ServiceName::new("gateway").unwrap()];
        assert!(gateway.enabled);
        assert_eq!(gateway.args, vec!["--port", "8080"]);
        assert_eq!(gateway.env["MODE"], "prod");
        assert_eq!(gateway.memory_limit_mb, Some(256));

        let indexer = &config.services[&ServiceName::new("indexer").unwrap()];
        assert!(!indexer.enabled);
        assert_eq!(
            indexer.binary_path.as_deref(),
            Some(Path::new("/opt/indexer/bin/indexer"))
        );
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let yaml = r#"
orchestrator:
  services_dir: /srv/services
  socket_dir: /run/orchestrator
services:
  "Bad Name":
    enabled: true
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn validate_requires_existing_services_dir() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_matches!(config.validate(), Err(ConfigError::ServicesDirInvalid(_)));
    }

    #[test]
    fn validate_requires_positive_shutdown_timeout() {
        let dir = tempdir().unwrap();
        let yaml = format!(
            "orchestrator:\n  services_dir: {}\n  socket_dir: /run/orchestrator\n  shutdown_timeout_seconds: 0\n",
            dir.path().display()
        );
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_matches!(config.validate(), Err(ConfigError::ShutdownTimeoutInvalid));
    }

    #[test]
    fn resolved_binary_defaults_to_services_dir_layout() {
        let name = ServiceName::new("gateway").unwrap();
        let config = ServiceConfig::default();
        assert_eq!(
            config.resolved_binary(Path::new("/srv/services"), &name),
            PathBuf::from("/srv/services/gateway/gateway")
        );

        let overridden = ServiceConfig {
            binary_path: Some(PathBuf::from("/opt/gateway")),
            ..ServiceConfig::default()
        };
        assert_eq!(
            overridden.resolved_binary(Path::new("/srv/services"), &name),
            PathBuf::from("/opt/gateway")
        );
    }
}

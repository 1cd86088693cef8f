use std::env;
use std::path::PathBuf;

use crate::config::ServiceConfig;

/// Environment variables children inherit from the orchestrator. Everything
/// else the orchestrator carries stays with the orchestrator.
const BASELINE_ENV: [&str; 4] = ["PATH", "HOME", "TEMP", "TMP"];

/// Builds the child environment: the sanitized baseline, then the service's
/// own entries, then the memory limit hint. The executor applies these onto
/// a cleared environment in order, so later entries override earlier ones.
pub(crate) fn build_environment(config: &ServiceConfig) -> Vec<(String, String)> {
    let mut environment = Vec::new();
    for key in BASELINE_ENV {
        if let Ok(value) = env::var(key) {
            environment.push((key.to_string(), value));
        }
    }

    let mut service_env: Vec<_> = config.env.iter().collect();
    service_env.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (key, value) in service_env {
        environment.push((key.clone(), value.clone()));
    }

    if let Some(limit) = config.memory_limit_mb {
        environment.push(("GOMEMLIMIT".to_string(), format!("{limit}MiB")));
    }

    environment
}

/// The child's working directory: `data_dir` when it is set and actually
/// exists, otherwise the orchestrator's own cwd is inherited.
pub(crate) fn working_directory(config: &ServiceConfig) -> Option<PathBuf> {
    config.data_dir.as_ref().filter(|dir| dir.is_dir()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn baseline_is_copied_from_the_orchestrator() {
        let environment = build_environment(&ServiceConfig::default());

        // PATH is present in any sane test environment; nothing outside the
        // baseline may leak through.
        assert!(environment.iter().any(|(k, _)| k == "PATH"));
        for (key, _) in &environment {
            assert!(BASELINE_ENV.contains(&key.as_str()), "leaked `{key}`");
        }
    }

    #[test]
    fn service_entries_follow_the_baseline_and_override_it() {
        let config = ServiceConfig {
            env: HashMap::from([
                ("PATH".to_string(), "/custom/bin".to_string()),
                ("MODE".to_string(), "prod".to_string()),
            ]),
            ..ServiceConfig::default()
        };

        let environment = build_environment(&config);

        let baseline_path = environment.iter().position(|(k, _)| k == "PATH").unwrap();
        let service_path = environment
            .iter()
            .rposition(|(k, v)| k == "PATH" && v == "/custom/bin")
            .unwrap();
        assert!(service_path > baseline_path);
        assert!(environment.contains(&("MODE".to_string(), "prod".to_string())));
    }

    #[test]
    fn memory_limit_appends_gomemlimit() {
        let config = ServiceConfig {
            memory_limit_mb: Some(256),
            ..ServiceConfig::default()
        };
        let environment = build_environment(&config);
        assert_eq!(
            environment.last(),
            Some(&("GOMEMLIMIT".to_string(), "256MiB".to_string()))
        );

        let environment = build_environment(&ServiceConfig::default());
        assert!(!environment.iter().any(|(k, _)| k == "GOMEMLIMIT"));
    }

    #[test]
    fn working_directory_requires_an_existing_data_dir() {
        assert_eq!(working_directory(&ServiceConfig::default()), None);

        let missing = ServiceConfig {
            data_dir: Some(PathBuf::from("/definitely/not/here")),
            ..ServiceConfig::default()
        };
        assert_eq!(working_directory(&missing), None);

        let dir = tempdir().unwrap();
        let existing = ServiceConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..ServiceConfig::default()
        };
        assert_eq!(
            working_directory(&existing),
            Some(dir.path().to_path_buf())
        );
    }
}

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;

use crate::config::{ConfigError, ServiceName};

use super::error::OrchestratorError;

/// Enumerates the service binaries under `services_dir`: every directory
/// entry `<name>/` holding an executable regular file `<name>/<name>`
/// qualifies. The result is sorted; an empty directory is not an error.
pub(crate) fn discover(services_dir: &Path) -> Result<Vec<ServiceName>, OrchestratorError> {
    let entries = fs::read_dir(services_dir)
        .map_err(|_| ConfigError::ServicesDirInvalid(services_dir.to_path_buf()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: services_dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(raw_name) = file_name.to_str() else {
            continue;
        };
        let Ok(name) = ServiceName::new(raw_name) else {
            debug!("skipping `{raw_name}`, not a valid service name");
            continue;
        };
        if is_executable_file(&entry.path().join(name.as_str())) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

/// Regular file with at least one executable bit.
pub(crate) fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

use std::fmt::Display;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SERVICE_NAME_MAX_LENGTH: usize = 64;

/// Unique identifier of a managed service. Names become path components
/// (`<services_dir>/<name>/<name>`) and child argv entries, so they must
/// contain 64 characters at most, lowercase alphanumeric or dashes only,
/// start with alphabetic, and end with alphanumeric.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Hash, PartialOrd, Ord)]
#[serde(try_from = "String")]
pub struct ServiceName(String);

#[derive(Error, Debug, PartialEq)]
#[error("service name must contain 64 characters at most, lowercase alphanumeric characters or dashes only, start with alphabetic, and end with alphanumeric")]
pub struct ServiceNameError;

impl ServiceName {
    pub fn new(s: &str) -> Result<Self, ServiceNameError> {
        Self::try_from(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_format(s: &str) -> bool {
        s.len() <= SERVICE_NAME_MAX_LENGTH
            && s.starts_with(|c: char| c.is_ascii_lowercase())
            && s.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
            && s.chars()
                .all(|c| c.eq(&'-') || c.is_ascii_digit() || c.is_ascii_lowercase())
    }
}

impl TryFrom<String> for ServiceName {
    type Error = ServiceNameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        if ServiceName::is_valid_format(&s) {
            Ok(ServiceName(s))
        } else {
            Err(ServiceNameError)
        }
    }
}

impl Deref for ServiceName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

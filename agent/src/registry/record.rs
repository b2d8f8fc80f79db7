//! Container record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DockyardError;

/// Recorded status of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Stopped,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => f.write_str("running"),
            ContainerStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// One persisted record per scaled unit, identified by
/// `(app_name, process_type, ordinal)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub app_name: String,
    pub process_type: String,
    pub ordinal: u32,
    pub host_port: u16,
    pub internal_port: u16,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
}

impl ContainerRecord {
    /// A freshly started unit
    pub fn new(
        app_name: &str,
        process_type: &str,
        ordinal: u32,
        host_port: u16,
        internal_port: u16,
    ) -> Self {
        Self {
            name: unit_name(app_name, process_type, ordinal),
            app_name: app_name.to_string(),
            process_type: process_type.to_string(),
            ordinal,
            host_port,
            internal_port,
            status: ContainerStatus::Running,
            created_at: Utc::now(),
        }
    }

    /// Record of an application's active slot unit
    pub fn primary(app_name: &str, host_port: u16, internal_port: u16) -> Self {
        Self {
            name: app_name.to_string(),
            ..Self::new(app_name, PRIMARY_PROCESS_TYPE, 1, host_port, internal_port)
        }
    }
}

/// Process type under which the active slot unit is recorded
pub const PRIMARY_PROCESS_TYPE: &str = "primary";

/// Runtime name of a scaled unit
pub fn unit_name(app_name: &str, process_type: &str, ordinal: u32) -> String {
    format!("{}-{}-{}", app_name, process_type, ordinal)
}

/// Reject names that are unusable as a path segment or a unit name
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), DockyardError> {
    let valid = !value.is_empty()
        && !value.starts_with('.')
        && !value.starts_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(DockyardError::ConfigError(format!(
            "invalid {} '{}': use letters, digits, '-', '_' or '.'",
            kind, value
        )))
    }
}

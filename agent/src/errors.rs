//! Error types for dockyard

use thiserror::Error;

/// Main error type for dockyard
#[derive(Error, Debug)]
pub enum DockyardError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Image {0} not found, deploy the app first")]
    ImageNotFound(String),

    #[error("No previous container found for rollback of {0}")]
    NoPreviousContainer(String),

    #[error("No available ports in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Invalid scale argument: {0}")]
    InvalidScale(String),

    #[error("Container {name} is unhealthy, logs: {logs}")]
    Unhealthy { name: String, logs: String },

    #[error("Container {name} failed to become healthy within {timeout_secs}s")]
    HealthTimeout { name: String, timeout_secs: u64 },

    #[error("Container {name} failed to start, logs: {logs}")]
    StartFailed { name: String, logs: String },

    #[error("Runtime error: {op} {name} failed: {output}")]
    Runtime {
        op: &'static str,
        name: String,
        output: String,
    },

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Plugin hook error: {0}")]
    PluginError(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad category of a failure, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A required unit, image or port is missing. Never retried.
    Precondition,
    /// A health gate refused the new unit; the previous release is intact.
    Gating,
    /// A container runtime command failed.
    Runtime,
    /// Disk, lock, cancellation or internal failures.
    Infrastructure,
}

impl DockyardError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DockyardError::ContainerNotFound(_)
            | DockyardError::ImageNotFound(_)
            | DockyardError::NoPreviousContainer(_)
            | DockyardError::PortsExhausted { .. }
            | DockyardError::InvalidScale(_)
            | DockyardError::ConfigError(_) => ErrorClass::Precondition,
            DockyardError::Unhealthy { .. }
            | DockyardError::HealthTimeout { .. }
            | DockyardError::StartFailed { .. } => ErrorClass::Gating,
            DockyardError::Runtime { .. } => ErrorClass::Runtime,
            DockyardError::IoError(_)
            | DockyardError::JsonError(_)
            | DockyardError::StorageError(_)
            | DockyardError::LockError(_)
            | DockyardError::PluginError(_)
            | DockyardError::Cancelled(_)
            | DockyardError::Internal(_) => ErrorClass::Infrastructure,
        }
    }

    pub(crate) fn runtime(op: &'static str, name: &str, output: impl Into<String>) -> Self {
        DockyardError::Runtime {
            op,
            name: name.to_string(),
            output: output.into(),
        }
    }
}

impl From<anyhow::Error> for DockyardError {
    fn from(err: anyhow::Error) -> Self {
        DockyardError::Internal(err.to_string())
    }
}

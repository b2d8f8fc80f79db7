//! Container runtime gateway
//!
//! A thin facade over the operations dockyard needs from the container
//! runtime. It owns no state; every other component receives an
//! `Arc<dyn ContainerRuntime>` so tests can substitute [`memory::MemoryRuntime`].

pub mod command;
pub mod docker;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DockyardError;

/// Label key attached to every unit dockyard creates
pub const OWNER_LABEL_KEY: &str = "createdby";

/// Health of a single unit as reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    /// The unit defines no health check
    NoHealthcheck,
    /// The inspect call failed
    Unknown,
}

impl HealthState {
    /// Map the output of the health inspect template
    pub fn from_inspect_output(output: &str) -> Self {
        match output.trim() {
            "healthy" => HealthState::Healthy,
            "unhealthy" => HealthState::Unhealthy,
            "starting" => HealthState::Starting,
            "none" | "" => HealthState::NoHealthcheck,
            _ => HealthState::Unknown,
        }
    }
}

/// Restart policy of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    UnlessStopped,
    Always,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::UnlessStopped => "unless-stopped",
            RestartPolicy::Always => "always",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network a unit is attached to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NetworkMode {
    #[default]
    Bridge,
    Host,
    Custom(String),
}

impl NetworkMode {
    pub fn as_str(&self) -> &str {
        match self {
            NetworkMode::Bridge => "bridge",
            NetworkMode::Host => "host",
            NetworkMode::Custom(name) => name,
        }
    }

    /// Ports are only published outside of host networking
    pub fn publishes_ports(&self) -> bool {
        !matches!(self, NetworkMode::Host)
    }
}

impl std::str::FromStr for NetworkMode {
    type Err = DockyardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(DockyardError::ConfigError("empty network mode".to_string())),
            "bridge" => Ok(NetworkMode::Bridge),
            "host" => Ok(NetworkMode::Host),
            other => Ok(NetworkMode::Custom(other.to_string())),
        }
    }
}

/// File descriptor and process count ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub nofile: u64,
    pub nproc: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            nofile: 65536,
            nproc: 4096,
        }
    }
}

/// Everything needed to create and start a unit
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `host:internal` mappings
    pub ports: Vec<String>,
    pub env_file: Option<PathBuf>,
    /// `source:target` mounts
    pub volumes: Vec<String>,
    pub working_dir: Option<String>,
    pub restart_policy: RestartPolicy,
    pub network_mode: Option<NetworkMode>,
    pub limits: ResourceLimits,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: Vec::new(),
            env_file: None,
            volumes: Vec::new(),
            working_dir: None,
            restart_policy: RestartPolicy::No,
            network_mode: None,
            limits: ResourceLimits::default(),
            command: Vec::new(),
        }
    }
}

/// A unit carrying the ownership label, as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedContainer {
    #[serde(rename = "Names")]
    pub name: String,

    #[serde(rename = "Image", default)]
    pub image: String,

    #[serde(rename = "State", default)]
    pub state: String,

    #[serde(rename = "Status", default)]
    pub status: String,

    #[serde(rename = "Ports", default)]
    pub ports: String,
}

impl ManagedContainer {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Container runtime operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether a unit with exactly this name exists, running or not
    async fn exists(&self, name: &str) -> bool;

    /// Whether a unit with exactly this name is running
    async fn is_running(&self, name: &str) -> bool;

    /// Create and start a unit
    async fn create(&self, spec: &ContainerSpec) -> Result<(), DockyardError>;

    async fn start(&self, name: &str) -> Result<(), DockyardError>;

    /// Whether the unit is frozen by `pause`; a paused unit refuses `start`
    async fn is_paused(&self, name: &str) -> bool;

    async fn stop(&self, name: &str) -> Result<(), DockyardError>;

    async fn restart(&self, name: &str) -> Result<(), DockyardError>;

    async fn remove(&self, name: &str, force: bool) -> Result<(), DockyardError>;

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<(), DockyardError>;

    async fn pause(&self, name: &str) -> Result<(), DockyardError>;

    async fn unpause(&self, name: &str) -> Result<(), DockyardError>;

    async fn set_restart_policy(
        &self,
        name: &str,
        policy: RestartPolicy,
    ) -> Result<(), DockyardError>;

    async fn inspect_health(&self, name: &str) -> HealthState;

    /// Image reference the unit was created from
    async fn inspect_image(&self, name: &str) -> Result<String, DockyardError>;

    /// Recent log output of a unit
    async fn logs(&self, name: &str) -> Result<String, DockyardError>;

    async fn image_exists(&self, image: &str) -> bool;

    /// Units carrying the ownership label
    async fn list_by_label(&self, all: bool) -> Result<Vec<ManagedContainer>, DockyardError>;
}

/// Fetch a unit's logs for diagnostics. Fetch failures are swallowed.
pub async fn diagnostic_logs(runtime: &dyn ContainerRuntime, name: &str) -> String {
    match runtime.logs(name).await {
        Ok(logs) => logs,
        Err(e) => {
            tracing::debug!("Failed to fetch logs for {}: {}", name, e);
            String::new()
        }
    }
}

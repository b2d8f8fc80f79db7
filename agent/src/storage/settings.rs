//! Settings file management

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::DockyardError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Platform settings, read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON formatted logs
    #[serde(default)]
    pub json_logs: bool,

    /// Container runtime executable
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,

    /// Value of the `createdby` label attached to every managed unit
    #[serde(default = "default_label_value")]
    pub label_value: String,

    /// Host port range scanned when scaling
    #[serde(default)]
    pub port_range: PortRangeSettings,

    /// Health check timeout used when a deployment does not specify one
    #[serde(default = "default_health_timeout")]
    pub default_health_timeout_secs: u64,

    /// Settle delays of the deployment strategies
    #[serde(default)]
    pub timings: TimingSettings,

    /// How long to wait for another operation's application lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Internal container port per process type
    #[serde(default = "default_process_ports")]
    pub process_ports: HashMap<String, u16>,

    /// Internal container port for process types missing from `process_ports`
    #[serde(default = "default_internal_port")]
    pub default_internal_port: u16,

    /// Resource ceilings applied to every created unit
    #[serde(default)]
    pub resource_limits: ResourceLimitSettings,
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_label_value() -> String {
    "dockyard".to_string()
}

fn default_health_timeout() -> u64 {
    60
}

fn default_lock_timeout() -> u64 {
    300
}

fn default_process_ports() -> HashMap<String, u16> {
    HashMap::from([("web".to_string(), 8080)])
}

fn default_internal_port() -> u16 {
    8080
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            runtime_binary: default_runtime_binary(),
            label_value: default_label_value(),
            port_range: PortRangeSettings::default(),
            default_health_timeout_secs: default_health_timeout(),
            timings: TimingSettings::default(),
            lock_timeout_secs: default_lock_timeout(),
            process_ports: default_process_ports(),
            default_internal_port: default_internal_port(),
            resource_limits: ResourceLimitSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load_or_default(file: &File) -> Result<Self, DockyardError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await
    }
}

/// Inclusive host port range
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortRangeSettings {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRangeSettings {
    fn default() -> Self {
        Self {
            start: 32768,
            end: 65535,
        }
    }
}

/// Fixed settle delays, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "default_health_poll_ms")]
    pub health_poll_ms: u64,

    #[serde(default = "default_no_healthcheck_grace_ms")]
    pub no_healthcheck_grace_ms: u64,

    #[serde(default = "default_two_seconds")]
    pub stop_settle_ms: u64,

    #[serde(default = "default_five_seconds")]
    pub start_verify_ms: u64,

    #[serde(default = "default_two_seconds")]
    pub pause_settle_ms: u64,

    #[serde(default = "default_five_seconds")]
    pub drain_ms: u64,

    #[serde(default = "default_five_seconds")]
    pub rollback_settle_ms: u64,

    /// Ceiling on a single plugin hook run
    #[serde(default = "default_plugin_hook_ms")]
    pub plugin_hook_ms: u64,
}

fn default_health_poll_ms() -> u64 {
    2_000
}

fn default_no_healthcheck_grace_ms() -> u64 {
    3_000
}

fn default_two_seconds() -> u64 {
    2_000
}

fn default_five_seconds() -> u64 {
    5_000
}

fn default_plugin_hook_ms() -> u64 {
    30_000
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            health_poll_ms: default_health_poll_ms(),
            no_healthcheck_grace_ms: default_no_healthcheck_grace_ms(),
            stop_settle_ms: default_two_seconds(),
            start_verify_ms: default_five_seconds(),
            pause_settle_ms: default_two_seconds(),
            drain_ms: default_five_seconds(),
            rollback_settle_ms: default_five_seconds(),
            plugin_hook_ms: default_plugin_hook_ms(),
        }
    }
}

/// Per-unit resource ceilings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimitSettings {
    /// Open file descriptor ceiling
    pub nofile: u64,

    /// Process count ceiling
    pub nproc: u64,
}

impl Default for ResourceLimitSettings {
    fn default() -> Self {
        Self {
            nofile: 65536,
            nproc: 4096,
        }
    }
}

//! Platform configuration options

use std::time::Duration;

use crate::deploy::orchestrator::DeployerOptions;
use crate::health::HealthMonitorOptions;
use crate::plugins::DEFAULT_HOOK_TIMEOUT;
use crate::rollback::RollbackOptions;
use crate::runtime::ResourceLimits;
use crate::scale::ScalerOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main platform options
#[derive(Debug, Clone)]
pub struct PlatformOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Runtime configuration
    pub runtime: RuntimeOptions,

    /// Inclusive host port range for scaled units
    pub port_range: (u16, u16),

    /// Health timeout for deployments that do not set one
    pub default_health_timeout: Duration,

    /// How long to wait for another operation's application lock
    pub lock_timeout: Duration,

    /// Ceiling on a single plugin hook run
    pub hook_timeout: Duration,

    pub health: HealthMonitorOptions,
    pub deployer: DeployerOptions,
    pub scaler: ScalerOptions,
    pub rollback: RollbackOptions,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            layout: StorageLayout::default(),
            runtime: RuntimeOptions::default(),
            port_range: (32768, 65535),
            default_health_timeout: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(300),
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            health: HealthMonitorOptions::default(),
            deployer: DeployerOptions::default(),
            scaler: ScalerOptions::default(),
            rollback: RollbackOptions::default(),
        }
    }
}

impl PlatformOptions {
    /// Assemble options from a settings file rooted at `layout`
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let timings = &settings.timings;
        let limits = ResourceLimits {
            nofile: settings.resource_limits.nofile,
            nproc: settings.resource_limits.nproc,
        };

        Self {
            layout,
            runtime: RuntimeOptions {
                binary: settings.runtime_binary.clone(),
                label_value: settings.label_value.clone(),
            },
            port_range: (settings.port_range.start, settings.port_range.end),
            default_health_timeout: Duration::from_secs(settings.default_health_timeout_secs),
            lock_timeout: Duration::from_secs(settings.lock_timeout_secs),
            hook_timeout: Duration::from_millis(timings.plugin_hook_ms),
            health: HealthMonitorOptions {
                poll_interval: Duration::from_millis(timings.health_poll_ms),
                no_healthcheck_grace: Duration::from_millis(timings.no_healthcheck_grace_ms),
            },
            deployer: DeployerOptions {
                stop_settle: Duration::from_millis(timings.stop_settle_ms),
                start_verify: Duration::from_millis(timings.start_verify_ms),
                pause_settle: Duration::from_millis(timings.pause_settle_ms),
                drain: Duration::from_millis(timings.drain_ms),
                limits,
            },
            scaler: ScalerOptions {
                process_ports: settings.process_ports.clone(),
                default_internal_port: settings.default_internal_port,
                limits,
            },
            rollback: RollbackOptions {
                settle: Duration::from_millis(timings.rollback_settle_ms),
            },
        }
    }
}

/// Container runtime options
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Runtime executable
    pub binary: String,

    /// Value of the ownership label
    pub label_value: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            label_value: "dockyard".to_string(),
        }
    }
}

//! Deployment orchestrator
//!
//! `deploy` picks a strategy from the env file and runs it under the
//! application lock:
//!
//! - **standard**: stop and remove `{app}`, start the new unit, verify it runs.
//! - **blue/green**: start `{app}-green`, health-gate it, then swap names so
//!   the previous `{app}` is only touched once its replacement is healthy.
//!   Any failure before the swap leaves `{app}` running untouched.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::deploy::config::{parse_port_mapping, DeploymentConfig, RELEASE_MOUNT_PATH};
use crate::deploy::envfile::EnvFile;
use crate::deploy::fsm::{ReleaseEvent, ReleaseFsm, ReleaseState, Strategy};
use crate::deploy::slots::SlotNames;
use crate::errors::DockyardError;
use crate::filesys::file::File;
use crate::health::{HealthMonitor, HealthOutcome};
use crate::lock::AppLocks;
use crate::registry::record::{validate_identifier, ContainerRecord};
use crate::registry::ContainerRegistry;
use crate::runtime::{diagnostic_logs, ContainerRuntime, ContainerSpec, ResourceLimits, RestartPolicy};

/// Settle delays and unit limits of the deployment strategies
#[derive(Debug, Clone)]
pub struct DeployerOptions {
    /// Standard: after removing the previous unit
    pub stop_settle: Duration,

    /// Standard: before checking the new unit runs
    pub start_verify: Duration,

    /// Blue/green: after pausing the active unit
    pub pause_settle: Duration,

    /// Blue/green: before removing the displaced unit
    pub drain: Duration,

    pub limits: ResourceLimits,
}

impl Default for DeployerOptions {
    fn default() -> Self {
        Self {
            stop_settle: Duration::from_secs(2),
            start_verify: Duration::from_secs(5),
            pause_settle: Duration::from_secs(2),
            drain: Duration::from_secs(5),
            limits: ResourceLimits::default(),
        }
    }
}

/// Outcome of a successful release
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub app_name: String,
    pub strategy: Strategy,
    pub image: String,
    /// Name of the unit now serving the application
    pub active: String,
    pub container_port: Option<u16>,
    /// `None` for standard releases, which have no health gate
    pub health: Option<HealthOutcome>,
    /// Release phases visited
    pub phases: Vec<ReleaseState>,
}

pub struct Deployer {
    runtime: Arc<dyn ContainerRuntime>,
    health: HealthMonitor,
    registry: Arc<dyn ContainerRegistry>,
    locks: Arc<AppLocks>,
    options: DeployerOptions,
}

impl Deployer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        health: HealthMonitor,
        registry: Arc<dyn ContainerRegistry>,
        locks: Arc<AppLocks>,
        options: DeployerOptions,
    ) -> Self {
        Self {
            runtime,
            health,
            registry,
            locks,
            options,
        }
    }

    /// Release `config` with the strategy its env file selects
    pub async fn deploy(
        &self,
        config: &DeploymentConfig,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, DockyardError> {
        validate_identifier("app name", &config.app_name)?;
        let _lock = self.locks.acquire(&config.app_name).await?;

        let env = EnvFile::load(&config.env_file_path).await;
        let zero_downtime = env
            .zero_downtime()
            .unwrap_or(config.zero_downtime_requested);

        let mut fsm = ReleaseFsm::new();
        let result = if zero_downtime {
            info!("Zero downtime deployment enabled for {}", config.app_name);
            self.blue_green(config, &env, &mut fsm, cancel).await
        } else {
            info!("Zero downtime deployment disabled for {}", config.app_name);
            self.standard(config, &env, &mut fsm).await
        };

        match result {
            Ok(mut report) => {
                report.phases = fsm.history().to_vec();
                info!(
                    "{} deployment of {} complete: {} running {}",
                    report.strategy, config.app_name, report.active, report.image
                );
                Ok(report)
            }
            Err(e) => {
                let phase = fsm.state();
                if !fsm.is_terminal() {
                    let _ = fsm.process(ReleaseEvent::Fail(e.to_string()));
                }
                warn!(
                    "Deployment of {} failed during {:?}: {}",
                    config.app_name, phase, e
                );
                Err(e)
            }
        }
    }

    /// Stop-then-start release of the active slot
    async fn standard(
        &self,
        config: &DeploymentConfig,
        env: &EnvFile,
        fsm: &mut ReleaseFsm,
    ) -> Result<DeployReport, DockyardError> {
        let slots = SlotNames::for_app(&config.app_name);
        let container_port = env.container_port(config.default_port);
        step(fsm, ReleaseEvent::Begin(Strategy::Standard))?;

        if self.runtime.exists(&slots.active).await {
            info!("Stopping old container {}", slots.active);
            self.remove_unit(&slots.active).await;
            tokio::time::sleep(self.options.stop_settle).await;
        }

        let spec = self
            .unit_spec(&slots.active, config, container_port, RestartPolicy::No)
            .await;
        info!("Starting new container {}", slots.active);
        self.runtime.create(&spec).await?;
        step(fsm, ReleaseEvent::Started)?;

        tokio::time::sleep(self.options.start_verify).await;
        if !self.runtime.is_running(&slots.active).await {
            let logs = diagnostic_logs(self.runtime.as_ref(), &slots.active).await;
            return Err(DockyardError::StartFailed {
                name: slots.active,
                logs,
            });
        }
        step(fsm, ReleaseEvent::Verified)?;

        self.record_active(&config.app_name, &spec.ports, container_port)
            .await;

        Ok(DeployReport {
            app_name: config.app_name.clone(),
            strategy: Strategy::Standard,
            image: spec.image,
            active: slots.active,
            container_port,
            health: None,
            phases: Vec::new(),
        })
    }

    /// Health-gated release through the staging slot
    async fn blue_green(
        &self,
        config: &DeploymentConfig,
        env: &EnvFile,
        fsm: &mut ReleaseFsm,
        cancel: &CancellationToken,
    ) -> Result<DeployReport, DockyardError> {
        let slots = SlotNames::for_app(&config.app_name);
        let container_port = env.container_port(config.default_port);
        step(fsm, ReleaseEvent::Begin(Strategy::BlueGreen))?;

        // 1. Leftover staging unit from a failed attempt
        if self.runtime.exists(&slots.staging).await {
            info!("Removing stale staging container {}", slots.staging);
            self.remove_unit(&slots.staging).await;
        }

        // 2. Staging unit
        let spec = self
            .unit_spec(
                &slots.staging,
                config,
                container_port,
                RestartPolicy::UnlessStopped,
            )
            .await;
        info!("Starting staging container {}", slots.staging);
        if let Err(e) = self.runtime.create(&spec).await {
            // A failed run can still leave a created unit behind
            self.remove_unit(&slots.staging).await;
            return Err(e);
        }
        step(fsm, ReleaseEvent::StagingStarted)?;

        // 3. Health gate
        let timeout = Duration::from_secs(config.health_timeout_secs);
        let health = match self.health.wait_healthy(&slots.staging, timeout, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Staging container {} failed its health check", slots.staging);
                self.remove_unit(&slots.staging).await;
                return Err(e);
            }
        };
        step(fsm, ReleaseEvent::HealthPassed)?;

        if !self.runtime.exists(&slots.active).await {
            // 4. First deployment
            info!("First deployment, activating {} as {}", slots.staging, slots.active);
            if let Err(e) = self.runtime.rename(&slots.staging, &slots.active).await {
                self.remove_unit(&slots.staging).await;
                return Err(e);
            }
            self.set_restart_always(&slots.active).await;
            if self.runtime.exists(&slots.old).await {
                self.retire_old(&slots.old, config.keep_previous).await;
            }
            step(fsm, ReleaseEvent::FirstActivation)?;
        } else {
            // 5. Swap
            self.swap(&slots).await?;
            step(fsm, ReleaseEvent::Swapped)?;

            // 6. Drain and clean up the displaced unit
            tokio::time::sleep(self.options.drain).await;
            self.retire_old(&slots.old, config.keep_previous).await;
            step(fsm, ReleaseEvent::Drained)?;
        }

        self.record_active(&config.app_name, &spec.ports, container_port)
            .await;

        Ok(DeployReport {
            app_name: config.app_name.clone(),
            strategy: Strategy::BlueGreen,
            image: spec.image,
            active: slots.active,
            container_port,
            health: Some(health),
            phases: Vec::new(),
        })
    }

    /// Move the active unit aside and the staging unit into its name.
    /// On failure the previous active unit is restored and staging removed.
    async fn swap(&self, slots: &SlotNames) -> Result<(), DockyardError> {
        if self.runtime.exists(&slots.old).await {
            info!("Removing previous {} left from an earlier release", slots.old);
            self.remove_unit(&slots.old).await;
        }

        let paused = self.runtime.is_running(&slots.active).await
            && match self.runtime.pause(&slots.active).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to pause {}: {}", slots.active, e);
                    false
                }
            };
        if paused {
            tokio::time::sleep(self.options.pause_settle).await;
        }

        info!("Switching traffic: {} -> {}", slots.staging, slots.active);
        if let Err(e) = self.runtime.rename(&slots.active, &slots.old).await {
            self.resume(&slots.active, paused).await;
            self.remove_unit(&slots.staging).await;
            return Err(e);
        }

        if let Err(e) = self.runtime.rename(&slots.staging, &slots.active).await {
            match self.runtime.rename(&slots.old, &slots.active).await {
                Ok(()) => self.resume(&slots.active, paused).await,
                Err(restore) => warn!(
                    "Failed to restore {} as {}: {}",
                    slots.old, slots.active, restore
                ),
            }
            self.remove_unit(&slots.staging).await;
            return Err(e);
        }

        self.set_restart_always(&slots.active).await;
        Ok(())
    }

    /// Recreate the active unit from its current image, picking up a
    /// changed env file
    pub async fn recreate_active(
        &self,
        app_name: &str,
        env_file: &Path,
        release_dir: &Path,
    ) -> Result<DeployReport, DockyardError> {
        validate_identifier("app name", app_name)?;
        let _lock = self.locks.acquire(app_name).await?;

        let slots = SlotNames::for_app(app_name);
        if !self.runtime.exists(&slots.active).await {
            return Err(DockyardError::ContainerNotFound(slots.active));
        }

        let image = self.runtime.inspect_image(&slots.active).await?;
        info!("Recreating {} from image {}", slots.active, image);

        let env = EnvFile::load(env_file).await;
        let config = DeploymentConfig::new(app_name, "", env_file, release_dir);
        let container_port = env.container_port(config.default_port);

        let mut spec = self
            .unit_spec(&slots.active, &config, container_port, RestartPolicy::Always)
            .await;
        spec.image = image;

        self.remove_unit(&slots.active).await;
        self.runtime.create(&spec).await?;

        tokio::time::sleep(self.options.start_verify).await;
        if !self.runtime.is_running(&slots.active).await {
            let logs = diagnostic_logs(self.runtime.as_ref(), &slots.active).await;
            return Err(DockyardError::StartFailed {
                name: slots.active,
                logs,
            });
        }

        self.record_active(app_name, &spec.ports, container_port)
            .await;

        Ok(DeployReport {
            app_name: app_name.to_string(),
            strategy: Strategy::Standard,
            image: spec.image,
            active: slots.active,
            container_port,
            health: None,
            phases: Vec::new(),
        })
    }

    async fn unit_spec(
        &self,
        name: &str,
        config: &DeploymentConfig,
        container_port: Option<u16>,
        restart_policy: RestartPolicy,
    ) -> ContainerSpec {
        let mut spec = ContainerSpec::new(name, config.image());
        spec.ports = config.ports_for(container_port);
        if File::new(&config.env_file_path).exists().await {
            spec.env_file = Some(config.env_file_path.clone());
        }
        spec.volumes = config.volumes();
        spec.working_dir = Some(RELEASE_MOUNT_PATH.to_string());
        spec.restart_policy = restart_policy;
        spec.network_mode = config.network_mode.clone();
        spec.limits = self.options.limits;
        spec
    }

    /// Best-effort stop and forced removal
    async fn remove_unit(&self, name: &str) {
        if let Err(e) = self.runtime.stop(name).await {
            warn!("Failed to stop {}: {}", name, e);
        }
        if let Err(e) = self.runtime.remove(name, true).await {
            warn!("Failed to remove {}: {}", name, e);
        }
    }

    /// Stop the displaced unit and keep it for rollback, or remove it
    async fn retire_old(&self, old: &str, keep_previous: bool) {
        if keep_previous {
            info!("Keeping {} stopped for rollback", old);
            if let Err(e) = self.runtime.stop(old).await {
                warn!("Failed to stop {}: {}", old, e);
            }
        } else {
            info!("Removing old container {}", old);
            self.remove_unit(old).await;
        }
    }

    async fn resume(&self, name: &str, paused: bool) {
        if paused {
            if let Err(e) = self.runtime.unpause(name).await {
                warn!("Failed to unpause {}: {}", name, e);
            }
        }
    }

    async fn set_restart_always(&self, name: &str) {
        if let Err(e) = self
            .runtime
            .set_restart_policy(name, RestartPolicy::Always)
            .await
        {
            warn!("Failed to update restart policy of {}: {}", name, e);
        }
    }

    /// Record the active slot unit; the release stands even if this fails
    async fn record_active(&self, app_name: &str, ports: &[String], container_port: Option<u16>) {
        let (host_port, internal_port) = ports
            .first()
            .and_then(|mapping| parse_port_mapping(mapping))
            .or_else(|| container_port.map(|port| (port, port)))
            .unwrap_or((0, 0));

        let record = ContainerRecord::primary(app_name, host_port, internal_port);
        if let Err(e) = self.registry.save(&record).await {
            warn!("Failed to record {}: {}", record.name, e);
        }
    }
}

fn step(fsm: &mut ReleaseFsm, event: ReleaseEvent) -> Result<(), DockyardError> {
    fsm.process(event).map_err(DockyardError::Internal)
}

//! Health monitor
//!
//! Polls one unit's health on a fixed interval until it is healthy, reports
//! unhealthy, or the deadline passes. A unit without a health check is a
//! soft success after a short grace period. The wait can be interrupted
//! through a [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DockyardError;
use crate::runtime::{diagnostic_logs, ContainerRuntime, HealthState};

/// How a successful wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// The runtime reported the unit healthy
    Healthy,
    /// The unit has no health check; accepted after the grace delay
    NoHealthcheck,
}

/// Health monitor options
#[derive(Debug, Clone)]
pub struct HealthMonitorOptions {
    pub poll_interval: Duration,
    pub no_healthcheck_grace: Duration,
}

impl Default for HealthMonitorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            no_healthcheck_grace: Duration::from_secs(3),
        }
    }
}

pub struct HealthMonitor {
    runtime: Arc<dyn ContainerRuntime>,
    options: HealthMonitorOptions,
}

impl HealthMonitor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: HealthMonitorOptions) -> Self {
        Self { runtime, options }
    }

    /// Wait until `name` is healthy. The caller tears the unit down on error.
    pub async fn wait_healthy(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<HealthOutcome, DockyardError> {
        let deadline = Instant::now() + timeout;
        info!("Waiting for {} to become healthy (timeout {}s)", name, timeout.as_secs());

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(name));
            }

            match self.runtime.inspect_health(name).await {
                HealthState::Healthy => {
                    info!("Container {} is healthy", name);
                    return Ok(HealthOutcome::Healthy);
                }
                HealthState::Unhealthy => {
                    let logs = diagnostic_logs(self.runtime.as_ref(), name).await;
                    warn!("Container {} reported unhealthy", name);
                    return Err(DockyardError::Unhealthy {
                        name: name.to_string(),
                        logs,
                    });
                }
                HealthState::NoHealthcheck => {
                    info!("Container {} defines no health check, allowing it to settle", name);
                    self.sleep(self.options.no_healthcheck_grace, name, cancel)
                        .await?;
                    return Ok(HealthOutcome::NoHealthcheck);
                }
                state @ (HealthState::Starting | HealthState::Unknown) => {
                    debug!("Container {} health: {:?}", name, state);
                }
            }

            if Instant::now() >= deadline {
                return Err(DockyardError::HealthTimeout {
                    name: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            self.sleep(self.options.poll_interval, name, cancel).await?;
        }
    }

    async fn sleep(
        &self,
        duration: Duration,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DockyardError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled(name)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn cancelled(name: &str) -> DockyardError {
    DockyardError::Cancelled(format!("health wait for {}", name))
}

//! Rollback controller
//!
//! Brings back `{app}-old`, the unit displaced by the last blue/green swap.
//! The current active unit is stopped and swapped into `{app}-old`, so a
//! second rollback rolls forward again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::deploy::slots::SlotNames;
use crate::errors::DockyardError;
use crate::lock::AppLocks;
use crate::registry::record::validate_identifier;
use crate::runtime::{ContainerRuntime, RestartPolicy};

/// Rollback options
#[derive(Debug, Clone)]
pub struct RollbackOptions {
    /// Wait after starting the restored unit
    pub settle: Duration,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(5),
        }
    }
}

pub struct RollbackController {
    runtime: Arc<dyn ContainerRuntime>,
    locks: Arc<AppLocks>,
    options: RollbackOptions,
}

impl RollbackController {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        locks: Arc<AppLocks>,
        options: RollbackOptions,
    ) -> Self {
        Self {
            runtime,
            locks,
            options,
        }
    }

    /// Restore `{app}-old` as the active unit
    pub async fn rollback(&self, app_name: &str) -> Result<(), DockyardError> {
        validate_identifier("app name", app_name)?;
        let _lock = self.locks.acquire(app_name).await?;

        let slots = SlotNames::for_app(app_name);
        if !self.runtime.exists(&slots.old).await {
            return Err(DockyardError::NoPreviousContainer(app_name.to_string()));
        }

        info!("Rolling back {} to {}", slots.active, slots.old);
        let parked = format!("{}-rollback", app_name);
        let had_active = self.runtime.exists(&slots.active).await;

        if had_active {
            info!("Stopping current container {}", slots.active);
            if let Err(e) = self.runtime.stop(&slots.active).await {
                warn!("Failed to stop {}: {}", slots.active, e);
            }
            if let Err(e) = self.runtime.rename(&slots.active, &parked).await {
                if let Err(restart) = self.runtime.start(&slots.active).await {
                    warn!("Failed to restart {}: {}", slots.active, restart);
                }
                return Err(e);
            }
        }

        if let Err(e) = self.runtime.rename(&slots.old, &slots.active).await {
            if had_active {
                self.restore(&parked, &slots.active).await;
            }
            return Err(e);
        }

        let parked_as_old = had_active
            && match self.runtime.rename(&parked, &slots.old).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to keep rolled back unit as {}: {}", slots.old, e);
                    false
                }
            };

        info!("Starting previous container as {}", slots.active);
        if let Err(e) = self.start_unit(&slots.active).await {
            warn!("Failed to start {}, reverting rollback", slots.active);
            self.revert(&slots, &parked, had_active, parked_as_old).await;
            return Err(e);
        }
        if let Err(e) = self
            .runtime
            .set_restart_policy(&slots.active, RestartPolicy::Always)
            .await
        {
            warn!("Failed to update restart policy of {}: {}", slots.active, e);
        }

        tokio::time::sleep(self.options.settle).await;
        info!("Rollback of {} complete", app_name);
        Ok(())
    }

    /// Start a unit, thawing it first if it was left paused
    async fn start_unit(&self, name: &str) -> Result<(), DockyardError> {
        if self.runtime.is_paused(name).await {
            info!("Unpausing {}", name);
            self.runtime.unpause(name).await?;
            if self.runtime.is_running(name).await {
                return Ok(());
            }
        }
        self.runtime.start(name).await
    }

    /// Undo the renames of a rollback whose restored unit would not start,
    /// bringing the displaced active unit back up
    async fn revert(&self, slots: &SlotNames, parked: &str, had_active: bool, parked_as_old: bool) {
        if parked_as_old {
            if let Err(e) = self.runtime.rename(&slots.old, parked).await {
                warn!("Failed to move {} back to {}: {}", slots.old, parked, e);
                return;
            }
        }
        if let Err(e) = self.runtime.rename(&slots.active, &slots.old).await {
            warn!("Failed to return {} to {}: {}", slots.active, slots.old, e);
            return;
        }
        if had_active {
            self.restore(parked, &slots.active).await;
        }
    }

    /// Put a parked unit back under the active name and restart it
    async fn restore(&self, parked: &str, active: &str) {
        if let Err(e) = self.runtime.rename(parked, active).await {
            warn!("Failed to restore {} as {}: {}", parked, active, e);
            return;
        }
        if let Err(e) = self.runtime.start(active).await {
            warn!("Failed to restart {}: {}", active, e);
        }
    }
}

//! Start, stop and restart an application's units
//!
//! Works off the registry. When the registry knows nothing about an app,
//! units are discovered from the runtime instead: labelled units named
//! `{app}` or `{app}-*`, plus an unlabelled `{app}` from before labelling.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::DockyardError;
use crate::lock::AppLocks;
use crate::registry::record::{validate_identifier, ContainerRecord, ContainerStatus};
use crate::registry::ContainerRegistry;
use crate::runtime::ContainerRuntime;

/// Lifecycle action applied to units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Start,
    Stop,
    Restart,
}

impl ProcessAction {
    /// Status recorded after the action succeeds
    fn resulting_status(self) -> ContainerStatus {
        match self {
            ProcessAction::Start | ProcessAction::Restart => ContainerStatus::Running,
            ProcessAction::Stop => ContainerStatus::Stopped,
        }
    }
}

impl fmt::Display for ProcessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessAction::Start => f.write_str("start"),
            ProcessAction::Stop => f.write_str("stop"),
            ProcessAction::Restart => f.write_str("restart"),
        }
    }
}

/// Result of applying an action to an app
#[derive(Debug, Clone, Default)]
pub struct ActionReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Units were found through the runtime rather than the registry
    pub discovered: bool,
}

/// A recorded unit joined with its live state
#[derive(Debug, Clone)]
pub struct ProcessStatus {
    pub record: ContainerRecord,
    pub running: bool,
}

pub struct ProcessManager {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn ContainerRegistry>,
    locks: Arc<AppLocks>,
}

impl ProcessManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn ContainerRegistry>,
        locks: Arc<AppLocks>,
    ) -> Self {
        Self {
            runtime,
            registry,
            locks,
        }
    }

    pub async fn start(
        &self,
        app_name: &str,
        process_type: Option<&str>,
    ) -> Result<ActionReport, DockyardError> {
        self.apply(app_name, process_type, ProcessAction::Start).await
    }

    pub async fn stop(
        &self,
        app_name: &str,
        process_type: Option<&str>,
    ) -> Result<ActionReport, DockyardError> {
        self.apply(app_name, process_type, ProcessAction::Stop).await
    }

    pub async fn restart(
        &self,
        app_name: &str,
        process_type: Option<&str>,
    ) -> Result<ActionReport, DockyardError> {
        self.apply(app_name, process_type, ProcessAction::Restart).await
    }

    /// Every recorded unit of the app with whether it is running now
    pub async fn status(&self, app_name: &str) -> Result<Vec<ProcessStatus>, DockyardError> {
        let records = self.registry.list_all(app_name).await?;
        let mut statuses = Vec::with_capacity(records.len());
        for record in records {
            let running = self.runtime.is_running(&record.name).await;
            statuses.push(ProcessStatus { record, running });
        }
        Ok(statuses)
    }

    async fn apply(
        &self,
        app_name: &str,
        process_type: Option<&str>,
        action: ProcessAction,
    ) -> Result<ActionReport, DockyardError> {
        validate_identifier("app name", app_name)?;
        let _lock = self.locks.acquire(app_name).await?;

        let records = match process_type {
            Some(process_type) => self.registry.list(app_name, process_type).await?,
            None => self.registry.list_all(app_name).await?,
        };

        let mut report = ActionReport::default();
        if records.is_empty() {
            if process_type.is_none() {
                report.discovered = true;
                for name in self.discover(app_name).await {
                    self.run(action, &name, &mut report).await;
                }
            }
            if report.succeeded.is_empty() && report.failed.is_empty() {
                info!("No processes found for app {}", app_name);
            }
            return Ok(report);
        }

        for record in records {
            if self.run(action, &record.name, &mut report).await {
                if let Err(e) = self
                    .registry
                    .update_status(
                        &record.app_name,
                        &record.process_type,
                        record.ordinal,
                        action.resulting_status(),
                    )
                    .await
                {
                    warn!("Failed to update status of {}: {}", record.name, e);
                }
            }
        }
        Ok(report)
    }

    /// Apply `action` to one unit; true on success
    async fn run(&self, action: ProcessAction, name: &str, report: &mut ActionReport) -> bool {
        info!("Running {} on {}", action, name);
        let result = match action {
            ProcessAction::Start => self.runtime.start(name).await,
            ProcessAction::Stop => self.runtime.stop(name).await,
            ProcessAction::Restart => self.runtime.restart(name).await,
        };
        match result {
            Ok(()) => {
                report.succeeded.push(name.to_string());
                true
            }
            Err(e) => {
                warn!("Failed to {} {}: {}", action, name, e);
                report.failed.push((name.to_string(), e.to_string()));
                false
            }
        }
    }

    /// Units belonging to the app that the registry does not know about
    async fn discover(&self, app_name: &str) -> Vec<String> {
        let prefix = format!("{}-", app_name);
        let mut names = BTreeSet::new();

        match self.runtime.list_by_label(true).await {
            Ok(containers) => names.extend(
                containers
                    .into_iter()
                    .map(|c| c.name)
                    .filter(|name| name == app_name || name.starts_with(&prefix)),
            ),
            Err(e) => warn!("Failed to list managed containers: {}", e),
        }

        if self.runtime.exists(app_name).await {
            names.insert(app_name.to_string());
        }
        names.into_iter().collect()
    }
}

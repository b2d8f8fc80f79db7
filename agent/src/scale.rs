//! Scaling controller
//!
//! Adjusts the number of `{app}-{process_type}-{ordinal}` units to a target
//! count. Scale-up takes ordinals from `max + 1` and host ports from the
//! allocator one unit at a time, then creates the units concurrently.
//! Scale-down removes the highest ordinals first. A unit that fails is
//! logged and reported; the rest of the batch carries on.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::errors::DockyardError;
use crate::lock::AppLocks;
use crate::plugins::PluginHooks;
use crate::ports::PortAllocator;
use crate::registry::record::{unit_name, validate_identifier, ContainerRecord, PRIMARY_PROCESS_TYPE};
use crate::registry::ContainerRegistry;
use crate::runtime::{ContainerRuntime, ContainerSpec, ResourceLimits, RestartPolicy};
use crate::storage::layout::StorageLayout;

/// Scaler options
#[derive(Debug, Clone)]
pub struct ScalerOptions {
    /// Internal container port per process type
    pub process_ports: HashMap<String, u16>,

    /// Internal port for process types missing from `process_ports`
    pub default_internal_port: u16,

    pub limits: ResourceLimits,
}

impl Default for ScalerOptions {
    fn default() -> Self {
        Self {
            process_ports: HashMap::from([("web".to_string(), 8080)]),
            default_internal_port: 8080,
            limits: ResourceLimits::default(),
        }
    }
}

impl ScalerOptions {
    pub fn internal_port(&self, process_type: &str) -> u16 {
        self.process_ports
            .get(process_type)
            .copied()
            .unwrap_or(self.default_internal_port)
    }
}

/// A unit the batch could not create or remove
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub ordinal: u32,
    pub reason: String,
}

/// What one `scale` call did
#[derive(Debug, Clone, Default)]
pub struct ScaleReport {
    pub app_name: String,
    pub process_type: String,
    pub previous: usize,
    pub target: usize,
    /// Ordinals started, ascending
    pub created: Vec<u32>,
    /// Ordinals removed, highest first
    pub removed: Vec<u32>,
    pub failed: Vec<UnitFailure>,
}

impl ScaleReport {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.removed.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        !self.changed() && self.failed.is_empty()
    }
}

/// Parse `process=count`
pub fn parse_scale_argument(arg: &str) -> Result<(String, usize), DockyardError> {
    let (process_type, count) = arg.split_once('=').ok_or_else(|| {
        DockyardError::InvalidScale(format!("{} (expected: process=count)", arg))
    })?;
    if count.contains('=') {
        return Err(DockyardError::InvalidScale(format!(
            "{} (expected: process=count)",
            arg
        )));
    }

    let process_type = process_type.trim();
    validate_identifier("process type", process_type)
        .map_err(|_| DockyardError::InvalidScale(format!("invalid process type in {}", arg)))?;

    let count: i64 = count
        .trim()
        .parse()
        .map_err(|_| DockyardError::InvalidScale(format!("invalid count: {}", count)))?;
    if count < 0 {
        return Err(DockyardError::InvalidScale(format!(
            "count must be non-negative: {}",
            count
        )));
    }
    let count = usize::try_from(count)
        .map_err(|_| DockyardError::InvalidScale(format!("count too large: {}", count)))?;

    Ok((process_type.to_string(), count))
}

pub struct Scaler {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn ContainerRegistry>,
    ports: Arc<PortAllocator>,
    plugins: PluginHooks,
    locks: Arc<AppLocks>,
    layout: StorageLayout,
    options: ScalerOptions,
}

impl Scaler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn ContainerRegistry>,
        ports: Arc<PortAllocator>,
        plugins: PluginHooks,
        locks: Arc<AppLocks>,
        layout: StorageLayout,
        options: ScalerOptions,
    ) -> Self {
        Self {
            runtime,
            registry,
            ports,
            plugins,
            locks,
            layout,
            options,
        }
    }

    /// Bring `(app_name, process_type)` to `target` units
    pub async fn scale(
        &self,
        app_name: &str,
        process_type: &str,
        target: usize,
    ) -> Result<ScaleReport, DockyardError> {
        validate_identifier("app name", app_name)?;
        validate_identifier("process type", process_type)?;
        if process_type == PRIMARY_PROCESS_TYPE {
            return Err(DockyardError::InvalidScale(format!(
                "{} is reserved for the deployed unit",
                PRIMARY_PROCESS_TYPE
            )));
        }

        let _lock = self.locks.acquire(app_name).await?;

        let current = self.registry.list(app_name, process_type).await?;
        let mut report = ScaleReport {
            app_name: app_name.to_string(),
            process_type: process_type.to_string(),
            previous: current.len(),
            target,
            ..ScaleReport::default()
        };

        if target > current.len() {
            info!(
                "Scaling {} {} up: {} -> {}",
                app_name,
                process_type,
                current.len(),
                target
            );
            self.scale_up(app_name, process_type, target - current.len(), &mut report)
                .await?;
        } else if target < current.len() {
            info!(
                "Scaling {} {} down: {} -> {}",
                app_name,
                process_type,
                current.len(),
                target
            );
            let mut doomed = current;
            doomed.sort_by(|a, b| b.ordinal.cmp(&a.ordinal));
            doomed.truncate(report.previous - target);
            self.scale_down(doomed, &mut report).await;
        } else {
            info!("{} {} already at {} units", app_name, process_type, target);
        }

        if report.changed() {
            self.plugins.scale_changed(app_name, process_type).await;
        }
        Ok(report)
    }

    /// Apply several `(process_type, count)` targets in order
    pub async fn scale_many(
        &self,
        app_name: &str,
        targets: &[(String, usize)],
    ) -> Result<Vec<ScaleReport>, DockyardError> {
        let mut reports = Vec::with_capacity(targets.len());
        for (process_type, count) in targets {
            reports.push(self.scale(app_name, process_type, *count).await?);
        }
        Ok(reports)
    }

    async fn scale_up(
        &self,
        app_name: &str,
        process_type: &str,
        count: usize,
        report: &mut ScaleReport,
    ) -> Result<(), DockyardError> {
        let image = format!("{}:latest", app_name);
        let internal_port = self.options.internal_port(process_type);
        let env_file = self.layout.env_file(app_name);
        let env_file = if env_file.exists().await {
            Some(env_file.path().to_path_buf())
        } else {
            None
        };

        // Ordinals and ports are handed out sequentially
        let first = self.registry.next_ordinal(app_name, process_type).await?;
        let mut planned = Vec::with_capacity(count);
        for ordinal in (first..).take(count) {
            match self.ports.next_available_port().await {
                Ok(host_port) => planned.push((ordinal, host_port)),
                Err(e) => {
                    error!("No port for {}: {}", unit_name(app_name, process_type, ordinal), e);
                    report.failed.push(UnitFailure {
                        ordinal,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let results = join_all(planned.into_iter().map(|(ordinal, host_port)| {
            let record =
                ContainerRecord::new(app_name, process_type, ordinal, host_port, internal_port);
            let mut spec = ContainerSpec::new(record.name.clone(), image.clone());
            spec.ports = vec![format!("{}:{}", host_port, internal_port)];
            spec.env_file = env_file.clone();
            spec.restart_policy = RestartPolicy::Always;
            spec.limits = self.options.limits;
            async move {
                let result = self.start_unit(&spec, &record).await;
                (record, result)
            }
        }))
        .await;

        for (record, result) in results {
            match result {
                Ok(()) => {
                    info!("Started {} on host port {}", record.name, record.host_port);
                    report.created.push(record.ordinal);
                }
                Err(e) => {
                    error!("Failed to start {}: {}", record.name, e);
                    self.ports.release(record.host_port);
                    report.failed.push(UnitFailure {
                        ordinal: record.ordinal,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.created.sort_unstable();
        Ok(())
    }

    async fn start_unit(
        &self,
        spec: &ContainerSpec,
        record: &ContainerRecord,
    ) -> Result<(), DockyardError> {
        if !self.runtime.image_exists(&spec.image).await {
            return Err(DockyardError::ImageNotFound(spec.image.clone()));
        }
        self.runtime.create(spec).await?;

        if let Err(e) = self.registry.save(record).await {
            // A unit without a record would be invisible to later scaling
            if let Err(cleanup) = self.runtime.remove(&record.name, true).await {
                error!("Failed to remove unrecorded unit {}: {}", record.name, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn scale_down(&self, doomed: Vec<ContainerRecord>, report: &mut ScaleReport) {
        let results = join_all(doomed.into_iter().map(|record| async move {
            let result = self.remove_unit(&record).await;
            (record, result)
        }))
        .await;

        for (record, result) in results {
            match result {
                Ok(()) => {
                    info!("Removed {}", record.name);
                    report.removed.push(record.ordinal);
                }
                Err(e) => {
                    error!("Failed to remove {}: {}", record.name, e);
                    report.failed.push(UnitFailure {
                        ordinal: record.ordinal,
                        reason: e.to_string(),
                    });
                }
            }
        }
        report.removed.sort_unstable_by(|a, b| b.cmp(a));
    }

    async fn remove_unit(&self, record: &ContainerRecord) -> Result<(), DockyardError> {
        if self.runtime.exists(&record.name).await {
            if let Err(e) = self.runtime.stop(&record.name).await {
                warn!("Failed to stop {}: {}", record.name, e);
            }
            self.runtime.remove(&record.name, true).await?;
        }
        self.registry
            .remove(&record.app_name, &record.process_type, record.ordinal)
            .await?;
        self.ports.release(record.host_port);
        Ok(())
    }
}

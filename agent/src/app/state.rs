//! Platform state

use std::sync::Arc;

use tracing::info;

use crate::app::options::PlatformOptions;
use crate::deploy::orchestrator::Deployer;
use crate::errors::DockyardError;
use crate::health::HealthMonitor;
use crate::lock::AppLocks;
use crate::plugins::PluginHooks;
use crate::ports::PortAllocator;
use crate::process::ProcessManager;
use crate::registry::file::FileRegistry;
use crate::registry::ContainerRegistry;
use crate::rollback::RollbackController;
use crate::runtime::docker::DockerCli;
use crate::runtime::ContainerRuntime;
use crate::scale::Scaler;

/// Every component, wired to one runtime gateway and one registry
pub struct Platform {
    pub options: PlatformOptions,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub registry: Arc<dyn ContainerRegistry>,
    pub locks: Arc<AppLocks>,
    pub deployer: Deployer,
    pub scaler: Scaler,
    pub rollback: RollbackController,
    pub processes: ProcessManager,
}

impl Platform {
    /// Initialize the platform against the docker CLI and host port probes
    pub async fn init(options: PlatformOptions) -> Result<Self, DockyardError> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(
            options.runtime.binary.clone(),
            options.runtime.label_value.clone(),
        ));
        let (start, end) = options.port_range;
        let ports = PortAllocator::host(start, end);

        options.layout.setup().await?;
        Ok(Self::with_components(options, runtime, ports))
    }

    /// Wire the platform around a given runtime and port allocator
    pub fn with_components(
        options: PlatformOptions,
        runtime: Arc<dyn ContainerRuntime>,
        ports: PortAllocator,
    ) -> Self {
        info!(
            "Initializing platform state under {}",
            options.layout.base_dir.display()
        );

        let layout = options.layout.clone();
        let registry: Arc<dyn ContainerRegistry> = Arc::new(FileRegistry::new(layout.clone()));
        let locks = Arc::new(AppLocks::new(layout.locks_dir(), options.lock_timeout));
        let ports = Arc::new(ports);

        let deployer = Deployer::new(
            runtime.clone(),
            HealthMonitor::new(runtime.clone(), options.health.clone()),
            registry.clone(),
            locks.clone(),
            options.deployer.clone(),
        );
        let scaler = Scaler::new(
            runtime.clone(),
            registry.clone(),
            ports,
            PluginHooks::new(layout.plugins_dir(), options.hook_timeout),
            locks.clone(),
            layout,
            options.scaler.clone(),
        );
        let rollback =
            RollbackController::new(runtime.clone(), locks.clone(), options.rollback.clone());
        let processes = ProcessManager::new(runtime.clone(), registry.clone(), locks.clone());

        Self {
            options,
            runtime,
            registry,
            locks,
            deployer,
            scaler,
            rollback,
            processes,
        }
    }
}

//! Rollback controller tests

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use dockyard::app::options::PlatformOptions;
use dockyard::app::state::Platform;
use dockyard::deploy::config::DeploymentConfig;
use dockyard::deploy::orchestrator::DeployerOptions;
use dockyard::errors::DockyardError;
use dockyard::health::HealthMonitorOptions;
use dockyard::ports::{PortAllocator, StaticPortProbe};
use dockyard::rollback::RollbackOptions;
use dockyard::runtime::memory::MemoryRuntime;
use dockyard::runtime::{ContainerRuntime, RestartPolicy};
use dockyard::storage::layout::StorageLayout;

fn setup() -> (TempDir, Arc<MemoryRuntime>, Platform) {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(MemoryRuntime::new());

    let mut options = PlatformOptions::default();
    options.layout = StorageLayout::new(dir.path());
    options.lock_timeout = Duration::from_secs(5);
    options.health = HealthMonitorOptions {
        poll_interval: Duration::from_millis(1),
        no_healthcheck_grace: Duration::ZERO,
    };
    options.deployer = DeployerOptions {
        stop_settle: Duration::ZERO,
        start_verify: Duration::ZERO,
        pause_settle: Duration::ZERO,
        drain: Duration::ZERO,
        ..DeployerOptions::default()
    };
    options.rollback = RollbackOptions {
        settle: Duration::ZERO,
    };

    let ports = PortAllocator::new(40000, 40010, vec![Box::new(StaticPortProbe::new(Vec::new()))]);
    let platform = Platform::with_components(options, runtime.clone(), ports);
    (dir, runtime, platform)
}

#[tokio::test]
async fn test_rollback_without_previous() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);

    let err = platform.rollback.rollback("api").await.unwrap_err();
    assert!(matches!(err, DockyardError::NoPreviousContainer(_)));
    assert!(runtime.calls().is_empty());
    assert!(runtime.container("api").unwrap().running);
}

#[tokio::test]
async fn test_rollback_swaps_active_and_old() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v2", true);
    runtime.seed_running("api-old", "api:v1", true);
    runtime.stop("api-old").await.unwrap();

    platform.rollback.rollback("api").await.unwrap();

    let active = runtime.container("api").unwrap();
    let old = runtime.container("api-old").unwrap();
    assert_eq!(active.image, "api:v1");
    assert!(active.running);
    assert_eq!(active.restart_policy, RestartPolicy::Always);
    assert_eq!(old.image, "api:v2");
    assert!(!old.running);
    assert!(runtime.container("api-rollback").is_none());
}

#[tokio::test]
async fn test_second_rollback_rolls_forward() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);

    let layout = &platform.options.layout;
    let mut config = DeploymentConfig::new(
        "api",
        "v2",
        layout.env_file("api").path(),
        layout.releases_dir("api").path().join("v2"),
    );
    config.keep_previous = true;
    platform
        .deployer
        .deploy(&config, &CancellationToken::new())
        .await
        .unwrap();

    platform.rollback.rollback("api").await.unwrap();
    assert_eq!(runtime.container("api").unwrap().image, "api:v1");

    platform.rollback.rollback("api").await.unwrap();
    assert_eq!(runtime.container("api").unwrap().image, "api:v2");
    assert!(!runtime.container("api-old").unwrap().running);
}

#[tokio::test]
async fn test_rollback_without_active() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api-old", "api:v1", true);

    platform.rollback.rollback("api").await.unwrap();

    assert_eq!(runtime.names(), vec!["api".to_string()]);
    assert!(runtime.container("api").unwrap().running);
}

#[tokio::test]
async fn test_failed_restore_rename_keeps_active() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v2", true);
    runtime.seed_running("api-old", "api:v1", true);
    runtime.fail_on("rename", "api-old");

    let err = platform.rollback.rollback("api").await.unwrap_err();
    assert!(matches!(err, DockyardError::Runtime { op: "rename", .. }));

    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v2");
    assert!(active.running);
    assert!(runtime.container("api-rollback").is_none());
}

#[tokio::test]
async fn test_failed_start_brings_back_displaced_unit() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v2", true);
    runtime.seed_running("api-old", "api:v1", true);
    runtime.stop("api-old").await.unwrap();
    runtime.fail_next("start", "api");

    let err = platform.rollback.rollback("api").await.unwrap_err();
    assert!(matches!(err, DockyardError::Runtime { op: "start", .. }));

    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v2");
    assert!(active.running);
    let old = runtime.container("api-old").unwrap();
    assert_eq!(old.image, "api:v1");
    assert!(!old.running);
    assert!(runtime.container("api-rollback").is_none());
}

#[tokio::test]
async fn test_failed_start_without_active_keeps_previous() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api-old", "api:v1", true);
    runtime.stop("api-old").await.unwrap();
    runtime.fail_on("start", "api");

    assert!(platform.rollback.rollback("api").await.is_err());
    assert_eq!(runtime.names(), vec!["api-old".to_string()]);
}

#[tokio::test]
async fn test_rollback_unpauses_previous_unit() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v2", true);
    runtime.seed_running("api-old", "api:v1", true);
    runtime.pause("api-old").await.unwrap();

    platform.rollback.rollback("api").await.unwrap();

    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v1");
    assert!(active.running);
    assert!(!active.paused);
    assert!(runtime.calls().contains(&"unpause api".to_string()));
}

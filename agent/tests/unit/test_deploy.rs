//! Deployment orchestrator tests

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use dockyard::app::options::PlatformOptions;
use dockyard::app::state::Platform;
use dockyard::deploy::config::DeploymentConfig;
use dockyard::deploy::fsm::{ReleaseState, Strategy};
use dockyard::deploy::orchestrator::DeployerOptions;
use dockyard::errors::DockyardError;
use dockyard::health::{HealthMonitorOptions, HealthOutcome};
use dockyard::ports::{PortAllocator, StaticPortProbe};
use dockyard::registry::record::PRIMARY_PROCESS_TYPE;
use dockyard::rollback::RollbackOptions;
use dockyard::runtime::memory::MemoryRuntime;
use dockyard::runtime::{HealthState, RestartPolicy};
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

fn config(platform: &Platform, tag: &str) -> DeploymentConfig {
    let layout = &platform.options.layout;
    DeploymentConfig::new(
        "api",
        tag,
        layout.env_file("api").path(),
        layout.releases_dir("api").path().join(tag),
    )
}

fn write_env(platform: &Platform, contents: &str) {
    let env_file = platform.options.layout.env_file("api");
    std::fs::create_dir_all(env_file.path().parent().unwrap()).unwrap();
    std::fs::write(env_file.path(), contents).unwrap();
}

#[tokio::test]
async fn test_first_deploy_activates_staging() {
    let (_dir, runtime, platform) = setup();

    let report = platform
        .deployer
        .deploy(&config(&platform, "v1"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::BlueGreen);
    assert_eq!(report.active, "api");
    assert_eq!(report.health, Some(HealthOutcome::NoHealthcheck));
    assert_eq!(report.phases.last(), Some(&ReleaseState::Completed));
    assert!(!report.phases.contains(&ReleaseState::Draining));

    let active = runtime.container("api").unwrap();
    assert!(active.running);
    assert_eq!(active.image, "api:v1");
    assert_eq!(active.restart_policy, RestartPolicy::Always);
    assert_eq!(runtime.names(), vec!["api".to_string()]);

    let spec = active.spec.unwrap();
    assert_eq!(spec.working_dir.as_deref(), Some("/app"));
    assert!(spec.volumes[0].ends_with(":/app"));
    assert!(spec.env_file.is_none());

    let record = platform
        .registry
        .get("api", PRIMARY_PROCESS_TYPE, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.name, "api");
}

#[tokio::test]
async fn test_first_deploy_removes_leftover_old() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api-old", "api:v0", true);

    platform
        .deployer
        .deploy(&config(&platform, "v1"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(runtime.container("api").unwrap().running);
    assert_eq!(runtime.names(), vec!["api".to_string()]);
}

#[tokio::test]
async fn test_first_deploy_stops_leftover_old_when_kept() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api-old", "api:v0", true);

    let mut config = config(&platform, "v1");
    config.keep_previous = true;
    platform
        .deployer
        .deploy(&config, &CancellationToken::new())
        .await
        .unwrap();

    assert!(runtime.container("api").unwrap().running);
    let old = runtime.container("api-old").unwrap();
    assert_eq!(old.image, "api:v0");
    assert!(!old.running);
}

#[tokio::test]
async fn test_swap_replaces_active() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    runtime.set_health("api-green", HealthState::Healthy);

    let report = platform
        .deployer
        .deploy(&config(&platform, "v2"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.health, Some(HealthOutcome::Healthy));
    assert!(report.phases.contains(&ReleaseState::Draining));

    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v2");
    assert!(active.running);
    assert!(!active.paused);
    assert_eq!(runtime.names(), vec!["api".to_string()]);

    let calls = runtime.calls();
    let pause = calls.iter().position(|c| c == "pause api").unwrap();
    let aside = calls.iter().position(|c| c == "rename api api-old").unwrap();
    let promote = calls.iter().position(|c| c == "rename api-green api").unwrap();
    assert!(pause < aside && aside < promote);
}

#[tokio::test]
async fn test_health_timeout_keeps_active() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    runtime.set_health("api-green", HealthState::Starting);

    let mut config = config(&platform, "v2");
    config.health_timeout_secs = 0;
    let err = platform
        .deployer
        .deploy(&config, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DockyardError::HealthTimeout { .. }));
    let active = runtime.container("api").unwrap();
    assert!(active.running);
    assert!(!active.paused);
    assert_eq!(active.image, "api:v1");
    assert!(runtime.container("api-green").is_none());
}

#[tokio::test]
async fn test_unhealthy_staging_is_removed() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    runtime.set_health("api-green", HealthState::Unhealthy);

    let err = platform
        .deployer
        .deploy(&config(&platform, "v2"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DockyardError::Unhealthy { name, logs } => {
            assert_eq!(name, "api-green");
            assert_eq!(logs, "logs of api-green");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.names(), vec!["api".to_string()]);
    assert!(!runtime.calls().iter().any(|c| c.starts_with("pause") || c.starts_with("rename")));
}

#[tokio::test]
async fn test_cancelled_health_wait() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    runtime.set_health("api-green", HealthState::Starting);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = platform
        .deployer
        .deploy(&config(&platform, "v2"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DockyardError::Cancelled(_)));
    assert_eq!(runtime.names(), vec!["api".to_string()]);
}

#[tokio::test]
async fn test_failed_promotion_restores_active() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    runtime.fail_on("rename", "api-green");

    let err = platform
        .deployer
        .deploy(&config(&platform, "v2"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DockyardError::Runtime { op: "rename", .. }));
    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v1");
    assert!(active.running);
    assert!(!active.paused);
    assert_eq!(runtime.names(), vec!["api".to_string()]);
}

#[tokio::test]
async fn test_keep_previous_leaves_one_running() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);

    let mut config = config(&platform, "v2");
    config.keep_previous = true;
    platform
        .deployer
        .deploy(&config, &CancellationToken::new())
        .await
        .unwrap();

    let active = runtime.container("api").unwrap();
    let old = runtime.container("api-old").unwrap();
    assert_eq!(active.image, "api:v2");
    assert_eq!(old.image, "api:v1");
    assert!(active.running);
    assert!(!old.running);
}

#[tokio::test]
async fn test_standard_deploy_when_zero_downtime_disabled() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);
    write_env(&platform, "ZERO_DOWNTIME=false\nPORT=3000\n");

    let report = platform
        .deployer
        .deploy(&config(&platform, "v2"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.strategy, Strategy::Standard);
    assert_eq!(report.container_port, Some(3000));
    assert!(report.health.is_none());

    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v2");
    assert_eq!(active.restart_policy, RestartPolicy::No);
    let spec = active.spec.unwrap();
    assert_eq!(spec.ports, vec!["3000:3000".to_string()]);
    assert!(spec.env_file.is_some());
    assert!(!runtime.calls().iter().any(|c| c.contains("api-green")));

    let record = platform
        .registry
        .get("api", PRIMARY_PROCESS_TYPE, 1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((record.host_port, record.internal_port), (3000, 3000));
}

#[tokio::test]
async fn test_standard_deploy_exit_is_start_failure() {
    let (_dir, runtime, platform) = setup();
    write_env(&platform, "ZERO_DOWNTIME=0\n");
    runtime.exit_on_create("api");

    let err = platform
        .deployer
        .deploy(&config(&platform, "v1"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        DockyardError::StartFailed { name, logs } => {
            assert_eq!(name, "api");
            assert_eq!(logs, "logs of api");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_recreate_active_keeps_image() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v7", true);
    write_env(&platform, "PORT=5000\n");

    let layout = &platform.options.layout;
    let report = platform
        .deployer
        .recreate_active(
            "api",
            layout.env_file("api").path(),
            &layout.releases_dir("api").path().join("v7"),
        )
        .await
        .unwrap();

    assert_eq!(report.image, "api:v7");
    let active = runtime.container("api").unwrap();
    assert_eq!(active.image, "api:v7");
    assert_eq!(active.restart_policy, RestartPolicy::Always);
    assert_eq!(active.spec.unwrap().ports, vec!["5000:5000".to_string()]);
}

#[tokio::test]
async fn test_recreate_without_active_fails() {
    let (_dir, _runtime, platform) = setup();
    let layout = &platform.options.layout;

    let err = platform
        .deployer
        .recreate_active("api", layout.env_file("api").path(), layout.base_dir.as_path())
        .await
        .unwrap_err();
    assert!(matches!(err, DockyardError::ContainerNotFound(_)));
}

#[tokio::test]
async fn test_invalid_app_name_rejected() {
    let (_dir, runtime, platform) = setup();
    let layout = &platform.options.layout;
    let config = DeploymentConfig::new("../api", "v1", layout.env_file("api").path(), &layout.base_dir);

    let err = platform
        .deployer
        .deploy(&config, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DockyardError::ConfigError(_)));
    assert!(runtime.calls().is_empty());
}

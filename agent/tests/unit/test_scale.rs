//! Scaling controller tests

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use dockyard::app::options::PlatformOptions;
use dockyard::app::state::Platform;
use dockyard::errors::DockyardError;
use dockyard::ports::{PortAllocator, StaticPortProbe};
use dockyard::registry::record::PRIMARY_PROCESS_TYPE;
use dockyard::runtime::memory::MemoryRuntime;
use dockyard::runtime::{ContainerRuntime, RestartPolicy};
use dockyard::storage::layout::StorageLayout;

fn setup_with_ports(start: u16, end: u16, bound: Vec<u16>) -> (TempDir, Arc<MemoryRuntime>, Platform) {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(MemoryRuntime::new());

    let mut options = PlatformOptions::default();
    options.layout = StorageLayout::new(dir.path());
    options.lock_timeout = Duration::from_secs(5);

    let ports = PortAllocator::new(start, end, vec![Box::new(StaticPortProbe::new(bound))]);
    let platform = Platform::with_components(options, runtime.clone(), ports);
    (dir, runtime, platform)
}

fn setup() -> (TempDir, Arc<MemoryRuntime>, Platform) {
    setup_with_ports(40000, 40010, Vec::new())
}

async fn ordinals(platform: &Platform, process_type: &str) -> Vec<u32> {
    platform
        .registry
        .list("api", process_type)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.ordinal)
        .collect()
}

#[tokio::test]
async fn test_scale_up_then_down() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");

    let report = platform.scaler.scale("api", "web", 2).await.unwrap();
    assert_eq!(report.created, vec![1, 2]);

    let report = platform.scaler.scale("api", "web", 5).await.unwrap();
    assert_eq!(report.previous, 2);
    assert_eq!(report.created, vec![3, 4, 5]);
    assert!(report.failed.is_empty());

    let records = platform.registry.list("api", "web").await.unwrap();
    let mut host_ports: Vec<u16> = records.iter().map(|r| r.host_port).collect();
    host_ports.sort_unstable();
    host_ports.dedup();
    assert_eq!(host_ports.len(), 5);

    let unit = runtime.container("api-web-3").unwrap();
    assert_eq!(unit.image, "api:latest");
    assert_eq!(unit.restart_policy, RestartPolicy::Always);
    let spec = unit.spec.unwrap();
    assert_eq!(spec.ports, vec![format!("{}:8080", records[2].host_port)]);

    let report = platform.scaler.scale("api", "web", 2).await.unwrap();
    assert_eq!(report.removed, vec![5, 4, 3]);
    assert_eq!(ordinals(&platform, "web").await, vec![1, 2]);
    assert_eq!(
        runtime.names(),
        vec!["api-web-1".to_string(), "api-web-2".to_string()]
    );
}

#[tokio::test]
async fn test_scale_to_current_count_is_noop() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "worker", 2).await.unwrap();
    let calls = runtime.calls().len();

    let report = platform.scaler.scale("api", "worker", 2).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(runtime.calls().len(), calls);
}

#[tokio::test]
async fn test_ordinals_continue_after_gap() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "web", 3).await.unwrap();
    platform.registry.remove("api", "web", 2).await.unwrap();

    let report = platform.scaler.scale("api", "web", 3).await.unwrap();
    assert_eq!(report.created, vec![4]);
    assert_eq!(ordinals(&platform, "web").await, vec![1, 3, 4]);
}

#[tokio::test]
async fn test_missing_image_fails_each_unit() {
    let (_dir, runtime, platform) = setup();

    let report = platform.scaler.scale("api", "web", 2).await.unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].reason.contains("api:latest"));
    assert!(ordinals(&platform, "web").await.is_empty());
    assert!(runtime.names().is_empty());

    // Ports handed out to the failed units are free again
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "web", 2).await.unwrap();
    let records = platform.registry.list("api", "web").await.unwrap();
    let host_ports: Vec<u16> = records.iter().map(|r| r.host_port).collect();
    assert_eq!(host_ports, vec![40000, 40001]);
}

#[tokio::test]
async fn test_create_failure_only_affects_that_unit() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    runtime.fail_on("create", "api-web-2");

    let report = platform.scaler.scale("api", "web", 3).await.unwrap();
    assert_eq!(report.created, vec![1, 3]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].ordinal, 2);
    assert_eq!(ordinals(&platform, "web").await, vec![1, 3]);
}

#[tokio::test]
async fn test_ports_exhausted() {
    let (_dir, runtime, platform) = setup_with_ports(40000, 40001, vec![40000]);
    runtime.add_image("api:latest");

    let report = platform.scaler.scale("api", "web", 3).await.unwrap();
    assert_eq!(report.created, vec![1]);
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .all(|f| f.reason.contains("No available ports")));

    let record = platform.registry.get("api", "web", 1).await.unwrap().unwrap();
    assert_eq!(record.host_port, 40001);
}

#[tokio::test]
async fn test_scale_down_of_vanished_unit() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "web", 2).await.unwrap();
    runtime.remove("api-web-2", true).await.unwrap();

    let report = platform.scaler.scale("api", "web", 1).await.unwrap();
    assert_eq!(report.removed, vec![2]);
    assert_eq!(ordinals(&platform, "web").await, vec![1]);
}

#[tokio::test]
async fn test_primary_process_type_rejected() {
    let (_dir, _runtime, platform) = setup();

    let err = platform
        .scaler
        .scale("api", PRIMARY_PROCESS_TYPE, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, DockyardError::InvalidScale(_)));
}

#[tokio::test]
async fn test_scale_many() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");

    let reports = platform
        .scaler
        .scale_many("api", &[("web".to_string(), 2), ("worker".to_string(), 1)])
        .await
        .unwrap();
    assert_eq!(reports.len(), 2);

    let all = platform.registry.list_all("api").await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["api-web-1", "api-web-2", "api-worker-1"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_scale_change_hook_runs() {
    use std::os::unix::fs::PermissionsExt;

    let (dir, runtime, platform) = setup();
    runtime.add_image("api:latest");

    let hooks = platform.options.layout.plugins_dir().path().join("notify/hooks");
    std::fs::create_dir_all(&hooks).unwrap();
    let marker = dir.path().join("hook.out");
    let hook = hooks.join("scale-change");
    std::fs::write(
        &hook,
        format!("#!/bin/sh\necho \"$1 $2\" >> {}\n", marker.display()),
    )
    .unwrap();
    std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

    platform.scaler.scale("api", "web", 1).await.unwrap();
    // Unchanged counts do not notify
    platform.scaler.scale("api", "web", 1).await.unwrap();

    let output = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(output, "api web\n");
}

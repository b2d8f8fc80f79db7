//! Process start/stop/restart tests

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use dockyard::app::options::PlatformOptions;
use dockyard::app::state::Platform;
use dockyard::ports::{PortAllocator, StaticPortProbe};
use dockyard::registry::record::ContainerStatus;
use dockyard::runtime::memory::MemoryRuntime;
use dockyard::storage::layout::StorageLayout;

fn setup() -> (TempDir, Arc<MemoryRuntime>, Platform) {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(MemoryRuntime::new());

    let mut options = PlatformOptions::default();
    options.layout = StorageLayout::new(dir.path());
    options.lock_timeout = Duration::from_secs(5);

    let ports = PortAllocator::new(40000, 40010, vec![Box::new(StaticPortProbe::new(Vec::new()))]);
    let platform = Platform::with_components(options, runtime.clone(), ports);
    (dir, runtime, platform)
}

#[tokio::test]
async fn test_stop_and_start_recorded_units() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "web", 2).await.unwrap();
    platform.scaler.scale("api", "worker", 1).await.unwrap();

    let report = platform.processes.stop("api", Some("web")).await.unwrap();
    assert_eq!(report.succeeded, vec!["api-web-1", "api-web-2"]);
    assert!(!report.discovered);
    assert!(!runtime.container("api-web-1").unwrap().running);
    assert!(runtime.container("api-worker-1").unwrap().running);

    let statuses = platform.processes.status("api").await.unwrap();
    let web: Vec<_> = statuses
        .iter()
        .filter(|s| s.record.process_type == "web")
        .collect();
    assert!(web
        .iter()
        .all(|s| !s.running && s.record.status == ContainerStatus::Stopped));

    let report = platform.processes.start("api", None).await.unwrap();
    assert_eq!(report.succeeded.len(), 3);
    assert!(platform
        .processes
        .status("api")
        .await
        .unwrap()
        .iter()
        .all(|s| s.running && s.record.status == ContainerStatus::Running));
}

#[tokio::test]
async fn test_failure_does_not_stop_the_batch() {
    let (_dir, runtime, platform) = setup();
    runtime.add_image("api:latest");
    platform.scaler.scale("api", "web", 2).await.unwrap();
    runtime.fail_on("restart", "api-web-1");

    let report = platform.processes.restart("api", Some("web")).await.unwrap();
    assert_eq!(report.succeeded, vec!["api-web-2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "api-web-1");
}

#[tokio::test]
async fn test_discovers_unrecorded_units() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", false);
    runtime.seed_running("api-web-1", "api:latest", true);
    runtime.seed_running("apiary", "apiary:v1", true);

    let report = platform.processes.stop("api", None).await.unwrap();
    assert!(report.discovered);
    assert_eq!(report.succeeded, vec!["api", "api-web-1"]);
    assert!(runtime.container("apiary").unwrap().running);
}

#[tokio::test]
async fn test_unknown_process_type_finds_nothing() {
    let (_dir, runtime, platform) = setup();
    runtime.seed_running("api", "api:v1", true);

    let report = platform.processes.stop("api", Some("web")).await.unwrap();
    assert!(report.succeeded.is_empty());
    assert!(report.failed.is_empty());
    assert!(runtime.container("api").unwrap().running);
}

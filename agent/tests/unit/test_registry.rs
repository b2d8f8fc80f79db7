//! Container registry tests

use tempfile::TempDir;

use dockyard::errors::DockyardError;
use dockyard::registry::file::FileRegistry;
use dockyard::registry::record::{ContainerRecord, ContainerStatus};
use dockyard::registry::ContainerRegistry;
use dockyard::storage::layout::StorageLayout;

fn registry() -> (TempDir, FileRegistry) {
    let dir = TempDir::new().unwrap();
    let registry = FileRegistry::new(StorageLayout::new(dir.path()));
    (dir, registry)
}

#[tokio::test]
async fn test_save_and_get() {
    let (_dir, registry) = registry();
    let record = ContainerRecord::new("api", "web", 1, 40000, 8080);

    registry.save(&record).await.unwrap();
    let loaded = registry.get("api", "web", 1).await.unwrap().unwrap();

    assert_eq!(loaded, record);
    assert_eq!(loaded.name, "api-web-1");
    assert_eq!(loaded.status, ContainerStatus::Running);
    assert!(registry.get("api", "web", 2).await.unwrap().is_none());
}

#[tokio::test]
async fn test_next_ordinal() {
    let (_dir, registry) = registry();
    assert_eq!(registry.next_ordinal("api", "web").await.unwrap(), 1);

    for ordinal in [1, 2, 7] {
        registry
            .save(&ContainerRecord::new("api", "web", ordinal, 40000 + ordinal as u16, 8080))
            .await
            .unwrap();
    }
    assert_eq!(registry.next_ordinal("api", "web").await.unwrap(), 8);
    assert_eq!(registry.next_ordinal("api", "worker").await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_is_sorted() {
    let (_dir, registry) = registry();
    for (process_type, ordinal) in [("worker", 1), ("web", 10), ("web", 2), ("web", 1)] {
        registry
            .save(&ContainerRecord::new("api", process_type, ordinal, 40000, 8080))
            .await
            .unwrap();
    }

    let web: Vec<u32> = registry
        .list("api", "web")
        .await
        .unwrap()
        .iter()
        .map(|r| r.ordinal)
        .collect();
    assert_eq!(web, vec![1, 2, 10]);

    let all: Vec<String> = registry
        .list_all("api")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(all, vec!["api-web-1", "api-web-2", "api-web-10", "api-worker-1"]);
}

#[tokio::test]
async fn test_unknown_app_is_empty() {
    let (_dir, registry) = registry();
    assert!(registry.list("ghost", "web").await.unwrap().is_empty());
    assert!(registry.list_all("ghost").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let (_dir, registry) = registry();
    registry
        .save(&ContainerRecord::new("api", "web", 1, 40000, 8080))
        .await
        .unwrap();

    registry.remove("api", "web", 1).await.unwrap();
    registry.remove("api", "web", 1).await.unwrap();
    assert!(registry.list("api", "web").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_status() {
    let (_dir, registry) = registry();
    registry
        .save(&ContainerRecord::new("api", "web", 1, 40000, 8080))
        .await
        .unwrap();

    let updated = registry
        .update_status("api", "web", 1, ContainerStatus::Stopped)
        .await
        .unwrap();
    assert_eq!(updated.status, ContainerStatus::Stopped);
    assert_eq!(
        registry.get("api", "web", 1).await.unwrap().unwrap().status,
        ContainerStatus::Stopped
    );

    let err = registry
        .update_status("api", "web", 9, ContainerStatus::Stopped)
        .await
        .unwrap_err();
    assert!(matches!(err, DockyardError::ContainerNotFound(name) if name == "api-web-9"));
}

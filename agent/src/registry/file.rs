//! File-backed container registry
//!
//! One JSON document per unit at
//! `{base}/apps/{app}/containers/{process_type}/{ordinal}.json`. Each write
//! goes through a temp file and a rename, so records of different ordinals
//! never share a file and a reader never sees a half-written record.

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::DockyardError;
use crate::filesys::file::File;
use crate::registry::record::{validate_identifier, ContainerRecord};
use crate::registry::ContainerRegistry;
use crate::storage::layout::StorageLayout;

/// Registry storing records under a [`StorageLayout`]
#[derive(Debug, Clone)]
pub struct FileRegistry {
    layout: StorageLayout,
}

impl FileRegistry {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    fn record_file(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
    ) -> Result<File, DockyardError> {
        validate_identifier("app name", app_name)?;
        validate_identifier("process type", process_type)?;
        Ok(self.layout.container_file(app_name, process_type, ordinal))
    }

    /// Read one record file; unreadable or corrupted files yield `None`
    async fn read_record(path: &Path) -> Option<ContainerRecord> {
        match File::new(path).read_json::<ContainerRecord>().await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable container record {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl ContainerRegistry for FileRegistry {
    async fn save(&self, record: &ContainerRecord) -> Result<(), DockyardError> {
        let file = self.record_file(&record.app_name, &record.process_type, record.ordinal)?;
        file.write_json(record).await.map_err(|e| {
            DockyardError::StorageError(format!("failed to save {}: {}", record.name, e))
        })
    }

    async fn get(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
    ) -> Result<Option<ContainerRecord>, DockyardError> {
        let file = self.record_file(app_name, process_type, ordinal)?;
        if !file.exists().await {
            return Ok(None);
        }
        file.read_json().await.map(Some)
    }

    async fn list(
        &self,
        app_name: &str,
        process_type: &str,
    ) -> Result<Vec<ContainerRecord>, DockyardError> {
        validate_identifier("app name", app_name)?;
        validate_identifier("process type", process_type)?;

        let files = self
            .layout
            .process_dir(app_name, process_type)
            .list_files()
            .await?;

        let mut records = Vec::new();
        for path in files {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = Self::read_record(&path).await {
                records.push(record);
            }
        }

        records.sort_by_key(|r| r.ordinal);
        Ok(records)
    }

    async fn list_all(&self, app_name: &str) -> Result<Vec<ContainerRecord>, DockyardError> {
        validate_identifier("app name", app_name)?;

        let process_dirs = self.layout.containers_dir(app_name).list_dirs().await?;

        let mut records = Vec::new();
        for dir in process_dirs {
            let Some(process_type) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.list(app_name, process_type).await {
                Ok(mut found) => records.append(&mut found),
                Err(e) => warn!("Skipping process type {}: {}", process_type, e),
            }
        }

        records.sort_by(|a, b| {
            a.process_type
                .cmp(&b.process_type)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        Ok(records)
    }

    async fn remove(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
    ) -> Result<(), DockyardError> {
        self.record_file(app_name, process_type, ordinal)?
            .delete()
            .await
    }
}

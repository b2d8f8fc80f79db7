//! Container registry: the on-disk inventory of scaled units

pub mod file;
pub mod record;

use async_trait::async_trait;

use crate::errors::DockyardError;
use crate::registry::record::{ContainerRecord, ContainerStatus};

/// Inventory of units keyed by `(app_name, process_type, ordinal)`
#[async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Insert or replace a record
    async fn save(&self, record: &ContainerRecord) -> Result<(), DockyardError>;

    async fn get(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
    ) -> Result<Option<ContainerRecord>, DockyardError>;

    /// Records of one process type, sorted by ordinal
    async fn list(
        &self,
        app_name: &str,
        process_type: &str,
    ) -> Result<Vec<ContainerRecord>, DockyardError>;

    /// Records of every process type, sorted by process type then ordinal
    async fn list_all(&self, app_name: &str) -> Result<Vec<ContainerRecord>, DockyardError>;

    /// Delete a record. Deleting an absent record succeeds.
    async fn remove(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
    ) -> Result<(), DockyardError>;

    /// `max(existing ordinals) + 1`, or 1 when there are none
    async fn next_ordinal(&self, app_name: &str, process_type: &str) -> Result<u32, DockyardError> {
        let records = self.list(app_name, process_type).await?;
        Ok(records.iter().map(|r| r.ordinal).max().unwrap_or(0) + 1)
    }

    /// Read-modify-write of a record's status
    async fn update_status(
        &self,
        app_name: &str,
        process_type: &str,
        ordinal: u32,
        status: ContainerStatus,
    ) -> Result<ContainerRecord, DockyardError> {
        let mut record = self
            .get(app_name, process_type, ordinal)
            .await?
            .ok_or_else(|| {
                DockyardError::ContainerNotFound(record::unit_name(app_name, process_type, ordinal))
            })?;
        record.status = status;
        self.save(&record).await?;
        Ok(record)
    }
}

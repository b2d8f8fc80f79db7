//! Release directories of an application
//!
//! Each release is a directory under `apps/{app}/releases/`, mounted into the
//! unit at deploy time. A `current` symlink, when present, names the release
//! the active unit runs.

use std::path::PathBuf;

use serde::Serialize;

use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::registry::record::validate_identifier;
use crate::storage::layout::StorageLayout;

/// Name of the link to the running release
pub const CURRENT_RELEASE_LINK: &str = "current";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub id: String,
    pub path: PathBuf,
    pub current: bool,
}

/// Releases of `app_name`, sorted by id. A missing directory lists as empty.
pub async fn list_releases(
    layout: &StorageLayout,
    app_name: &str,
) -> Result<Vec<Release>, DockyardError> {
    validate_identifier("app name", app_name)?;
    let releases_dir = layout.releases_dir(app_name);
    let current = current_release(&releases_dir).await;

    Ok(releases_dir
        .list_dirs()
        .await?
        .into_iter()
        .filter_map(|path| {
            let id = path.file_name()?.to_str()?.to_string();
            if id == CURRENT_RELEASE_LINK {
                return None;
            }
            Some(Release {
                current: current.as_deref() == Some(id.as_str()),
                id,
                path,
            })
        })
        .collect())
}

async fn current_release(releases_dir: &Dir) -> Option<String> {
    let target = tokio::fs::read_link(releases_dir.path().join(CURRENT_RELEASE_LINK))
        .await
        .ok()?;
    target.file_name()?.to_str().map(str::to_string)
}

//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DockyardError;
use crate::filesys::file::File;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DockyardError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// List the files in the directory. A missing directory lists as empty.
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, DockyardError> {
        self.list(false).await
    }

    /// List the subdirectories. A missing directory lists as empty.
    pub async fn list_dirs(&self) -> Result<Vec<PathBuf>, DockyardError> {
        self.list(true).await
    }

    async fn list(&self, dirs: bool) -> Result<Vec<PathBuf>, DockyardError> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if (dirs && file_type.is_dir()) || (!dirs && file_type.is_file()) {
                paths.push(entry.path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

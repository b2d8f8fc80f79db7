//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the base directory
pub const ROOT_ENV_VAR: &str = "DOCKYARD_ROOT";

/// On-disk layout of the platform
///
/// ```text
/// {base}/settings.json
/// {base}/apps/{app}/containers/{process_type}/{ordinal}.json
/// {base}/apps/{app}/shared/.env
/// {base}/apps/{app}/releases/{release}
/// {base}/plugins/{plugin}/hooks/scale-change
/// {base}/locks/{app}.lock
/// {base}/logs
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the directory holding every application
    pub fn apps_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("apps"))
    }

    /// Get an application's directory
    pub fn app_dir(&self, app_name: &str) -> Dir {
        self.apps_dir().subdir(app_name)
    }

    /// Get the container records directory of an application
    pub fn containers_dir(&self, app_name: &str) -> Dir {
        self.app_dir(app_name).subdir("containers")
    }

    /// Get the container records directory of one process type
    pub fn process_dir(&self, app_name: &str, process_type: &str) -> Dir {
        self.containers_dir(app_name).subdir(process_type)
    }

    /// Get the record file of one unit
    pub fn container_file(&self, app_name: &str, process_type: &str, ordinal: u32) -> File {
        self.process_dir(app_name, process_type)
            .file(&format!("{}.json", ordinal))
    }

    /// Get the shared environment file of an application
    pub fn env_file(&self, app_name: &str) -> File {
        self.app_dir(app_name).subdir("shared").file(".env")
    }

    /// Get the releases directory of an application
    pub fn releases_dir(&self, app_name: &str) -> Dir {
        self.app_dir(app_name).subdir("releases")
    }

    /// Get the plugins directory
    pub fn plugins_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("plugins"))
    }

    /// Get the per-application lock directory
    pub fn locks_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("locks"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DockyardError> {
        self.apps_dir().create().await?;
        self.plugins_dir().create().await?;
        self.locks_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = std::env::var_os(ROOT_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/opt/dockyard"));
        Self::new(base_dir)
    }
}

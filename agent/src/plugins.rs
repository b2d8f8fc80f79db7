//! Plugin scale-change hooks

use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::DockyardError;
use crate::filesys::dir::Dir;

/// Hook executable path relative to a plugin's install directory
pub const SCALE_CHANGE_HOOK: &str = "hooks/scale-change";

/// Hooks run while the application lock is held; one that outlives this is killed
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches notifications to installed plugins
#[derive(Debug, Clone)]
pub struct PluginHooks {
    plugins_dir: Dir,
    timeout: Duration,
}

impl PluginHooks {
    pub fn new(plugins_dir: Dir, timeout: Duration) -> Self {
        Self {
            plugins_dir,
            timeout,
        }
    }

    /// Run every installed plugin's scale-change hook with `(app, process_type)`.
    ///
    /// Returns how many hooks ran. Missing hooks and hook failures are ignored.
    pub async fn scale_changed(&self, app_name: &str, process_type: &str) -> usize {
        let plugins = match self.plugins_dir.list_dirs().await {
            Ok(plugins) => plugins,
            Err(e) => {
                warn!("Failed to list plugins: {}", e);
                return 0;
            }
        };

        let mut ran = 0;
        for plugin in plugins {
            let hook = plugin.join(SCALE_CHANGE_HOOK);
            if !tokio::fs::try_exists(&hook).await.unwrap_or(false) {
                continue;
            }

            ran += 1;
            match run_hook(&hook, app_name, process_type, self.timeout).await {
                Ok(()) => info!("Scale hook {} completed", hook.display()),
                Err(e) => warn!("Scale hook {} failed: {}", hook.display(), e),
            }
        }
        ran
    }
}

async fn run_hook(
    hook: &std::path::Path,
    app_name: &str,
    process_type: &str,
    timeout: Duration,
) -> Result<(), DockyardError> {
    let mut command = Command::new(hook);
    command.arg(app_name).arg(process_type).kill_on_drop(true);
    let output = tokio::time::timeout(timeout, command.output()).await.map_err(|_| {
        DockyardError::PluginError(format!(
            "{} killed after {}s",
            hook.display(),
            timeout.as_secs_f64()
        ))
    })??;

    debug!(
        "Hook {} exited with {}: {}",
        hook.display(),
        output.status,
        String::from_utf8_lossy(&output.stdout).trim()
    );
    Ok(())
}

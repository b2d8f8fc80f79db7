//! Per-application operation lock
//!
//! `deploy`, `rollback` and `scale` on the same application are serialised
//! twice: by an async mutex keyed by app name within this process, and by an
//! exclusive lock file `{base}/locks/{app}.lock` across processes. The lock
//! file holds the owner's pid; a file whose pid is no longer alive is
//! reclaimed. Both are released when the [`AppLockGuard`] drops.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::io::AsyncWriteExt;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::DockyardError;
use crate::filesys::dir::Dir;
use crate::registry::record::validate_identifier;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Held application lock
#[derive(Debug)]
pub struct AppLockGuard {
    app_name: String,
    path: PathBuf,
    token: String,
    _in_process: OwnedMutexGuard<()>,
}

impl AppLockGuard {
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AppLockGuard {
    fn drop(&mut self) {
        // Only remove the file if it is still ours
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.contains(&self.token) => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!("Failed to release lock {}: {}", self.path.display(), e);
                }
            }
            Ok(_) => warn!("Lock {} was taken over by another owner", self.path.display()),
            Err(e) => debug!("Lock {} already gone: {}", self.path.display(), e),
        }
    }
}

/// Registry of application locks
pub struct AppLocks {
    locks_dir: Dir,
    timeout: Duration,
    in_process: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppLocks {
    pub fn new(locks_dir: Dir, timeout: Duration) -> Self {
        Self {
            locks_dir,
            timeout,
            in_process: Mutex::new(HashMap::new()),
        }
    }

    fn app_mutex(&self, app_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.in_process.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(app_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Acquire the lock of `app_name`, waiting up to the configured timeout
    pub async fn acquire(&self, app_name: &str) -> Result<AppLockGuard, DockyardError> {
        validate_identifier("app name", app_name)?;
        let deadline = Instant::now() + self.timeout;

        let in_process = tokio::time::timeout_at(deadline, self.app_mutex(app_name).lock_owned())
            .await
            .map_err(|_| {
                DockyardError::LockError(format!(
                    "timed out after {}s waiting for another operation on {}",
                    self.timeout.as_secs(),
                    app_name
                ))
            })?;

        self.locks_dir.create().await?;
        let path = self.locks_dir.path().join(format!("{}.lock", app_name));
        let token = Uuid::new_v4().to_string();

        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let contents = format!("{} {}\n", std::process::id(), token);
                    file.write_all(contents.as_bytes()).await?;
                    file.sync_all().await?;
                    debug!("Acquired lock {}", path.display());
                    return Ok(AppLockGuard {
                        app_name: app_name.to_string(),
                        path,
                        token,
                        _in_process: in_process,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if reclaim_if_stale(&path).await {
                        continue;
                    }
                    if Instant::now() >= deadline {
                        let marker = reclaim_marker(&path);
                        let held = if marker.exists() { &marker } else { &path };
                        return Err(DockyardError::LockError(format!(
                            "{} is locked by another process ({}); remove the file if no dockyard process is running",
                            app_name,
                            held.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Remove a lock file whose owner pid is no longer alive.
///
/// Waiters reclaim one at a time under `{app}.reclaim`, created exclusively,
/// and only remove the lock file if it still holds the dead owner's line.
/// Otherwise a slower waiter could delete the lock a faster one just took.
async fn reclaim_if_stale(path: &Path) -> bool {
    let Ok(contents) = tokio::fs::read_to_string(path).await else {
        // Released between our create attempt and this read
        return true;
    };
    let Some(pid) = parse_owner_pid(&contents) else {
        return false;
    };
    if process_alive(pid) {
        return false;
    }

    let marker = reclaim_marker(path);
    match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .await
    {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            debug!("Lock {} is being reclaimed by another waiter", path.display());
            return false;
        }
        Err(e) => {
            warn!("Failed to create {}: {}", marker.display(), e);
            return false;
        }
    }

    let reclaimed = match tokio::fs::read_to_string(path).await {
        Ok(current) if current == contents => {
            warn!("Reclaiming stale lock {} held by dead pid {}", path.display(), pid);
            match tokio::fs::remove_file(path).await {
                Ok(()) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
                Err(e) => {
                    warn!("Failed to remove stale lock {}: {}", path.display(), e);
                    false
                }
            }
        }
        // Taken over since the first read
        Ok(_) => false,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to re-read lock {}: {}", path.display(), e);
            false
        }
    };

    if let Err(e) = tokio::fs::remove_file(&marker).await {
        warn!("Failed to remove {}: {}", marker.display(), e);
    }
    reclaimed
}

fn reclaim_marker(path: &Path) -> PathBuf {
    path.with_extension("reclaim")
}

fn parse_owner_pid(contents: &str) -> Option<u32> {
    contents.split_whitespace().next()?.parse().ok()
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).is_some()
}

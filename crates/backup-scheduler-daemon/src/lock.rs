//! Single-instance lock file.
//!
//! The lock file holds a JSON [`LockRecord`] naming the owning process. A
//! record whose process no longer exists is stale and is replaced.
//!
//! Stale removal and the subsequent write are not atomic with respect to
//! another process acquiring at the same moment. That window is accepted
//! for single-host use.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DaemonError;

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started: DateTime<Utc>,
    pub hostname: String,
}

impl LockRecord {
    /// Record for the calling process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            started: Utc::now(),
            hostname: local_hostname(),
        }
    }

    /// Whether the owning process is still alive.
    pub fn is_alive(&self) -> bool {
        is_process_running(self.pid)
    }
}

/// Lock file manager preventing duplicate scheduler instances.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    held: bool,
}

impl LockFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            held: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Whether this instance wrote the current lock file.
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Read the current lock record, if any.
    ///
    /// A file that does not parse as a record is an error here; `acquire`
    /// treats the same condition as stale.
    pub fn read(&self) -> Result<Option<LockRecord>, DaemonError> {
        let Some(content) = self.read_raw()? else {
            return Ok(None);
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| DaemonError::LockRead {
                path: self.path.clone(),
                reason: format!("Invalid lock record: {}", e),
            })
    }

    /// Check that no live process owns the lock, clearing a stale file.
    ///
    /// A live owner leaves the file untouched.
    pub fn acquire(&mut self) -> Result<(), DaemonError> {
        let Some(content) = self.read_raw()? else {
            return Ok(());
        };

        match serde_json::from_str::<LockRecord>(&content) {
            Ok(record) if record.is_alive() => {
                return Err(DaemonError::AlreadyRunning {
                    path: self.path.clone(),
                    pid: record.pid,
                });
            }
            Ok(record) => warn!(
                pid = record.pid,
                since = %record.started.to_rfc3339(),
                "Removing stale lock file (process not running): {}",
                self.path.display()
            ),
            Err(e) => warn!(
                "Removing unreadable lock file {}: {}",
                self.path.display(),
                e
            ),
        }

        fs::remove_file(&self.path).or_else(ignore_not_found).map_err(|e| {
            DaemonError::LockWrite {
                path: self.path.clone(),
                reason: format!("Failed to remove stale lock: {}", e),
            }
        })
    }

    /// Write a fresh record for the current process.
    pub fn write(&mut self) -> Result<LockRecord, DaemonError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| DaemonError::LockWrite {
                path: self.path.clone(),
                reason: format!("Failed to create parent directory: {}", e),
            })?;
        }

        let record = LockRecord::current();
        let content = serde_json::to_string_pretty(&record).map_err(|e| DaemonError::LockWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        fs::write(&self.path, content).map_err(|e| DaemonError::LockWrite {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        self.held = true;
        info!(
            pid = record.pid,
            "Lock file created: {}",
            self.path.display()
        );
        Ok(record)
    }

    /// `acquire` followed by `write`.
    pub fn try_acquire(&mut self) -> Result<LockRecord, DaemonError> {
        self.acquire()?;
        self.write()
    }

    /// Delete the lock file. Missing files are fine; other failures are
    /// logged and swallowed.
    pub fn release(&mut self) {
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Lock file removed: {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Lock file already gone: {}", self.path.display())
            }
            Err(e) => warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
    }

    fn read_raw(&self) -> Result<Option<String>, DaemonError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DaemonError::LockRead {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.held {
            self.release();
        }
    }
}

fn ignore_not_found(e: std::io::Error) -> std::io::Result<()> {
    if e.kind() == ErrorKind::NotFound {
        Ok(())
    } else {
        Err(e)
    }
}

pub(crate) fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Signal-0 existence check. A process we may not signal still exists.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // 0 and negative values address process groups, not a single process
    let raw = match i32::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_process_running(_pid: u32) -> bool {
    // No cheap existence check; assume the owner is alive
    true
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

//! Daemon-related errors.

use std::path::PathBuf;

use backup_scheduler_config::ConfigError;
use backup_scheduler_core::SchedulerError;
use thiserror::Error;

/// Errors that can occur during daemon operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Lock file exists and its owner is alive.
    #[error("Scheduler already running (lock file: {path}, PID: {pid})")]
    AlreadyRunning { path: PathBuf, pid: u32 },

    /// Failed to read the lock file.
    #[error("Failed to read lock file at {path}: {reason}")]
    LockRead { path: PathBuf, reason: String },

    /// Failed to write or remove the lock file.
    #[error("Failed to write lock file at {path}: {reason}")]
    LockWrite { path: PathBuf, reason: String },

    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic daemon error.
    #[error("{0}")]
    Custom(String),
}

//! Scheduler errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A backup is in flight; manual runs are rejected rather than queued.
    #[error("A backup is already running (type: {backup_type}, started: {started_at})")]
    AlreadyRunning {
        backup_type: String,
        started_at: DateTime<Utc>,
    },

    /// The registry has not been started or was shut down.
    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The backup collaborator reported an error.
    #[error("Backup '{backup_type}' failed: {message}")]
    JobExecutionFailure {
        backup_type: String,
        message: String,
    },
}

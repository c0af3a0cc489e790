//! # Backup Scheduler Core
//!
//! Scheduling core of the backup daemon.
//!
//! ## Components
//!
//! - [`JobRegistry`]: named schedules mapped to cron triggers and execution profiles
//! - [`ExecutionGuard`]: at most one backup runs at a time, process-wide
//! - [`HealthReporter`]: best-effort webhook notifications
//! - [`BackupCreator`]: the external collaborator that performs a backup
//! - [`Scheduler`]: one explicit instance per process composing the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use backup_scheduler_core::{CommandBackupCreator, Scheduler};
//!
//! let creator = Arc::new(CommandBackupCreator::from_config(&config.backup));
//! let scheduler = Scheduler::from_config(&config, creator)?;
//! scheduler.start();
//! ```

pub mod backup;
pub mod error;
pub mod guard;
pub mod health;
pub mod registry;
pub mod scheduler;
pub mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::{BackupArtifact, BackupCreator, BackupError, BackupRequest, CommandBackupCreator};
pub use error::SchedulerError;
pub use guard::ExecutionGuard;
pub use health::{HealthEvent, HealthReporter};
pub use registry::JobRegistry;
pub use scheduler::Scheduler;
pub use trigger::{CronTrigger, TriggerCallback};
pub use types::{
    CurrentRun, ExecutionProfile, JobTrigger, NextRun, Retention, RunOutcome, RunStatus,
    ScheduleEntry, SchedulerState, SchedulerStats,
};

//! Schedule, outcome and statistics types.
//!
//! Serialized field names are camelCase; webhook consumers read these keys.

use std::collections::BTreeMap;

use backup_scheduler_config::{RetentionConfig, ScheduleConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-schedule backup settings handed to the backup collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProfile {
    pub compress: bool,
    pub encrypt: bool,
    pub cloud_storage_enabled: bool,
    pub retention: Retention,
}

impl Default for ExecutionProfile {
    fn default() -> Self {
        Self::from(&ScheduleConfig::new(""))
    }
}

impl From<&ScheduleConfig> for ExecutionProfile {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            compress: config.compress,
            encrypt: config.encrypt,
            cloud_storage_enabled: config.cloud_storage_enabled,
            retention: config.retention.into(),
        }
    }
}

/// Number of backups to keep per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
}

impl From<RetentionConfig> for Retention {
    fn from(config: RetentionConfig) -> Self {
        Self {
            daily: config.daily,
            weekly: config.weekly,
            monthly: config.monthly,
        }
    }
}

/// A registered schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub name: String,
    pub cron_expression: String,
    pub profile: ExecutionProfile,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobTrigger {
    /// Fired by a cron trigger.
    Scheduled,
    /// Requested by an operator.
    Manual,
}

impl std::fmt::Display for JobTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobTrigger::Scheduled => write!(f, "scheduled"),
            JobTrigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The backup currently in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRun {
    #[serde(rename = "type")]
    pub backup_type: String,
    pub trigger: JobTrigger,
    pub started_at: DateTime<Utc>,
}

/// Result of a finished run. Kept in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    #[serde(rename = "type")]
    pub backup_type: String,
    pub trigger: JobTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Earliest upcoming trigger across all active schedules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextRun {
    #[serde(rename = "type")]
    pub backup_type: String,
    pub at: DateTime<Utc>,
}

/// Process-lifetime counters. Reset only by restarting the process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub total_backups: u64,
    pub successful_backups: u64,
    pub failed_backups: u64,
    pub last_backup: Option<RunOutcome>,
    pub last_by_type: BTreeMap<String, RunOutcome>,
    pub next_scheduled: Option<NextRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_run: Option<CurrentRun>,
}

/// Snapshot sent with every health-check notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerState {
    pub running: bool,
    pub stats: SchedulerStats,
}

//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::loader::ConfigLoader;

fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IANA timezone used to evaluate cron expressions.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub backup: BackupConfig,

    /// Named schedules keyed by backup type.
    #[serde(default = "default_schedules")]
    pub schedules: BTreeMap<String, ScheduleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            lock: LockConfig::default(),
            log: LogConfig::default(),
            health_check: HealthCheckConfig::default(),
            backup: BackupConfig::default(),
            schedules: default_schedules(),
        }
    }
}

impl Config {
    /// Lock file path with `~` expanded.
    pub fn lock_path(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.lock.path))
    }

    /// Log directory with `~` expanded.
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(ConfigLoader::expand_path(&self.log.dir))
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// The built-in daily, weekly and monthly schedules.
pub fn default_schedules() -> BTreeMap<String, ScheduleConfig> {
    let mut schedules = BTreeMap::new();
    schedules.insert("daily".to_string(), ScheduleConfig::new("0 0 2 * * *"));
    schedules.insert("weekly".to_string(), ScheduleConfig::new("0 0 3 * * SUN"));
    schedules.insert("monthly".to_string(), ScheduleConfig::new("0 0 4 1 * *"));
    schedules
}

/// Lock file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_path")]
    pub path: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
        }
    }
}

fn default_lock_path() -> String {
    "~/.backup-scheduler/scheduler.lock".to_string()
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file: default_log_file(),
        }
    }
}

fn default_log_dir() -> String {
    "~/.backup-scheduler/logs".to_string()
}

fn default_log_file() -> String {
    "scheduler.log".to_string()
}

/// Health-check webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: default_health_timeout(),
            heartbeat_interval_secs: default_heartbeat_interval(),
        }
    }
}

fn default_health_timeout() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    300
}

/// External backup command configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Shell command that performs one backup run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default = "default_backup_timeout")]
    pub timeout_secs: u64,

    /// Working directory for the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: default_backup_timeout(),
            work_dir: None,
        }
    }
}

fn default_backup_timeout() -> u64 {
    3600
}

/// A single named schedule and its execution profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub cron: String,

    #[serde(default = "default_true")]
    pub compress: bool,

    #[serde(default = "default_true")]
    pub encrypt: bool,

    #[serde(default)]
    pub cloud_storage_enabled: bool,

    #[serde(default)]
    pub retention: RetentionConfig,
}

impl ScheduleConfig {
    /// Schedule with default profile settings.
    pub fn new(cron: impl Into<String>) -> Self {
        Self {
            cron: cron.into(),
            compress: true,
            encrypt: true,
            cloud_storage_enabled: false,
            retention: RetentionConfig::default(),
        }
    }
}

/// How many backups of each kind to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_daily")]
    pub daily: u32,

    #[serde(default = "default_retention_weekly")]
    pub weekly: u32,

    #[serde(default = "default_retention_monthly")]
    pub monthly: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily: default_retention_daily(),
            weekly: default_retention_weekly(),
            monthly: default_retention_monthly(),
        }
    }
}

fn default_retention_daily() -> u32 {
    7
}

fn default_retention_weekly() -> u32 {
    4
}

fn default_retention_monthly() -> u32 {
    12
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

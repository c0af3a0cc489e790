//! Backup collaborator.
//!
//! The scheduler never creates backups itself. It calls a [`BackupCreator`];
//! the shipped binary uses [`CommandBackupCreator`], which runs an external
//! command with the execution profile passed through environment variables.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use backup_scheduler_config::BackupConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::types::{ExecutionProfile, JobTrigger};

/// What a successful backup produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    pub backup_id: String,
    pub size: u64,
}

/// Identifies the run a backup is created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    #[serde(rename = "type")]
    pub backup_type: String,
    pub trigger: JobTrigger,
}

/// Errors reported by a backup collaborator.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("No backup command configured")]
    NotConfigured,

    #[error("Failed to start backup command: {0}")]
    Spawn(String),

    #[error("Backup command timed out after {0}s")]
    Timeout(u64),

    #[error("Backup command exited with {code}: {stderr}")]
    CommandFailed { code: String, stderr: String },

    #[error("Invalid backup command output: {0}")]
    InvalidOutput(String),

    #[error("{0}")]
    Custom(String),
}

/// Creates one backup for a given profile.
#[async_trait]
pub trait BackupCreator: Send + Sync {
    async fn create_backup(
        &self,
        profile: &ExecutionProfile,
        request: &BackupRequest,
    ) -> Result<BackupArtifact, BackupError>;
}

/// Runs a shell command per backup.
///
/// The command receives `BACKUP_TYPE`, `BACKUP_TRIGGER`, `BACKUP_COMPRESS`,
/// `BACKUP_ENCRYPT`, `BACKUP_CLOUD_STORAGE` and `BACKUP_RETENTION_*` and must
/// print `{"backupId": "...", "size": N}` as its last non-empty stdout line.
#[derive(Debug, Clone)]
pub struct CommandBackupCreator {
    command: Option<String>,
    timeout: Duration,
    work_dir: Option<PathBuf>,
}

impl CommandBackupCreator {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: Some(command.into()),
            timeout,
            work_dir: None,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            command: config
                .command
                .clone()
                .filter(|c| !c.trim().is_empty()),
            timeout: Duration::from_secs(config.timeout_secs),
            work_dir: config.work_dir.clone(),
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    fn profile_env(profile: &ExecutionProfile, request: &BackupRequest) -> Vec<(&'static str, String)> {
        vec![
            ("BACKUP_TYPE", request.backup_type.clone()),
            ("BACKUP_TRIGGER", request.trigger.to_string()),
            ("BACKUP_COMPRESS", profile.compress.to_string()),
            ("BACKUP_ENCRYPT", profile.encrypt.to_string()),
            ("BACKUP_CLOUD_STORAGE", profile.cloud_storage_enabled.to_string()),
            ("BACKUP_RETENTION_DAILY", profile.retention.daily.to_string()),
            ("BACKUP_RETENTION_WEEKLY", profile.retention.weekly.to_string()),
            ("BACKUP_RETENTION_MONTHLY", profile.retention.monthly.to_string()),
        ]
    }
}

/// Parse the artifact from the last non-empty line of command output.
pub fn parse_artifact(stdout: &str) -> Result<BackupArtifact, BackupError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| BackupError::InvalidOutput("command printed nothing".to_string()))?;

    serde_json::from_str(line).map_err(|e| BackupError::InvalidOutput(format!("{}: {}", e, line)))
}

#[async_trait]
impl BackupCreator for CommandBackupCreator {
    async fn create_backup(
        &self,
        profile: &ExecutionProfile,
        request: &BackupRequest,
    ) -> Result<BackupArtifact, BackupError> {
        let command = self.command.as_deref().ok_or(BackupError::NotConfigured)?;

        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let mut cmd = Command::new(shell);
        cmd.arg(flag)
            .arg(command)
            .envs(Self::profile_env(profile, request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.work_dir {
            cmd.current_dir(dir);
        }

        debug!(backup_type = %request.backup_type, command, "Running backup command");

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| BackupError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| BackupError::Spawn(e.to_string()))?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| format!("code {}", c))
                .unwrap_or_else(|| "signal".to_string());
            return Err(BackupError::CommandFailed {
                code,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_artifact(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(test)]
#[path = "backup_tests.rs"]
mod tests;

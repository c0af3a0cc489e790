//! Execution guard: at most one backup runs at a time, process-wide.
//!
//! Scheduled triggers that arrive while a run is in flight are dropped with
//! a log line and never touch the counters. Manual runs in the same
//! situation fail with [`SchedulerError::AlreadyRunning`] so the operator
//! knows the request was not honored.
//!
//! ```text
//! Idle --(accepted trigger)--> Running
//! Running --(trigger while busy, skipped)--> Running
//! Running --(run completes, success or failure)--> Idle
//! ```
//!
//! [`close`](ExecutionGuard::close) refuses further scheduled runs. Stopping
//! closes the guard before waiting, so a trigger that fired just before the
//! stop cannot start a backup after it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backup::{BackupCreator, BackupRequest};
use crate::error::SchedulerError;
use crate::health::{HealthEvent, HealthReporter};
use crate::registry::JobRegistry;
use crate::types::{
    CurrentRun, ExecutionProfile, JobTrigger, RunOutcome, RunStatus, SchedulerState,
    SchedulerStats,
};

#[derive(Default)]
struct GuardState {
    closed: bool,
    current_run: Option<CurrentRun>,
    total_backups: u64,
    successful_backups: u64,
    failed_backups: u64,
    last_backup: Option<RunOutcome>,
    last_by_type: BTreeMap<String, RunOutcome>,
}

/// Why a run could not claim the slot.
enum Refusal {
    Busy(CurrentRun),
    Closed,
}

/// Occupies the single run slot; clears it on drop, whatever the outcome.
struct RunSlot<'a> {
    guard: &'a ExecutionGuard,
    run: CurrentRun,
    started: Instant,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut state = self.guard.state.lock();
        state.current_run = None;
        self.guard.idle.send_replace(true);
        debug!(backup_type = %self.run.backup_type, "Run slot released");
    }
}

/// Serializes backup runs and records their outcomes.
pub struct ExecutionGuard {
    registry: Arc<JobRegistry>,
    creator: Arc<dyn BackupCreator>,
    reporter: Arc<HealthReporter>,
    state: Mutex<GuardState>,
    idle: watch::Sender<bool>,
}

impl ExecutionGuard {
    pub fn new(
        registry: Arc<JobRegistry>,
        creator: Arc<dyn BackupCreator>,
        reporter: Arc<HealthReporter>,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            registry,
            creator,
            reporter,
            state: Mutex::new(GuardState::default()),
            idle,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().current_run.is_some()
    }

    pub fn current_run(&self) -> Option<CurrentRun> {
        self.state.lock().current_run.clone()
    }

    /// Scheduled path: skip silently if a run is in flight.
    ///
    /// Backup failures are recorded and reported, never returned, so a
    /// failing tick cannot take the trigger down.
    pub async fn run_job(&self, name: &str) {
        let Some(entry) = self.registry.get(name) else {
            warn!(schedule = name, "Trigger fired for unknown schedule");
            return;
        };

        let slot = match self.try_begin(name, JobTrigger::Scheduled) {
            Ok(slot) => slot,
            Err(Refusal::Busy(current)) => {
                warn!(
                    schedule = name,
                    running = %current.backup_type,
                    since = %current.started_at.to_rfc3339(),
                    "Backup already running, skipping scheduled trigger"
                );
                return;
            }
            Err(Refusal::Closed) => {
                info!(schedule = name, "Scheduler stopping, dropping trigger");
                return;
            }
        };

        if let Err(e) = self.execute(slot, &entry.profile).await {
            debug!(schedule = name, "Scheduled run failed: {}", e);
        }
    }

    /// Manual path: reject loudly if a run is in flight.
    pub async fn run_now(&self, name: &str) -> Result<RunOutcome, SchedulerError> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownSchedule(name.to_string()))?;

        let slot = match self.try_begin(name, JobTrigger::Manual) {
            Ok(slot) => slot,
            Err(Refusal::Busy(current)) => {
                return Err(SchedulerError::AlreadyRunning {
                    backup_type: current.backup_type,
                    started_at: current.started_at,
                });
            }
            Err(Refusal::Closed) => return Err(SchedulerError::NotRunning),
        };

        self.execute(slot, &entry.profile).await
    }

    /// Refuse scheduled runs from now on. Manual runs are unaffected.
    ///
    /// A run that already holds the slot keeps it; pair with
    /// [`wait_idle`](Self::wait_idle) to drain it.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Accept scheduled runs again.
    pub fn open(&self) {
        self.state.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Resolves once no run is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.idle.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Counter snapshot plus the next scheduled trigger.
    pub fn stats(&self) -> SchedulerStats {
        let mut stats = {
            let state = self.state.lock();
            SchedulerStats {
                total_backups: state.total_backups,
                successful_backups: state.successful_backups,
                failed_backups: state.failed_backups,
                last_backup: state.last_backup.clone(),
                last_by_type: state.last_by_type.clone(),
                next_scheduled: None,
                current_run: state.current_run.clone(),
            }
        };
        stats.next_scheduled = self.registry.next_scheduled();
        stats
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            running: self.registry.is_active(),
            stats: self.stats(),
        }
    }

    /// Claim the run slot, or say why not.
    fn try_begin(&self, name: &str, trigger: JobTrigger) -> Result<RunSlot<'_>, Refusal> {
        let mut state = self.state.lock();
        if state.closed && trigger == JobTrigger::Scheduled {
            return Err(Refusal::Closed);
        }
        if let Some(ref current) = state.current_run {
            return Err(Refusal::Busy(current.clone()));
        }

        let run = CurrentRun {
            backup_type: name.to_string(),
            trigger,
            started_at: Utc::now(),
        };
        state.current_run = Some(run.clone());
        state.total_backups += 1;
        self.idle.send_replace(false);

        Ok(RunSlot {
            guard: self,
            run,
            started: Instant::now(),
        })
    }

    async fn execute(
        &self,
        slot: RunSlot<'_>,
        profile: &ExecutionProfile,
    ) -> Result<RunOutcome, SchedulerError> {
        let request = BackupRequest {
            backup_type: slot.run.backup_type.clone(),
            trigger: slot.run.trigger,
        };
        info!(backup_type = %request.backup_type, trigger = %request.trigger, "Starting backup");

        let result = self.creator.create_backup(profile, &request).await;
        let duration_ms = slot.started.elapsed().as_millis() as u64;

        let mut outcome = RunOutcome {
            backup_type: request.backup_type.clone(),
            trigger: request.trigger,
            started_at: slot.run.started_at,
            duration_ms,
            status: RunStatus::Success,
            backup_id: None,
            size: None,
            error: None,
        };

        match result {
            Ok(artifact) => {
                outcome.backup_id = Some(artifact.backup_id);
                outcome.size = Some(artifact.size);
                self.record(&outcome);
                info!(
                    backup_type = %outcome.backup_type,
                    backup_id = outcome.backup_id.as_deref().unwrap_or_default(),
                    size = outcome.size.unwrap_or_default(),
                    duration_ms,
                    "Backup completed"
                );

                let extra = json!({
                    "backupType": outcome.backup_type,
                    "backupId": outcome.backup_id,
                    "size": outcome.size,
                    "durationMs": duration_ms,
                });
                self.reporter
                    .ping(HealthEvent::Success, &self.state(), extra)
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                outcome.status = RunStatus::Failed;
                outcome.error = Some(message.clone());
                self.record(&outcome);
                error!(
                    backup_type = %outcome.backup_type,
                    duration_ms,
                    "Backup failed: {}",
                    message
                );

                let extra = json!({
                    "backupType": outcome.backup_type,
                    "error": message,
                    "durationMs": duration_ms,
                });
                self.reporter
                    .ping(HealthEvent::Failure, &self.state(), extra)
                    .await;
                Err(SchedulerError::JobExecutionFailure {
                    backup_type: outcome.backup_type,
                    message,
                })
            }
        }
    }

    fn record(&self, outcome: &RunOutcome) {
        let mut state = self.state.lock();
        match outcome.status {
            RunStatus::Success => state.successful_backups += 1,
            RunStatus::Failed => state.failed_backups += 1,
        }
        state.last_backup = Some(outcome.clone());
        state
            .last_by_type
            .insert(outcome.backup_type.clone(), outcome.clone());
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;

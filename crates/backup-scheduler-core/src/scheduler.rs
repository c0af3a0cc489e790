//! Scheduler: the single per-process instance composing registry, guard and
//! health reporter.

use std::sync::{Arc, Weak};

use backup_scheduler_config::{default_schedules, Config};
use chrono_tz::Tz;
use futures::FutureExt;
use serde_json::Value;
use tracing::info;

use crate::backup::BackupCreator;
use crate::error::SchedulerError;
use crate::guard::ExecutionGuard;
use crate::health::{HealthEvent, HealthReporter};
use crate::registry::JobRegistry;
use crate::trigger::TriggerCallback;
use crate::types::{ExecutionProfile, RunOutcome, SchedulerState, SchedulerStats};

/// Backup scheduler.
///
/// Construct once per process and share by `Arc`. Triggers hold only a weak
/// reference to the guard, so dropping the scheduler stops all firing.
pub struct Scheduler {
    registry: Arc<JobRegistry>,
    guard: Arc<ExecutionGuard>,
    reporter: Arc<HealthReporter>,
}

impl Scheduler {
    pub fn new(timezone: Tz, creator: Arc<dyn BackupCreator>, reporter: HealthReporter) -> Self {
        let reporter = Arc::new(reporter);

        let guard = Arc::new_cyclic(|weak: &Weak<ExecutionGuard>| {
            let weak = weak.clone();
            let on_fire: TriggerCallback = Arc::new(move |name: String| {
                let weak = weak.clone();
                async move {
                    if let Some(guard) = weak.upgrade() {
                        guard.run_job(&name).await;
                    }
                }
                .boxed()
            });

            let registry = Arc::new(JobRegistry::new(timezone, on_fire));
            ExecutionGuard::new(registry, creator, reporter.clone())
        });

        Self {
            registry: guard.registry().clone(),
            guard,
            reporter,
        }
    }

    /// Build from configuration and register every configured schedule.
    pub fn from_config(
        config: &Config,
        creator: Arc<dyn BackupCreator>,
    ) -> Result<Self, SchedulerError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(config.timezone.clone()))?;

        let scheduler = Self::new(
            timezone,
            creator,
            HealthReporter::from_config(&config.health_check),
        );
        for (name, schedule) in &config.schedules {
            scheduler.register(name, &schedule.cron, ExecutionProfile::from(schedule))?;
        }
        Ok(scheduler)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn guard(&self) -> &Arc<ExecutionGuard> {
        &self.guard
    }

    pub fn register(
        &self,
        name: &str,
        cron_expr: &str,
        profile: ExecutionProfile,
    ) -> Result<(), SchedulerError> {
        self.registry.register(name, cron_expr, profile)
    }

    /// Register the built-in daily, weekly and monthly schedules.
    pub fn register_defaults(&self) -> Result<(), SchedulerError> {
        for (name, schedule) in default_schedules() {
            self.register(&name, &schedule.cron, ExecutionProfile::from(&schedule))?;
        }
        Ok(())
    }

    /// Start every registered trigger.
    pub fn start(&self) {
        self.guard.open();
        self.registry.start();
        info!(timezone = %self.registry.timezone(), "Scheduler started");
    }

    /// Stop all triggers, then wait for an in-flight backup to finish.
    ///
    /// Triggers that already fired but have not claimed the run slot yet are
    /// dropped. There is no timeout: a hung backup command blocks here.
    pub async fn stop(&self) {
        self.registry.unregister_all();
        self.guard.close();
        if let Some(run) = self.guard.current_run() {
            info!(backup_type = %run.backup_type, "Waiting for running backup to finish");
        }
        self.guard.wait_idle().await;
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.registry.is_active()
    }

    pub async fn run_now(&self, name: &str) -> Result<RunOutcome, SchedulerError> {
        self.guard.run_now(name).await
    }

    pub fn update(&self, name: &str, cron_expr: &str) -> Result<(), SchedulerError> {
        self.registry.update(name, cron_expr)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.guard.stats()
    }

    pub fn state(&self) -> SchedulerState {
        self.guard.state()
    }

    /// Report a lifecycle event to the health webhook.
    pub async fn notify(&self, event: HealthEvent, extra: Value) {
        self.reporter.ping(event, &self.state(), extra).await;
    }

    pub async fn heartbeat(&self) {
        self.reporter.heartbeat(&self.state()).await;
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

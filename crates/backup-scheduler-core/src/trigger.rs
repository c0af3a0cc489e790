//! CronTrigger - cron expression driven firing of a named schedule.
//!
//! Each started trigger owns one tokio task that sleeps until the next cron
//! time point and then spawns the callback. The callback is spawned, not
//! awaited, so a long-running backup never delays the next arrival.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SchedulerError;

pub use backup_scheduler_config::normalize_cron;

/// Callback invoked with the schedule name each time a trigger fires.
pub type TriggerCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Parse a cron expression, accepting 5, 6 or 7 fields.
pub fn parse_cron(expr: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|e| SchedulerError::InvalidCron {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

/// A cron trigger bound to one schedule name.
pub struct CronTrigger {
    name: String,
    expression: String,
    schedule: Schedule,
    timezone: Tz,
    handle: Option<JoinHandle<()>>,
    fire_count: Arc<AtomicU64>,
}

impl CronTrigger {
    /// Create a stopped trigger.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidCron`] if the expression does not parse.
    pub fn new(
        name: impl Into<String>,
        expression: &str,
        timezone: Tz,
    ) -> Result<Self, SchedulerError> {
        let schedule = parse_cron(expression)?;
        Ok(Self {
            name: name.into(),
            expression: expression.to_string(),
            schedule,
            timezone,
            handle: None,
            fire_count: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cron expression as given.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Number of times this trigger has fired.
    pub fn fire_count(&self) -> u64 {
        self.fire_count.load(Ordering::Relaxed)
    }

    /// Next fire time evaluated in the trigger's timezone.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        self.schedule
            .upcoming(self.timezone)
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// The next `count` fire times.
    pub fn upcoming(&self, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .upcoming(self.timezone)
            .take(count)
            .map(|t| t.with_timezone(&Utc))
            .collect()
    }

    /// Start firing. No-op if already running.
    pub fn start(&mut self, on_fire: TriggerCallback) {
        if self.is_running() {
            return;
        }

        let schedule = self.schedule.clone();
        let timezone = self.timezone;
        let name = self.name.clone();
        let fire_count = self.fire_count.clone();

        self.handle = Some(tokio::spawn(async move {
            let mut after = Utc::now().with_timezone(&timezone);
            loop {
                let Some(next) = schedule.after(&after).next() else {
                    debug!(schedule = %name, "No upcoming fire time, trigger exhausted");
                    break;
                };

                let wait = (next.with_timezone(&Utc) - Utc::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::time::sleep(wait).await;

                fire_count.fetch_add(1, Ordering::Relaxed);
                debug!(schedule = %name, at = %next.to_rfc3339(), "Trigger fired");
                tokio::spawn(on_fire(name.clone()));

                // Skip fire times missed while suspended instead of replaying them.
                after = std::cmp::max(next, Utc::now().with_timezone(&timezone));
            }
        }));

        debug!(schedule = %self.name, cron = %self.expression, "Trigger started");
    }

    /// Stop firing. An already spawned callback keeps running.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(schedule = %self.name, "Trigger stopped");
        }
    }
}

impl Drop for CronTrigger {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CronTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronTrigger")
            .field("name", &self.name)
            .field("expression", &self.expression)
            .field("timezone", &self.timezone)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;

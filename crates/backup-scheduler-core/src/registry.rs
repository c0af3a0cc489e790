//! Job registry: schedule name -> cron trigger -> execution profile.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::trigger::{parse_cron, CronTrigger, TriggerCallback};
use crate::types::{ExecutionProfile, NextRun, ScheduleEntry};

#[derive(Default)]
struct RegistryInner {
    active: bool,
    entries: BTreeMap<String, ScheduleEntry>,
    triggers: HashMap<String, CronTrigger>,
}

/// Registry of named schedules and their triggers.
///
/// Every trigger fires the same callback with its schedule name; the
/// [`Scheduler`](crate::Scheduler) binds that callback to
/// [`ExecutionGuard::run_job`](crate::ExecutionGuard::run_job).
pub struct JobRegistry {
    timezone: Tz,
    on_fire: TriggerCallback,
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new(timezone: Tz, on_fire: TriggerCallback) -> Self {
        Self {
            timezone,
            on_fire,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Whether [`start`](Self::start) has been called and not undone.
    pub fn is_active(&self) -> bool {
        self.inner.read().active
    }

    /// Register a schedule. The trigger starts immediately only if the
    /// registry is already active.
    ///
    /// Registering an existing name replaces its entry and trigger.
    pub fn register(
        &self,
        name: &str,
        cron_expr: &str,
        profile: ExecutionProfile,
    ) -> Result<(), SchedulerError> {
        let mut trigger = CronTrigger::new(name, cron_expr, self.timezone)?;

        let mut inner = self.inner.write();
        if inner.active {
            trigger.start(self.on_fire.clone());
        }
        inner.entries.insert(
            name.to_string(),
            ScheduleEntry {
                name: name.to_string(),
                cron_expression: cron_expr.to_string(),
                profile,
            },
        );
        if let Some(mut old) = inner.triggers.insert(name.to_string(), trigger) {
            old.stop();
        }

        info!(schedule = name, cron = cron_expr, timezone = %self.timezone, "Schedule registered");
        Ok(())
    }

    /// Mark the registry active and start every registered trigger.
    pub fn start(&self) {
        let mut inner = self.inner.write();
        inner.active = true;
        for trigger in inner.triggers.values_mut() {
            trigger.start(self.on_fire.clone());
        }
        info!(count = inner.triggers.len(), "Schedules started");
    }

    /// Replace a schedule's cron expression and restart its trigger.
    ///
    /// The new expression is parsed before the old trigger is touched, so a
    /// bad expression leaves the previous trigger registered and firing.
    pub fn update(&self, name: &str, cron_expr: &str) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write();
        if !inner.active {
            return Err(SchedulerError::NotRunning);
        }
        if !inner.entries.contains_key(name) {
            return Err(SchedulerError::UnknownSchedule(name.to_string()));
        }

        let mut trigger = CronTrigger::new(name, cron_expr, self.timezone)?;

        if let Some(mut old) = inner.triggers.remove(name) {
            old.stop();
        }
        trigger.start(self.on_fire.clone());
        inner.triggers.insert(name.to_string(), trigger);

        let previous = inner.entries.get_mut(name).map(|entry| {
            std::mem::replace(&mut entry.cron_expression, cron_expr.to_string())
        });

        info!(
            schedule = name,
            from = previous.as_deref().unwrap_or_default(),
            to = cron_expr,
            "Schedule updated"
        );
        Ok(())
    }

    /// Stop and drop every trigger and mark the registry inactive.
    ///
    /// Entries are kept so in-flight runs and status queries still resolve.
    pub fn unregister_all(&self) {
        let mut inner = self.inner.write();
        for trigger in inner.triggers.values_mut() {
            trigger.stop();
        }
        let count = inner.triggers.len();
        inner.triggers.clear();
        inner.active = false;
        debug!(count, "All triggers unregistered");
    }

    pub fn get(&self, name: &str) -> Option<ScheduleEntry> {
        self.inner.read().entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().entries.contains_key(name)
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> Vec<ScheduleEntry> {
        self.inner.read().entries.values().cloned().collect()
    }

    /// Expression currently driving the named trigger, if one is registered.
    pub fn trigger_expression(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .triggers
            .get(name)
            .map(|t| t.expression().to_string())
    }

    pub fn is_trigger_running(&self, name: &str) -> bool {
        self.inner
            .read()
            .triggers
            .get(name)
            .is_some_and(CronTrigger::is_running)
    }

    /// Next fire time of every entry, computed from its cron expression.
    pub fn next_fire_times(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        let inner = self.inner.read();
        inner
            .entries
            .values()
            .map(|entry| {
                let next = parse_cron(&entry.cron_expression).ok().and_then(|schedule| {
                    schedule
                        .upcoming(self.timezone)
                        .next()
                        .map(|t| t.with_timezone(&Utc))
                });
                (entry.name.clone(), next)
            })
            .collect()
    }

    /// Earliest upcoming fire across running triggers; `None` when inactive.
    pub fn next_scheduled(&self) -> Option<NextRun> {
        let inner = self.inner.read();
        if !inner.active {
            return None;
        }

        inner
            .triggers
            .values()
            .filter(|t| t.is_running())
            .filter_map(|t| {
                t.next_fire_time().map(|at| NextRun {
                    backup_type: t.name().to_string(),
                    at,
                })
            })
            .min_by_key(|next| next.at)
    }

    /// Fire a schedule out of band, exactly as a cron tick would.
    pub fn fire(&self, name: &str) -> Result<JoinHandle<()>, SchedulerError> {
        if !self.contains(name) {
            return Err(SchedulerError::UnknownSchedule(name.to_string()));
        }
        debug!(schedule = name, "Firing trigger manually");
        Ok(tokio::spawn((self.on_fire)(name.to_string())))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

//! Command handlers.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono_tz::Tz;
use tracing::{error, info, warn};

use backup_scheduler_config::Config;
use backup_scheduler_core::{CommandBackupCreator, CronTrigger, Scheduler, SchedulerError};
use backup_scheduler_daemon::{
    is_process_running, send_signal_to_pid, BackupDaemon, DaemonSignal, LockFile,
};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn backup_creator(config: &Config) -> Arc<CommandBackupCreator> {
    Arc::new(CommandBackupCreator::from_config(&config.backup))
}

/// Run the scheduler in the foreground until SIGTERM or SIGINT.
pub(crate) async fn start(config_path: &Path, config: &Config) -> CommandResult {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting backup scheduler"
    );

    let daemon = BackupDaemon::new(config, config_path, backup_creator(config))?;
    if let Err(e) = daemon.run().await {
        error!("Scheduler exited with error: {}", e);
        return Err(e.into());
    }
    Ok(())
}

/// Signal the lock owner to shut down and wait for it to exit.
pub(crate) async fn stop(config: &Config, timeout_secs: u64) -> CommandResult {
    let lock = LockFile::new(config.lock_path());
    let Some(record) = lock.read()? else {
        println!("Scheduler is not running");
        return Ok(());
    };

    if !record.is_alive() {
        println!(
            "Scheduler is not running (stale lock for PID {})",
            record.pid
        );
        return Ok(());
    }

    send_signal_to_pid(record.pid, DaemonSignal::Shutdown)?;
    println!("Stopping scheduler (PID {})...", record.pid);

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    while is_process_running(record.pid) {
        if Instant::now() >= deadline {
            // A backup in flight holds shutdown open
            return Err(format!(
                "Scheduler (PID {}) still running after {}s",
                record.pid, timeout_secs
            )
            .into());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    println!("Scheduler stopped");
    Ok(())
}

/// Print the lock file owner.
pub(crate) fn status(config: &Config) -> CommandResult {
    let lock = LockFile::new(config.lock_path());
    match lock.read() {
        Ok(Some(record)) => {
            let alive = record.is_alive();
            println!("Lock file: {}", lock.path().display());
            println!("PID:       {}", record.pid);
            println!("Since:     {}", record.started.to_rfc3339());
            println!("Host:      {}", record.hostname);
            println!("Alive:     {}", if alive { "yes" } else { "no (stale)" });
        }
        Ok(None) => println!("Scheduler is not running"),
        Err(e) => {
            warn!("{}", e);
            println!("Scheduler is not running (unreadable lock file)");
        }
    }
    Ok(())
}

/// Run one backup in this process and print the outcome.
///
/// Does not take the lock. If a scheduler is running, this backup may
/// overlap one of its runs.
pub(crate) async fn run_now(config: &Config, backup_type: &str) -> CommandResult {
    if let Ok(Some(record)) = LockFile::new(config.lock_path()).read() {
        if record.is_alive() {
            warn!(
                pid = record.pid,
                "A scheduler is running; this backup is not serialized with it"
            );
        }
    }

    let scheduler = Scheduler::from_config(config, backup_creator(config))?;
    match scheduler.run_now(backup_type).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(SchedulerError::UnknownSchedule(name)) => {
            let known: Vec<String> = scheduler
                .registry()
                .entries()
                .into_iter()
                .map(|e| e.name)
                .collect();
            Err(format!(
                "Unknown schedule '{}' (configured: {})",
                name,
                known.join(", ")
            )
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

/// List configured schedules with their next fire times.
pub(crate) fn schedules(config: &Config, count: usize) -> CommandResult {
    let timezone: Tz = config
        .timezone
        .parse()
        .map_err(|_| SchedulerError::InvalidTimezone(config.timezone.clone()))?;

    println!("Timezone: {}", timezone);
    for (name, schedule) in &config.schedules {
        let trigger = CronTrigger::new(name.as_str(), &schedule.cron, timezone)?;
        println!();
        println!("{} ({})", name, schedule.cron);
        println!(
            "  compress={} encrypt={} cloud={} retention={}/{}/{}",
            schedule.compress,
            schedule.encrypt,
            schedule.cloud_storage_enabled,
            schedule.retention.daily,
            schedule.retention.weekly,
            schedule.retention.monthly,
        );
        for at in trigger.upcoming(count) {
            println!("  {}", at.with_timezone(&timezone).to_rfc3339());
        }
    }
    Ok(())
}

//! Daemon lifecycle: lock, signals, heartbeat, reload and shutdown around a
//! [`Scheduler`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backup_scheduler_config::{Config, ConfigLoader};
use backup_scheduler_core::trigger::parse_cron;
use backup_scheduler_core::{BackupCreator, HealthEvent, Scheduler};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::DaemonError;
use crate::lock::LockFile;
use crate::signal::{DaemonSignal, SignalHandler};

/// The scheduler process.
pub struct BackupDaemon {
    config_path: PathBuf,
    lock_path: PathBuf,
    heartbeat_interval: Duration,
    scheduler: Arc<Scheduler>,
    lock: Mutex<LockFile>,
    signal_handler: SignalHandler,
    shutdown_sender: broadcast::Sender<()>,
    started: AtomicBool,
}

impl BackupDaemon {
    /// Build the scheduler from `config` and register its schedules.
    ///
    /// `config_path` is re-read on reload.
    pub fn new(
        config: &Config,
        config_path: impl Into<PathBuf>,
        creator: Arc<dyn BackupCreator>,
    ) -> Result<Self, DaemonError> {
        let scheduler = Scheduler::from_config(config, creator)?;
        let lock_path = config.lock_path();
        let (shutdown_sender, _) = broadcast::channel(1);

        Ok(Self {
            config_path: config_path.into(),
            lock: Mutex::new(LockFile::new(&lock_path)),
            lock_path,
            heartbeat_interval: Duration::from_secs(config.health_check.heartbeat_interval_secs.max(1)),
            scheduler: Arc::new(scheduler),
            signal_handler: SignalHandler::new(),
            shutdown_sender,
            started: AtomicBool::new(false),
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Take the lock, install signal handlers and start every trigger.
    pub async fn start(&self) -> Result<(), DaemonError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::Custom("Daemon already started".to_string()));
        }

        let record = match self.lock.lock().await.try_acquire() {
            Ok(record) => record,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        install_panic_hook(self.lock_path.clone());

        if let Err(e) = self.signal_handler.setup_os_signals() {
            self.lock.lock().await.release();
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.scheduler.start();
        self.scheduler
            .notify(
                HealthEvent::Started,
                json!({ "pid": record.pid, "hostname": record.hostname }),
            )
            .await;
        self.spawn_heartbeat();

        for (name, next) in self.scheduler.registry().next_fire_times() {
            match next {
                Some(at) => info!(schedule = %name, next = %at.to_rfc3339(), "Schedule active"),
                None => warn!(schedule = %name, "Schedule has no upcoming fire time"),
            }
        }
        info!(pid = record.pid, "Backup scheduler started");
        Ok(())
    }

    /// Start, then serve signals until shutdown is requested.
    pub async fn run(&self) -> Result<(), DaemonError> {
        let mut signal_rx = self.signal_handler.subscribe();
        self.start().await?;

        loop {
            match signal_rx.recv().await {
                Ok(DaemonSignal::Shutdown) => {
                    info!("Received shutdown signal");
                    break;
                }
                Ok(DaemonSignal::Reload) => {
                    // Requests queued behind one already served are dropped
                    if self.signal_handler.take_reload_request() {
                        self.reload_logged().await;
                    } else {
                        debug!("Reload already served");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Signal receiver lagged");
                    if self.signal_handler.is_shutdown_requested() {
                        break;
                    }
                    if self.signal_handler.take_reload_request() {
                        self.reload_logged().await;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.shutdown().await
    }

    async fn reload_logged(&self) {
        if let Err(e) = self.reload().await {
            error!("Reload failed, keeping current schedules: {}", e);
        }
    }

    /// Re-read the config file and reschedule every changed cron expression.
    ///
    /// All changed expressions are parsed before any is applied, so a bad
    /// file leaves the running schedules untouched. Returns the names of
    /// the rescheduled entries.
    pub async fn reload(&self) -> Result<Vec<String>, DaemonError> {
        info!(path = %self.config_path.display(), "Reloading schedules");
        let (config, warnings) = ConfigLoader::load_effective(&self.config_path)?;
        for warning in warnings {
            warn!("Config: {}", warning);
        }

        let registry = self.scheduler.registry();
        let mut changed = Vec::new();
        for (name, schedule) in &config.schedules {
            match registry.get(name) {
                Some(entry) if entry.cron_expression != schedule.cron => {
                    parse_cron(&schedule.cron)?;
                    changed.push((name.clone(), schedule.cron.clone()));
                }
                Some(_) => {}
                None => warn!(schedule = %name, "New schedule ignored until restart"),
            }
        }

        let mut updated = Vec::with_capacity(changed.len());
        for (name, cron) in changed {
            self.scheduler.update(&name, &cron)?;
            info!(schedule = %name, cron = %cron, "Schedule updated");
            updated.push(name);
        }

        self.scheduler
            .notify(HealthEvent::Reloaded, json!({ "updated": updated }))
            .await;
        Ok(updated)
    }

    /// Stop triggers, wait for a running backup, report and release the lock.
    ///
    /// No-op unless started.
    pub async fn shutdown(&self) -> Result<(), DaemonError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Backup scheduler shutting down");
        let _ = self.shutdown_sender.send(());

        self.scheduler.stop().await;
        self.scheduler.notify(HealthEvent::Stopped, Value::Null).await;
        self.lock.lock().await.release();

        info!("Backup scheduler stopped");
        Ok(())
    }

    fn spawn_heartbeat(&self) {
        let scheduler = self.scheduler.clone();
        let period = self.heartbeat_interval;
        let mut shutdown_rx = self.shutdown_sender.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scheduler.heartbeat().await,
                    _ = shutdown_rx.recv() => {
                        debug!("Heartbeat loop stopped");
                        break;
                    }
                }
            }
        });
    }
}

/// Log panics through tracing and drop our lock file if the main thread is
/// going down.
///
/// Panics inside spawned tasks are contained by the runtime, so the lock is
/// only removed when the panicking thread is `main`.
fn install_panic_hook(lock_path: PathBuf) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        error!("Scheduler panicked: {}", panic);

        if std::thread::current().name() == Some("main") {
            let ours = LockFile::new(&lock_path)
                .read()
                .ok()
                .flatten()
                .is_some_and(|record| record.pid == std::process::id());
            if ours {
                let _ = std::fs::remove_file(&lock_path);
            }
        }

        previous(panic);
    }));
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;

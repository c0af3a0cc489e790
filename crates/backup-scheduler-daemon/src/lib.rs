//! # Backup Scheduler Daemon
//!
//! Process-level concerns of the backup scheduler.
//!
//! ## Features
//!
//! - Lock file with PID liveness check (one scheduler per host)
//! - Signal handling (SIGTERM/SIGINT for graceful shutdown, SIGHUP for schedule reload)
//! - Heartbeat loop and lifecycle notifications to the health webhook
//!
//! ## Usage
//!
//! ```rust,ignore
//! use backup_scheduler_daemon::BackupDaemon;
//!
//! let daemon = BackupDaemon::new(&config, config_path, creator)?;
//! daemon.run().await?;
//! ```

pub mod daemon;
pub mod error;
pub mod lock;
pub mod signal;

pub use daemon::BackupDaemon;
pub use error::DaemonError;
pub use lock::{is_process_running, LockFile, LockRecord};
pub use signal::{send_signal_to_pid, DaemonSignal, SignalHandler};

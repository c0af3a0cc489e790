//! CLI definitions for the backup scheduler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Backup scheduler CLI.
#[derive(Debug, Parser)]
#[command(name = "backup-scheduler")]
#[command(about = "Single-instance cron backup scheduler")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "BACKUP_SCHEDULER_CONFIG",
        default_value = "config/scheduler.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run the scheduler in the foreground
    Start,

    /// Stop the running scheduler and wait for it to exit
    Stop {
        /// Seconds to wait for the process to exit
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },

    /// Show lock file owner and liveness
    Status,

    /// Run one backup immediately
    RunNow {
        /// Schedule name
        #[arg(default_value = "daily")]
        backup_type: String,
    },

    /// List schedules and their next fire times
    Schedules {
        /// Number of upcoming fire times per schedule
        #[arg(short = 'n', long, default_value_t = 3)]
        count: usize,
    },
}

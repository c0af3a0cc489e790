//! Backup scheduler
//!
//! Entry point for the scheduler daemon and its control commands.

mod cli;
mod commands;
mod logging;

use clap::Parser;
use tracing::warn;

use backup_scheduler_config::ConfigLoader;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (config, warnings) = ConfigLoader::load_effective(&cli.config)?;
    let _log_guard = logging::init_tracing(&config.log_dir(), &config.log.file)?;
    for warning in &warnings {
        warn!("Config: {}", warning);
    }

    match cli.command {
        Commands::Start => commands::start(&cli.config, &config).await,
        Commands::Stop { timeout } => commands::stop(&config, timeout).await,
        Commands::Status => commands::status(&config),
        Commands::RunNow { backup_type } => commands::run_now(&config, &backup_type).await,
        Commands::Schedules { count } => commands::schedules(&config, count),
    }
}

//! # Backup Scheduler Config
//!
//! Configuration management for the backup scheduler daemon.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{normalize_cron, ConfigValidator, ValidationError, ValidationResult, ValidationWarning};

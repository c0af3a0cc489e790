//! Configuration validation.

use std::str::FromStr;

use chrono_tz::Tz;
use cron::Schedule;

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Normalize a cron expression for the `cron` crate.
///
/// Classic 5-field expressions (`min hour dom month dow`) get a leading `0`
/// seconds field; 6- and 7-field expressions pass through.
pub fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_timezone(config, &mut result);
        Self::validate_health_check(config, &mut result);
        Self::validate_backup(config, &mut result);
        Self::validate_schedules(config, &mut result);

        result
    }

    fn validate_timezone(config: &Config, result: &mut ValidationResult) {
        if config.timezone.parse::<Tz>().is_err() {
            result.add_error(ValidationError::new(
                "timezone",
                format!("Unknown timezone '{}'", config.timezone),
            ));
        }
    }

    fn validate_health_check(config: &Config, result: &mut ValidationResult) {
        let health = &config.health_check;

        if health.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "health_check.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if health.heartbeat_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "health_check.heartbeat_interval_secs",
                "heartbeat_interval_secs must be greater than 0",
            ));
        }

        match health.url.as_deref() {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                result.add_error(ValidationError::new(
                    "health_check.url",
                    "url must start with http:// or https://",
                ));
            }
            None if health.enabled => {
                result.add_error(ValidationError::new(
                    "health_check.url",
                    "Health checks are enabled but no url is set",
                ));
            }
            _ => {}
        }
    }

    fn validate_backup(config: &Config, result: &mut ValidationResult) {
        if config.backup.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "backup.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if config.backup.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
            result.add_warning(ValidationWarning::new(
                "backup.command",
                "No backup command configured, every run will fail",
            ));
        }
    }

    fn validate_schedules(config: &Config, result: &mut ValidationResult) {
        if config.schedules.is_empty() {
            result.add_warning(ValidationWarning::new(
                "schedules",
                "No schedules configured, only manual runs are possible",
            ));
        }

        for (name, schedule) in &config.schedules {
            if name.trim().is_empty() {
                result.add_error(ValidationError::new(
                    "schedules",
                    "Schedule names cannot be empty",
                ));
            }

            let path = format!("schedules.{}.cron", name);
            if schedule.cron.trim().is_empty() {
                result.add_error(ValidationError::new(path, "cron expression cannot be empty"));
            } else if let Err(e) = Schedule::from_str(&normalize_cron(&schedule.cron)) {
                result.add_error(ValidationError::new(
                    path,
                    format!("Invalid cron expression '{}': {}", schedule.cron, e),
                ));
            }
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

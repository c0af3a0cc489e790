use super::*;
use crate::schema::ScheduleConfig;

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    // Default has no backup command configured
    assert!(result.warnings.iter().any(|w| w.path == "backup.command"));
}

#[test]
fn test_validate_unknown_timezone() {
    let mut config = Config::default();
    config.timezone = "Mars/Olympus_Mons".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "timezone"));
}

#[test]
fn test_validate_iana_timezone() {
    let mut config = Config::default();
    config.timezone = "Asia/Tokyo".to_string();

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
}

#[test]
fn test_validate_enabled_without_url() {
    let mut config = Config::default();
    config.health_check.enabled = true;

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "health_check.url"));
}

#[test]
fn test_validate_invalid_url_scheme() {
    let mut config = Config::default();
    config.health_check.url = Some("ftp://hc.example.com".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
}

#[test]
fn test_validate_zero_timeouts() {
    let mut config = Config::default();
    config.health_check.timeout_secs = 0;
    config.health_check.heartbeat_interval_secs = 0;
    config.backup.timeout_secs = 0;

    let result = ConfigValidator::validate(&config);
    assert_eq!(result.errors.len(), 3);
}

#[test]
fn test_validate_empty_cron() {
    let mut config = Config::default();
    config
        .schedules
        .insert("daily".to_string(), ScheduleConfig::new("  "));

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "schedules.daily.cron"));
}

#[test]
fn test_validate_unparseable_cron() {
    let mut config = Config::default();
    config
        .schedules
        .insert("weekly".to_string(), ScheduleConfig::new("every sunday at three"));

    let result = ConfigValidator::validate(&config);
    assert!(!result.is_valid());
    let error = result
        .errors
        .iter()
        .find(|e| e.path == "schedules.weekly.cron")
        .unwrap();
    assert!(error.message.contains("every sunday at three"));
}

#[test]
fn test_validate_five_field_cron() {
    let mut config = Config::default();
    config
        .schedules
        .insert("daily".to_string(), ScheduleConfig::new("30 1 * * *"));

    assert!(ConfigValidator::validate(&config).is_valid());
}

#[test]
fn test_normalize_cron() {
    assert_eq!(normalize_cron("30 1 * * *"), "0 30 1 * * *");
    assert_eq!(normalize_cron("0  0 2 * * *"), "0 0 2 * * *");
    assert_eq!(normalize_cron("0 0 4 1 * * 2030"), "0 0 4 1 * * 2030");
}

#[test]
fn test_validate_no_schedules_warning() {
    let mut config = Config::default();
    config.schedules.clear();
    config.backup.command = Some("backup.sh".to_string());

    let result = ConfigValidator::validate(&config);
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].path, "schedules");
}

#[test]
fn test_validation_result_default() {
    let result = ValidationResult::default();
    assert!(result.is_valid());
    assert!(result.errors.is_empty());
    assert!(result.warnings.is_empty());
}

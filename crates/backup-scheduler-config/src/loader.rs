//! Configuration loader.

use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::Config;
use crate::validator::ConfigValidator;

/// Environment variable overriding the configured timezone.
pub const ENV_TIMEZONE: &str = "BACKUP_TIMEZONE";
/// Environment variable toggling the health-check webhook.
pub const ENV_HEALTH_CHECK_ENABLED: &str = "HEALTH_CHECK_ENABLED";
/// Environment variable holding the health-check webhook URL.
pub const ENV_HEALTH_CHECK_URL: &str = "HEALTH_CHECK_URL";
/// Environment variable holding the backup command.
pub const ENV_BACKUP_COMMAND: &str = "BACKUP_COMMAND";

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load, apply process environment overrides and validate.
    ///
    /// Validation warnings are returned alongside the config so the caller
    /// can log them once logging is up.
    pub fn load_effective(path: &Path) -> Result<(Config, Vec<String>), ConfigError> {
        let mut config = Self::load_or_default(path)?;
        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

        let result = ConfigValidator::validate(&config);
        if !result.is_valid() {
            let messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.path, e.message))
                .collect();
            return Err(ConfigError::Invalid(messages.join("; ")));
        }

        let warnings = result
            .warnings
            .iter()
            .map(|w| format!("{}: {}", w.path, w.message))
            .collect();
        Ok((config, warnings))
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = lookup(ENV_TIMEZONE).filter(|v| !v.is_empty()) {
            config.timezone = tz;
        }

        if let Some(enabled) = lookup(ENV_HEALTH_CHECK_ENABLED).filter(|v| !v.is_empty()) {
            config.health_check.enabled = parse_bool(ENV_HEALTH_CHECK_ENABLED, &enabled)?;
        }

        if let Some(url) = lookup(ENV_HEALTH_CHECK_URL).filter(|v| !v.is_empty()) {
            config.health_check.url = Some(url);
        }

        if let Some(command) = lookup(ENV_BACKUP_COMMAND).filter(|v| !v.is_empty()) {
            config.backup.command = Some(command);
        }

        Ok(())
    }

    /// Expand environment variables in the format `${VAR}`.
    ///
    /// Comments are copied through untouched.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
        let mut result = String::with_capacity(content.len());

        for line in content.split_inclusive('\n') {
            let (code, comment) = line.split_at(comment_start(line));
            let mut expanded = code.to_string();
            for cap in re.captures_iter(code) {
                let var_name = &cap[1];
                let var_value = std::env::var(var_name)
                    .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
                expanded = expanded.replace(&cap[0], &var_value);
            }
            result.push_str(&expanded);
            result.push_str(comment);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.backup-scheduler`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

/// Byte offset of a `#` comment outside any string, or the line length.
fn comment_start(line: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        match quote {
            Some('"') if escaped => escaped = false,
            Some('"') if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return i,
            None => {}
        }
    }
    line.len()
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.schedules.len(), 3);
    }

    #[test]
    fn test_load_schedules_replace_defaults() {
        let content = r#"
            timezone = "Europe/Berlin"

            [schedules.hourly]
            cron = "0 0 * * * *"
            encrypt = false
            retention = { daily = 24, weekly = 0, monthly = 0 }
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.schedules.len(), 1);

        let hourly = &config.schedules["hourly"];
        assert!(hourly.compress);
        assert!(!hourly.encrypt);
        assert_eq!(hourly.retention.daily, 24);
    }

    #[test]
    fn test_load_health_check() {
        let content = r#"
            [health_check]
            enabled = true
            url = "https://hc.example.com/ping"
            timeout_secs = 5
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert!(config.health_check.enabled);
        assert_eq!(
            config.health_check.url.as_deref(),
            Some("https://hc.example.com/ping")
        );
        assert_eq!(config.health_check.timeout_secs, 5);
        assert_eq!(config.health_check.heartbeat_interval_secs, 300);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[backup]").unwrap();
        writeln!(file, "command = \"/usr/local/bin/make-backup\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(
            config.backup.command.as_deref(),
            Some("/usr/local/bin/make-backup")
        );
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/scheduler.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            ConfigLoader::load_or_default(Path::new("/nonexistent/path/scheduler.toml")).unwrap();
        assert_eq!(config.schedules.len(), 3);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("timezone = [unclosed");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: unique test-only variable
        unsafe {
            std::env::set_var("BACKUP_SCHEDULER_TEST_URL", "https://hc.test/abc");
        }
        let content = "url = \"${BACKUP_SCHEDULER_TEST_URL}\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert!(expanded.contains("https://hc.test/abc"));
        unsafe {
            std::env::remove_var("BACKUP_SCHEDULER_TEST_URL");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${NONEXISTENT_BACKUP_SCHEDULER_VAR}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let lookup = lookup_from(&[
            (ENV_TIMEZONE, "America/New_York"),
            (ENV_HEALTH_CHECK_ENABLED, "1"),
            (ENV_HEALTH_CHECK_URL, "https://hc.example.com"),
            (ENV_BACKUP_COMMAND, "backup.sh"),
        ]);

        ConfigLoader::apply_env_overrides(&mut config, lookup).unwrap();
        assert_eq!(config.timezone, "America/New_York");
        assert!(config.health_check.enabled);
        assert_eq!(config.health_check.url.as_deref(), Some("https://hc.example.com"));
        assert_eq!(config.backup.command.as_deref(), Some("backup.sh"));
    }

    #[test]
    fn test_env_overrides_empty_values_ignored() {
        let mut config = Config::default();
        let lookup = lookup_from(&[(ENV_TIMEZONE, ""), (ENV_HEALTH_CHECK_URL, "")]);

        ConfigLoader::apply_env_overrides(&mut config, lookup).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.health_check.url.is_none());
    }

    #[test]
    fn test_env_override_invalid_bool() {
        let mut config = Config::default();
        let lookup = lookup_from(&[(ENV_HEALTH_CHECK_ENABLED, "maybe")]);

        let result = ConfigLoader::apply_env_overrides(&mut config, lookup);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("x", "TRUE").unwrap());
        assert!(parse_bool("x", "on").unwrap());
        assert!(!parse_bool("x", "0").unwrap());
        assert!(!parse_bool("x", " false ").unwrap());
    }

    #[test]
    fn test_expand_env_vars_skips_comments() {
        let content = "# use ${UNSET_IN_COMMENT} here\nurl = \"https://hc.test/#frag\" # ${ALSO_UNSET}\n";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_expand_env_vars_hash_inside_string() {
        let content = "cmd = \"echo '#' ${NONEXISTENT_BACKUP_SCHEDULER_VAR}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_comment_start() {
        assert_eq!(comment_start("# all comment"), 0);
        assert_eq!(comment_start("a = 1 # note"), 6);
        assert_eq!(comment_start("a = \"x#y\""), 9);
        assert_eq!(comment_start("a = 'x#y' # z"), 10);
        assert_eq!(comment_start("a = \"q\\\"#\" # z"), 11);
    }

    #[test]
    fn test_shipped_sample_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/scheduler.toml");
        let config = ConfigLoader::load(&path).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.schedules.len(), 3);
        assert_eq!(config.schedules["daily"].cron, "0 0 2 * * *");

        let result = ConfigValidator::validate(&config);
        assert!(result.is_valid());
        ConfigLoader::load_effective(&path).unwrap();
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/scheduler.lock");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/scheduler.lock"));
    }
}

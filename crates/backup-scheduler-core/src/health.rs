//! Health-check webhook reporting.
//!
//! Purely observational: failures are logged at warn and never retried or
//! propagated.

use std::time::Duration;

use backup_scheduler_config::HealthCheckConfig;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::SchedulerState;

/// Events reported to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthEvent {
    Started,
    Stopped,
    Heartbeat,
    Success,
    Failure,
    Reloaded,
}

impl std::fmt::Display for HealthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthEvent::Started => write!(f, "started"),
            HealthEvent::Stopped => write!(f, "stopped"),
            HealthEvent::Heartbeat => write!(f, "heartbeat"),
            HealthEvent::Success => write!(f, "success"),
            HealthEvent::Failure => write!(f, "failure"),
            HealthEvent::Reloaded => write!(f, "reloaded"),
        }
    }
}

#[derive(Debug, Error)]
pub enum HealthCheckError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Posts scheduler events to a health-check webhook.
pub struct HealthReporter {
    enabled: bool,
    url: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HealthReporter {
    pub fn new(enabled: bool, url: Option<String>, timeout: Duration) -> Self {
        Self {
            enabled,
            url: url.filter(|u| !u.trim().is_empty()),
            timeout,
            client: Client::new(),
        }
    }

    /// A reporter that never sends anything.
    pub fn disabled() -> Self {
        Self::new(false, None, Duration::from_secs(10))
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(
            config.enabled,
            config.url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Enabled and a URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.url.is_some()
    }

    /// Build the JSON body: `{event, timestamp, scheduler, ...extra}`.
    ///
    /// Keys in an object `extra` are merged last.
    pub fn build_payload(event: HealthEvent, state: &SchedulerState, extra: Value) -> Value {
        let mut body = Map::new();
        body.insert("event".to_string(), json!(event));
        body.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        body.insert("scheduler".to_string(), json!(state));

        match extra {
            Value::Object(fields) => body.extend(fields),
            Value::Null => {}
            other => {
                body.insert("data".to_string(), other);
            }
        }

        Value::Object(body)
    }

    /// Report an event. No-op when disabled.
    pub async fn ping(&self, event: HealthEvent, state: &SchedulerState, extra: Value) {
        let Some(url) = self.url.as_deref().filter(|_| self.enabled) else {
            return;
        };

        let payload = Self::build_payload(event, state, extra);
        match self.send(url, &payload).await {
            Ok(()) => debug!(%event, "Health check sent"),
            Err(e) => warn!(%event, "Health check failed: {}", e),
        }
    }

    /// Liveness report, sent on a fixed interval regardless of job activity.
    pub async fn heartbeat(&self, state: &SchedulerState) {
        self.ping(HealthEvent::Heartbeat, state, Value::Null).await;
    }

    async fn send(&self, url: &str, payload: &Value) -> Result<(), HealthCheckError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HealthCheckError::Status(status));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;

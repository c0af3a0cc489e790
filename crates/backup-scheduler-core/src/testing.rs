//! Test doubles shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::backup::{BackupArtifact, BackupCreator, BackupError, BackupRequest};
use crate::guard::ExecutionGuard;
use crate::types::ExecutionProfile;

/// Backup creator that records requests and can be held open.
pub(crate) struct MockBackupCreator {
    requests: Mutex<Vec<(BackupRequest, ExecutionProfile)>>,
    fail_with: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

impl MockBackupCreator {
    pub(crate) fn succeeding() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: None,
            gate: None,
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::succeeding()
        }
    }

    /// Each call blocks until a permit is added to the returned semaphore.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let creator = Self {
            gate: Some(gate.clone()),
            ..Self::succeeding()
        };
        (creator, gate)
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<(BackupRequest, ExecutionProfile)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl BackupCreator for MockBackupCreator {
    async fn create_backup(
        &self,
        profile: &ExecutionProfile,
        request: &BackupRequest,
    ) -> Result<BackupArtifact, BackupError> {
        let n = {
            let mut requests = self.requests.lock();
            requests.push((request.clone(), *profile));
            requests.len()
        };

        if let Some(ref gate) = self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match self.fail_with {
            Some(ref message) => Err(BackupError::Custom(message.clone())),
            None => Ok(BackupArtifact {
                backup_id: format!("{}-{}", request.backup_type, n),
                size: 1024 * n as u64,
            }),
        }
    }
}

/// Wait until the guard reports a run in flight.
pub(crate) async fn wait_until_running(guard: &ExecutionGuard) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !guard.is_running() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("run did not start within 5s");
}

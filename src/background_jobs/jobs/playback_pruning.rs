//! Prunes playback positions that haven't been touched within the retention
//! window, keeping the user database from accumulating dead resume points.

use crate::background_jobs::job::{BackgroundJob, JobError, JobSchedule};
use crate::user::UserManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct PlaybackPruningJob {
    user_manager: Arc<UserManager>,
    retention_days: u64,
    interval: Duration,
}

impl PlaybackPruningJob {
    pub fn new(user_manager: Arc<UserManager>, retention_days: u64, interval: Duration) -> Self {
        Self {
            user_manager,
            retention_days,
            interval,
        }
    }
}

#[async_trait]
impl BackgroundJob for PlaybackPruningJob {
    fn id(&self) -> &'static str {
        "playback_pruning"
    }

    fn name(&self) -> &'static str {
        "Playback Pruning"
    }

    fn description(&self) -> &'static str {
        "Delete playback positions outside the retention window"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule {
            interval: self.interval,
            run_on_startup: false,
        }
    }

    async fn execute(&self) -> Result<(), JobError> {
        let cutoff =
            chrono::Utc::now().timestamp() - (self.retention_days as i64) * 24 * 60 * 60;

        let pruned = self
            .user_manager
            .prune_playback_positions_before(cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if pruned > 0 {
            info!("Pruned {} stale playback positions", pruned);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::SqliteCatalogStore;
    use crate::user::SqliteUserStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn executes_cleanly_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let catalog = SqliteCatalogStore::new(dir.path().join("catalog.db")).unwrap();
        let users = SqliteUserStore::new(dir.path().join("user.db")).unwrap();
        let manager = Arc::new(UserManager::new(Arc::new(catalog), Arc::new(users)));

        let job = PlaybackPruningJob::new(manager, 30, Duration::from_secs(3600));
        job.execute().await.unwrap();
    }
}

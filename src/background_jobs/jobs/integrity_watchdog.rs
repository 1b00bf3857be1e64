//! Catalog integrity watchdog.
//!
//! Production data has carried lectures whose speaker reference disagreed
//! with the owning collection's speaker, and lectures whose audio object had
//! gone missing; both used to be found by hand. This job scans for them on a
//! schedule. The collection's speaker is authoritative for repairs.

use crate::background_jobs::job::{BackgroundJob, JobError, JobSchedule};
use crate::catalog_store::CatalogStore;
use crate::storage::{AudioStorage, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct WatchdogReport {
    pub mismatches_found: usize,
    pub mismatches_repaired: usize,
    /// (lecture id, object key) pairs whose audio object is gone.
    pub missing_audio: Vec<(String, String)>,
    pub lectures_scanned: usize,
}

impl WatchdogReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches_found == 0 && self.missing_audio.is_empty()
    }
}

pub struct IntegrityWatchdogJob {
    catalog_store: Arc<dyn CatalogStore>,
    storage: Arc<dyn AudioStorage>,
    interval: Duration,
    repair: bool,
}

impl IntegrityWatchdogJob {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        storage: Arc<dyn AudioStorage>,
        interval: Duration,
        repair: bool,
    ) -> Self {
        Self {
            catalog_store,
            storage,
            interval,
            repair,
        }
    }

    pub async fn run_scan(&self) -> anyhow::Result<WatchdogReport> {
        let mut report = WatchdogReport::default();

        let mismatches = self.catalog_store.find_speaker_mismatches()?;
        report.mismatches_found = mismatches.len();
        for mismatch in &mismatches {
            warn!(
                "Lecture {} references speaker {}, but its collection {} belongs to {}",
                mismatch.lecture_id,
                mismatch.lecture_speaker_id,
                mismatch.collection_id,
                mismatch.collection_speaker_id
            );
            if self.repair {
                self.catalog_store
                    .repair_lecture_speaker(&mismatch.lecture_id, &mismatch.collection_speaker_id)?;
                report.mismatches_repaired += 1;
            }
        }

        for (lecture_id, object_key) in self.catalog_store.list_all_lecture_audio_keys()? {
            report.lectures_scanned += 1;
            match self.storage.object_size(&object_key).await {
                Ok(_) => {}
                Err(StorageError::NotFound(_)) => {
                    warn!("Lecture {} audio object {} is missing", lecture_id, object_key);
                    report.missing_audio.push((lecture_id, object_key));
                }
                Err(err) => {
                    // Storage trouble is not a catalog defect; surface and move on
                    warn!("Could not check audio for lecture {}: {}", lecture_id, err);
                }
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl BackgroundJob for IntegrityWatchdogJob {
    fn id(&self) -> &'static str {
        "integrity_watchdog"
    }

    fn name(&self) -> &'static str {
        "Integrity Watchdog"
    }

    fn description(&self) -> &'static str {
        "Scan for speaker/collection mismatches and missing audio objects"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule {
            interval: self.interval,
            run_on_startup: true,
        }
    }

    async fn execute(&self) -> Result<(), JobError> {
        let report = self
            .run_scan()
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if report.is_clean() {
            info!(
                "Integrity check passed: {} lectures scanned",
                report.lectures_scanned
            );
        } else {
            info!(
                "Integrity check: {} mismatches ({} repaired), {} missing audio objects",
                report.mismatches_found,
                report.mismatches_repaired,
                report.missing_audio.len()
            );
        }

        Ok(())
    }
}

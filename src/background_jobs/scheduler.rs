//! Interval scheduler for background jobs.
//!
//! One tokio task per job. A watch channel fans out the shutdown signal;
//! jobs finish their current run before the handle's shutdown() returns.

use super::job::BackgroundJob;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Background job scheduler stopped");
    }
}

pub fn start_scheduler(jobs: Vec<Arc<dyn BackgroundJob>>) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = jobs
        .into_iter()
        .map(|job| {
            info!(
                "Scheduling job '{}' every {:?} ({})",
                job.id(),
                job.schedule().interval,
                job.description()
            );
            tokio::spawn(run_job_loop(job, shutdown_rx.clone()))
        })
        .collect();

    SchedulerHandle {
        shutdown_tx,
        handles,
    }
}

async fn run_job_loop(job: Arc<dyn BackgroundJob>, mut shutdown_rx: watch::Receiver<bool>) {
    let schedule = job.schedule();

    if schedule.run_on_startup {
        execute_and_log(job.as_ref()).await;
    }

    let mut ticker = tokio::time::interval(schedule.interval);
    // Consume the immediate first tick; startup runs are opt-in above.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                execute_and_log(job.as_ref()).await;
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn execute_and_log(job: &dyn BackgroundJob) {
    let start = Instant::now();
    match job.execute().await {
        Ok(()) => info!(
            "Job '{}' completed in {}ms",
            job.id(),
            start.elapsed().as_millis()
        ),
        Err(err) => error!("Job '{}' failed: {}", job.id(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::job::{JobError, JobSchedule};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingJob {
        runs: Arc<AtomicUsize>,
        run_on_startup: bool,
    }

    #[async_trait]
    impl BackgroundJob for CountingJob {
        fn id(&self) -> &'static str {
            "counting"
        }

        fn name(&self) -> &'static str {
            "Counting Job"
        }

        fn description(&self) -> &'static str {
            "Counts its own executions"
        }

        fn schedule(&self) -> JobSchedule {
            JobSchedule {
                interval: Duration::from_millis(20),
                run_on_startup: self.run_on_startup,
            }
        }

        async fn execute(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_on_interval_and_stops_on_shutdown() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = start_scheduler(vec![Arc::new(CountingJob {
            runs: runs.clone(),
            run_on_startup: false,
        })]);

        tokio::time::sleep(Duration::from_millis(90)).await;
        handle.shutdown().await;

        let count = runs.load(Ordering::SeqCst);
        assert!(count >= 2, "expected at least 2 runs, got {}", count);

        // No further runs after shutdown
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(runs.load(Ordering::SeqCst), count);
    }

    #[tokio::test]
    async fn startup_run_happens_immediately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = start_scheduler(vec![Arc::new(CountingJob {
            runs: runs.clone(),
            run_on_startup: true,
        })]);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1);
        handle.shutdown().await;
    }
}

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use super::engine::{AlertEngine, ProcessOutcome};
use crate::config::AlertsConfig;
use crate::models::DetectedChange;
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollReport {
    pub fetched: usize,
    pub alerted: usize,
    pub suppressed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Feeds unprocessed changes, oldest first, through the alert engine.
pub struct AlertPoller {
    pool: SqlitePool,
    engine: Arc<AlertEngine>,
    config: AlertsConfig,
    // Keeps a slow batch from overlapping with the next tick.
    running: Mutex<()>,
}

impl AlertPoller {
    pub fn new(pool: SqlitePool, engine: Arc<AlertEngine>, config: AlertsConfig) -> Self {
        Self {
            pool,
            engine,
            config,
            running: Mutex::new(()),
        }
    }

    pub async fn run_once(&self) -> Result<PollReport> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Alert poll still running, skipping tick");
            return Ok(PollReport::default());
        };

        let changes =
            DetectedChange::find_unprocessed(i64::from(self.config.batch_size), &self.pool).await?;
        let mut report = PollReport {
            fetched: changes.len(),
            ..PollReport::default()
        };

        if changes.is_empty() {
            return Ok(report);
        }

        info!("Processing {} new change(s)", changes.len());

        for change in &changes {
            match self.engine.process_change(change).await {
                Ok(ProcessOutcome::Alerted(_)) => report.alerted += 1,
                Ok(ProcessOutcome::Suppressed { .. }) => report.suppressed += 1,
                Ok(ProcessOutcome::AlreadyProcessed) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(change_id = change.id, "Error processing change: {}", e);
                }
            }
        }

        Ok(report)
    }

    async fn poll(&self) {
        if let Err(e) = self.run_once().await {
            error!("Failed to fetch changes: {}", e);
        }
    }

    /// Polls once right away, then on every interval. The returned scheduler
    /// must be shut down by the caller.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        self.poll().await;

        let scheduler = JobScheduler::new().await?;
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let this = Arc::clone(&self);

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                this.poll().await;
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(
            "Alert poller started (interval: {}s)",
            self.config.poll_interval_secs
        );
        Ok(scheduler)
    }
}

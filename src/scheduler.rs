use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::models::{Frequency, MonitoredPage};
use crate::queue::{JobQueue, ScrapeJob};
use crate::utils::error::Result;

/// Outcome of one sweep over due pages.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub enqueued: usize,
    pub failed: usize,
}

/// Periodic sweep that enqueues due pages and pushes their next run forward.
///
/// Designed for a single running instance: the due query and the reschedule
/// write are separate statements, so two schedulers can enqueue the same page
/// twice.
pub struct PageScheduler {
    pool: SqlitePool,
    queue: Arc<dyn JobQueue>,
    config: SchedulerConfig,
    // Keeps a slow sweep from overlapping with the next tick.
    running: Mutex<()>,
}

impl PageScheduler {
    pub fn new(pool: SqlitePool, queue: Arc<dyn JobQueue>, config: SchedulerConfig) -> Self {
        Self {
            pool,
            queue,
            config,
            running: Mutex::new(()),
        }
    }

    /// Makes every never-scheduled page due now.
    pub async fn initialize(&self) -> Result<u64> {
        let initialized = MonitoredPage::initialize_unscheduled(Utc::now(), &self.pool).await?;
        if initialized > 0 {
            info!("Scheduler: initialized {} unscheduled page(s)", initialized);
        }
        Ok(initialized)
    }

    pub async fn tick(&self) -> Result<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// Enqueues every page due at `now`. A page whose push fails keeps its
    /// old `next_run_at` and is picked up again on the next tick.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let pages = MonitoredPage::find_due(now, &self.pool).await?;
        let mut report = TickReport {
            due: pages.len(),
            ..TickReport::default()
        };

        if pages.is_empty() {
            debug!("Scheduler: no pages due");
            return Ok(report);
        }

        info!("Scheduler: found {} page(s) to scrape", pages.len());

        for page in &pages {
            match self.enqueue_page(page, now).await {
                Ok(()) => {
                    report.enqueued += 1;
                    info!(page_id = page.id, url = %page.url, "Scheduler: queued page");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(page_id = page.id, url = %page.url, "Scheduler: failed to queue page: {}", e);
                }
            }
        }

        Ok(report)
    }

    async fn enqueue_page(&self, page: &MonitoredPage, now: DateTime<Utc>) -> Result<()> {
        let job = ScrapeJob {
            page_id: page.id,
            url: page.url.clone(),
            page_type: page.page_type.clone(),
        };

        if let Err(e) = self.queue.push(&job).await {
            counter!("rivalprice_enqueue_failures_total").increment(1);
            return Err(e.into());
        }
        counter!("rivalprice_jobs_enqueued_total").increment(1);

        let next_run_at = now + Frequency::interval(page.frequency());
        MonitoredPage::mark_scheduled(page.id, now, next_run_at, &self.pool).await
    }

    /// Runs the initialization pass and starts the fixed-period tick. The
    /// returned scheduler must be shut down by the caller.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        self.initialize().await?;

        let scheduler = JobScheduler::new().await?;
        let interval = Duration::from_secs(self.config.tick_interval_secs);
        let this = Arc::clone(&self);

        let job = Job::new_repeated_async(interval, move |_uuid, _l| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                let Ok(_guard) = this.running.try_lock() else {
                    debug!("Scheduler: previous tick still running, skipping");
                    return;
                };
                if let Err(e) = this.tick().await {
                    error!("Scheduler: tick failed: {}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;
        info!(
            "Scheduler started, ticking every {} seconds",
            self.config.tick_interval_secs
        );
        Ok(scheduler)
    }
}

use metrics::counter;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{QueueConfig, ScraperConfig};
use crate::extraction;
use crate::models::{NewSnapshot, Snapshot, SnapshotDiagnostics};
use crate::queue::{JobQueue, QueueError, ScrapeJob};
use crate::utils::error::Result;

/// Raw HTTP response for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body: String,
    pub final_url: String, // After redirects
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    /// The pop wait elapsed without a job.
    Idle,
    Stored(Snapshot),
    /// The job was lost: malformed payload, failed fetch or failed write.
    Dropped,
    /// The queue itself could not be reached.
    QueueUnavailable,
}

/// Queue consumer: fetch, extract, persist one snapshot per job.
///
/// No retries anywhere. A job whose fetch or write fails is gone.
pub struct ScrapeWorker {
    pool: SqlitePool,
    queue: Arc<dyn JobQueue>,
    client: Client,
    pop_wait: Duration,
}

impl ScrapeWorker {
    pub fn new(
        pool: SqlitePool,
        queue: Arc<dyn JobQueue>,
        scraper: &ScraperConfig,
        queue_config: &QueueConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(scraper.request_timeout_secs))
            .user_agent(scraper.user_agent.clone())
            .build()?;

        Ok(Self {
            pool,
            queue,
            client,
            pop_wait: Duration::from_secs(queue_config.pop_timeout_secs),
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let start_time = Instant::now();
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(FetchedPage {
            status_code,
            body,
            final_url,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Fetches the job's URL and stores a snapshot. The snapshot is written
    /// whatever the HTTP status; only transport failures abort.
    pub async fn process_job(&self, job: &ScrapeJob) -> Result<Snapshot> {
        let page = self.fetch(&job.url).await?;
        if !(200..300).contains(&page.status_code) {
            warn!(
                page_id = job.page_id,
                url = %job.url,
                status = page.status_code,
                "Non-success status, storing snapshot anyway"
            );
        }

        let extracted = extraction::extract(&page.body);
        let snapshot = Snapshot::create(
            NewSnapshot {
                monitored_page_id: job.page_id,
                price: extracted.price.clone(),
                availability: extracted.availability,
                diagnostics: SnapshotDiagnostics {
                    title: extracted.title,
                    url: job.url.clone(),
                    html: page.body,
                    price_found: extracted.price,
                    availability: extracted.availability,
                    status_code: page.status_code,
                },
            },
            &self.pool,
        )
        .await?;

        Ok(snapshot)
    }

    pub async fn run_once(&self) -> WorkOutcome {
        let job = match self.queue.pop(self.pop_wait).await {
            Ok(Some(job)) => job,
            Ok(None) => return WorkOutcome::Idle,
            Err(QueueError::Malformed { payload, source }) => {
                error!("Discarding malformed job {:?}: {}", payload, source);
                return WorkOutcome::Dropped;
            }
            Err(e) => {
                error!("Queue pop failed: {}", e);
                return WorkOutcome::QueueUnavailable;
            }
        };

        info!(page_id = job.page_id, url = %job.url, "Scraping page");
        match self.process_job(&job).await {
            Ok(snapshot) => {
                counter!("rivalprice_snapshots_stored_total").increment(1);
                info!(
                    page_id = job.page_id,
                    snapshot_id = snapshot.id,
                    price = %snapshot.price,
                    availability = %snapshot.availability,
                    "Snapshot stored"
                );
                WorkOutcome::Stored(snapshot)
            }
            Err(e) => {
                counter!("rivalprice_scrape_failures_total").increment(1);
                error!(page_id = job.page_id, url = %job.url, "Scrape failed, job dropped: {}", e);
                WorkOutcome::Dropped
            }
        }
    }

    /// Consumes jobs until the surrounding task is cancelled.
    pub async fn run(&self) {
        info!("Scrape worker started");
        loop {
            if self.run_once().await == WorkOutcome::QueueUnavailable {
                tokio::time::sleep(self.pop_wait).await;
            }
        }
    }
}

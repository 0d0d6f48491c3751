// Integration tests for RivalPrice monitor
// These tests drive the public components against an in-memory store.

pub mod alert_tests;
pub mod scheduler_tests;
pub mod worker_tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rivalprice_monitor::config::{QueueConfig, ScraperConfig};
use rivalprice_monitor::db::create_memory_pool;
use rivalprice_monitor::models::{
    DetectedChange, Frequency, MonitoredPage, NewDetectedChange, NewMonitoredPage, PageType,
};
use rivalprice_monitor::plugins::traits::{AlertEvent, NotificationResult, NotifierPlugin};
use rivalprice_monitor::AppError;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};

pub const OWNER_ID: i64 = 1;
pub const OWNER_EMAIL: &str = "owner@example.com";

pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    Ok(create_memory_pool().await?)
}

/// Inserts user -> project -> competitor and returns the competitor id.
pub async fn seed_owner(pool: &SqlitePool) -> anyhow::Result<i64> {
    sqlx::query("INSERT INTO users (id, email) VALUES (?, ?)")
        .bind(OWNER_ID)
        .bind(OWNER_EMAIL)
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO projects (id, user_id, name) VALUES (1, ?, 'Launch')")
        .bind(OWNER_ID)
        .execute(pool)
        .await?;
    let competitor_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO competitors (project_id, name, url) VALUES (1, 'Acme', 'https://acme.test') RETURNING id",
    )
    .fetch_one(pool)
    .await?;
    Ok(competitor_id)
}

pub async fn seed_page(
    pool: &SqlitePool,
    competitor_id: i64,
    url: &str,
    frequency: Frequency,
    next_run_at: Option<DateTime<Utc>>,
) -> anyhow::Result<MonitoredPage> {
    let page = MonitoredPage::create(
        NewMonitoredPage {
            competitor_id,
            url: url.to_string(),
            css_selector: None,
            page_type: PageType::Pricing,
            frequency,
            next_run_at,
        },
        pool,
    )
    .await?;
    Ok(page)
}

pub async fn price_change(
    pool: &SqlitePool,
    page_id: i64,
    change_type: &str,
    old_price: &str,
    new_price: &str,
    percent: f64,
) -> anyhow::Result<DetectedChange> {
    let change = DetectedChange::create(
        NewDetectedChange {
            page_id,
            page_type: Some("pricing".to_string()),
            change_type: change_type.to_string(),
            old_price: Some(old_price.to_string()),
            new_price: Some(new_price.to_string()),
            change_percent: Some(percent),
            ..NewDetectedChange::default()
        },
        pool,
    )
    .await?;
    Ok(change)
}

pub fn test_scraper_config() -> (ScraperConfig, QueueConfig) {
    let scraper = ScraperConfig {
        request_timeout_secs: 5,
        user_agent: "RivalPrice-Test/1.0".to_string(),
        concurrency: 1,
    };
    let queue = QueueConfig {
        pop_timeout_secs: 1,
        ..QueueConfig::default()
    };
    (scraper, queue)
}

/// Notifier that records every target it was asked to deliver to.
pub struct RecordingNotifier {
    channel: &'static str,
    succeed: bool,
    pub sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new(channel: &'static str, succeed: bool) -> Self {
        Self {
            channel,
            succeed,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl NotifierPlugin for RecordingNotifier {
    fn plugin_type(&self) -> &'static str {
        self.channel
    }

    async fn notify(
        &self,
        target: &str,
        _event: &AlertEvent,
    ) -> Result<NotificationResult, AppError> {
        self.sent.lock().unwrap().push(target.to_string());
        if self.succeed {
            Ok(NotificationResult::delivered(format!("{}-test", self.channel)))
        } else {
            Ok(NotificationResult::not_delivered("rejected"))
        }
    }
}

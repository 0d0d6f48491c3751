use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::models::{Frequency, PageType};
use crate::utils::error::{AppError, Result};

/// A competitor page re-checked on a schedule.
///
/// Rows are created by the CRUD layer; this crate only moves `next_run_at`
/// and `last_checked_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct MonitoredPage {
    pub id: i64,
    pub competitor_id: i64,
    pub url: String,
    pub css_selector: Option<String>,
    pub page_type: String,
    pub frequency: String,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitoredPage {
    pub competitor_id: i64,
    pub url: String,
    pub css_selector: Option<String>,
    pub page_type: PageType,
    pub frequency: Frequency,
    pub next_run_at: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, competitor_id, url, css_selector, page_type, frequency, \
                       next_run_at, last_checked_at, created_at, updated_at";

impl MonitoredPage {
    pub fn frequency(&self) -> Option<Frequency> {
        Frequency::parse(&self.frequency)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run_at.is_some_and(|next| next <= now)
    }

    pub async fn create(new_page: NewMonitoredPage, pool: &SqlitePool) -> Result<Self> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO monitored_pages
                (competitor_id, url, css_selector, page_type, frequency, next_run_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(new_page.competitor_id)
        .bind(&new_page.url)
        .bind(&new_page.css_selector)
        .bind(new_page.page_type.as_str())
        .bind(new_page.frequency.as_str())
        .bind(new_page.next_run_at)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(id, pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("monitored page {}", id),
            })
    }

    pub async fn find_by_id(id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!("SELECT {} FROM monitored_pages WHERE id = ?", COLUMNS);
        let page = sqlx::query_as::<_, Self>(&q)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(page)
    }

    /// Pages whose `next_run_at` has passed. No ordering is promised.
    ///
    /// Compared through `julianday()` so rows written as `YYYY-MM-DD HH:MM:SS`
    /// by other writers order correctly against RFC3339 values.
    pub async fn find_due(now: DateTime<Utc>, pool: &SqlitePool) -> Result<Vec<Self>> {
        let q = format!(
            "SELECT {} FROM monitored_pages
             WHERE next_run_at IS NOT NULL AND julianday(next_run_at) <= julianday(?)",
            COLUMNS
        );
        let pages = sqlx::query_as::<_, Self>(&q)
            .bind(now)
            .fetch_all(pool)
            .await?;
        Ok(pages)
    }

    /// Marks every page that has never been scheduled as due at `now`.
    pub async fn initialize_unscheduled(now: DateTime<Utc>, pool: &SqlitePool) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE monitored_pages SET next_run_at = ?, updated_at = ? WHERE next_run_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_scheduled(
        id: i64,
        checked_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        pool: &SqlitePool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE monitored_pages
             SET last_checked_at = ?, next_run_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(checked_at)
        .bind(next_run_at)
        .bind(checked_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

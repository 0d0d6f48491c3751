use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::models::Availability;
use crate::utils::error::Result;

/// One immutable record per successful fetch of a monitored page.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Snapshot {
    pub id: i64,
    pub monitored_page_id: i64,
    pub price: String,
    pub availability: Availability,
    pub raw_data: String,
    pub scraped_at: DateTime<Utc>,
}

/// Diagnostic blob persisted alongside every snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotDiagnostics {
    pub title: String,
    pub url: String,
    pub html: String,
    pub price_found: String,
    pub availability: Availability,
    pub status_code: u16,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub monitored_page_id: i64,
    pub price: String,
    pub availability: Availability,
    pub diagnostics: SnapshotDiagnostics,
}

const COLUMNS: &str = "id, monitored_page_id, price, availability, raw_data, scraped_at";

impl Snapshot {
    pub async fn create(new_snapshot: NewSnapshot, pool: &SqlitePool) -> Result<Self> {
        let raw_data = serde_json::to_string(&new_snapshot.diagnostics)?;
        let scraped_at = Utc::now();

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO snapshots (monitored_page_id, price, availability, raw_data, scraped_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(new_snapshot.monitored_page_id)
        .bind(&new_snapshot.price)
        .bind(new_snapshot.availability)
        .bind(&raw_data)
        .bind(scraped_at)
        .fetch_one(pool)
        .await?;

        Ok(Self {
            id,
            monitored_page_id: new_snapshot.monitored_page_id,
            price: new_snapshot.price,
            availability: new_snapshot.availability,
            raw_data,
            scraped_at,
        })
    }

    pub async fn latest_for_page(page_id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!(
            "SELECT {} FROM snapshots WHERE monitored_page_id = ? ORDER BY scraped_at DESC, id DESC LIMIT 1",
            COLUMNS
        );
        let snapshot = sqlx::query_as::<_, Self>(&q)
            .bind(page_id)
            .fetch_optional(pool)
            .await?;
        Ok(snapshot)
    }

    pub async fn list_for_page(page_id: i64, pool: &SqlitePool) -> Result<Vec<Self>> {
        let q = format!(
            "SELECT {} FROM snapshots WHERE monitored_page_id = ? ORDER BY scraped_at ASC, id ASC",
            COLUMNS
        );
        let snapshots = sqlx::query_as::<_, Self>(&q)
            .bind(page_id)
            .fetch_all(pool)
            .await?;
        Ok(snapshots)
    }

    pub fn diagnostics(&self) -> serde_json::Result<SnapshotDiagnostics> {
        serde_json::from_str(&self.raw_data)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::utils::error::Result;

/// Comparison result between two snapshots, written by the external diffing
/// service. Never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct DetectedChange {
    pub id: i64,
    pub page_id: i64,
    pub page_type: Option<String>,
    pub change_type: String,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub old_availability: Option<String>,
    pub new_availability: Option<String>,
    pub old_features: Option<String>,
    pub new_features: Option<String>,
    pub features_added: Option<String>,
    pub features_removed: Option<String>,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDetectedChange {
    pub page_id: i64,
    pub page_type: Option<String>,
    pub change_type: String,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub features_added: Option<String>,
    pub features_removed: Option<String>,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
    pub detected_at: Option<DateTime<Utc>>,
}

/// Closed classification of the free-form `change_type` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    PriceIncrease,
    PriceDecrease,
    FeatureAdded,
    FeatureRemoved,
    MessagingChange,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    Price,
    Feature,
    Messaging,
    Unknown,
}

// Matched as substrings, first hit wins.
const KIND_TAGS: [(&str, ChangeKind); 5] = [
    ("price_increase", ChangeKind::PriceIncrease),
    ("price_decrease", ChangeKind::PriceDecrease),
    ("feature_added", ChangeKind::FeatureAdded),
    ("feature_removed", ChangeKind::FeatureRemoved),
    ("messaging_change", ChangeKind::MessagingChange),
];

impl ChangeKind {
    pub fn from_tag(tag: &str) -> Self {
        KIND_TAGS
            .iter()
            .find(|(needle, _)| tag.contains(needle))
            .map(|(_, kind)| *kind)
            .unwrap_or(ChangeKind::Other)
    }

    pub fn category(&self) -> ChangeCategory {
        match self {
            ChangeKind::PriceIncrease | ChangeKind::PriceDecrease => ChangeCategory::Price,
            ChangeKind::FeatureAdded | ChangeKind::FeatureRemoved => ChangeCategory::Feature,
            ChangeKind::MessagingChange => ChangeCategory::Messaging,
            ChangeKind::Other => ChangeCategory::Unknown,
        }
    }
}

const COLUMNS: &str = "id, page_id, page_type, change_type, old_price, new_price, change_percent, \
                       old_availability, new_availability, old_features, new_features, \
                       features_added, features_removed, old_text, new_text, detected_at";

impl DetectedChange {
    pub fn kind(&self) -> ChangeKind {
        ChangeKind::from_tag(&self.change_type)
    }

    /// Signed percentage; absent values count as zero.
    pub fn percent(&self) -> f64 {
        self.change_percent.unwrap_or(0.0)
    }

    pub async fn create(new_change: NewDetectedChange, pool: &SqlitePool) -> Result<Self> {
        let detected_at = new_change.detected_at.unwrap_or_else(Utc::now);
        let q = format!(
            "INSERT INTO detected_changes
                (page_id, page_type, change_type, old_price, new_price, change_percent,
                 features_added, features_removed, old_text, new_text, detected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {}",
            COLUMNS
        );
        let change = sqlx::query_as::<_, Self>(&q)
            .bind(new_change.page_id)
            .bind(&new_change.page_type)
            .bind(&new_change.change_type)
            .bind(&new_change.old_price)
            .bind(&new_change.new_price)
            .bind(new_change.change_percent)
            .bind(&new_change.features_added)
            .bind(&new_change.features_removed)
            .bind(&new_change.old_text)
            .bind(&new_change.new_text)
            .bind(detected_at)
            .fetch_one(pool)
            .await?;
        Ok(change)
    }

    pub async fn find_by_id(id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!("SELECT {} FROM detected_changes WHERE id = ?", COLUMNS);
        let change = sqlx::query_as::<_, Self>(&q)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(change)
    }

    /// Oldest-first batch of changes that have neither an alert nor a
    /// recorded suppression.
    pub async fn find_unprocessed(limit: i64, pool: &SqlitePool) -> Result<Vec<Self>> {
        let columns = COLUMNS
            .split(',')
            .map(|c| format!("dc.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let q = format!(
            "SELECT {}
             FROM detected_changes dc
             LEFT JOIN alert_logs al ON al.change_id = dc.id
             LEFT JOIN alert_suppressions s ON s.change_id = dc.id
             WHERE al.id IS NULL AND s.id IS NULL
             ORDER BY julianday(dc.detected_at) ASC, dc.id ASC
             LIMIT ?",
            columns
        );
        let changes = sqlx::query_as::<_, Self>(&q)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(changes)
    }

    pub async fn count_unprocessed(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*)
             FROM detected_changes dc
             LEFT JOIN alert_logs al ON al.change_id = dc.id
             LEFT JOIN alert_suppressions s ON s.change_id = dc.id
             WHERE al.id IS NULL AND s.id IS NULL",
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}

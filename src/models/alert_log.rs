use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::models::Severity;
use crate::utils::error::Result;

/// Delivery channel label used when nothing was delivered.
pub const LOG_CHANNEL: &str = "log";

/// At most one row per detected change (unique on `change_id`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AlertLog {
    pub id: i64,
    pub change_id: i64,
    pub page_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub summary: String,
    pub recommendation: String,
    pub impact_level: Option<i64>,
    pub model: Option<String>,
    pub message: String,
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
    pub notify_channel: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAlertLog {
    pub change_id: i64,
    pub page_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub old_price: Option<String>,
    pub new_price: Option<String>,
    pub change_percent: Option<f64>,
    pub summary: String,
    pub recommendation: String,
    pub impact_level: Option<i64>,
    pub model: Option<String>,
    pub message: String,
}

/// Remembers that a change was evaluated and deliberately not alerted on.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct AlertSuppression {
    pub id: i64,
    pub change_id: i64,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, change_id, page_id, alert_type, severity, old_price, new_price, change_percent, \
                       summary, recommendation, impact_level, model, message, notified, notified_at, \
                       notify_channel, created_at";

impl AlertLog {
    /// Inserts the alert unless one already exists for the change. Returns
    /// `None` when the change was already alerted on.
    pub async fn create_once(new_alert: NewAlertLog, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!(
            "INSERT INTO alert_logs
                (change_id, page_id, alert_type, severity, old_price, new_price, change_percent,
                 summary, recommendation, impact_level, model, message, notified, notify_channel, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT(change_id) DO NOTHING
             RETURNING {}",
            COLUMNS
        );
        let alert = sqlx::query_as::<_, Self>(&q)
            .bind(new_alert.change_id)
            .bind(new_alert.page_id)
            .bind(&new_alert.alert_type)
            .bind(new_alert.severity)
            .bind(&new_alert.old_price)
            .bind(&new_alert.new_price)
            .bind(new_alert.change_percent)
            .bind(&new_alert.summary)
            .bind(&new_alert.recommendation)
            .bind(new_alert.impact_level)
            .bind(&new_alert.model)
            .bind(&new_alert.message)
            .bind(LOG_CHANNEL)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await?;
        Ok(alert)
    }

    pub async fn mark_notified(
        id: i64,
        channel: &str,
        notified_at: DateTime<Utc>,
        pool: &SqlitePool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE alert_logs SET notified = 1, notified_at = ?, notify_channel = ? WHERE id = ?",
        )
        .bind(notified_at)
        .bind(channel)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_change(change_id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!("SELECT {} FROM alert_logs WHERE change_id = ?", COLUMNS);
        let alert = sqlx::query_as::<_, Self>(&q)
            .bind(change_id)
            .fetch_optional(pool)
            .await?;
        Ok(alert)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM alert_logs")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

impl AlertSuppression {
    pub async fn record(change_id: i64, reason: &str, pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_suppressions (change_id, reason, decided_at)
             VALUES (?, ?, ?)
             ON CONFLICT(change_id) DO NOTHING",
        )
        .bind(change_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_change(change_id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let suppression = sqlx::query_as::<_, Self>(
            "SELECT id, change_id, reason, decided_at FROM alert_suppressions WHERE change_id = ?",
        )
        .bind(change_id)
        .fetch_optional(pool)
        .await?;
        Ok(suppression)
    }
}

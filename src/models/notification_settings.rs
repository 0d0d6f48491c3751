use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::utils::error::{AppError, Result};

pub const DEFAULT_MINIMUM_CHANGE_PERCENT: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct UserNotificationSettings {
    pub id: i64,
    pub user_id: i64,
    pub notify_email: bool,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
    pub minimum_change_percent: f64,
    pub alert_on_price_change: bool,
    pub alert_on_feature_change: bool,
    pub alert_on_messaging: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The rule set the alert engine evaluates, detached from storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertPreferences {
    pub notify_email: bool,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
    pub minimum_change_percent: f64,
    pub alert_on_price_change: bool,
    pub alert_on_feature_change: bool,
    pub alert_on_messaging: bool,
}

impl AlertPreferences {
    /// Used when a page cannot be traced back to a user: category toggles at
    /// their defaults, every delivery channel off.
    pub fn unresolved() -> Self {
        Self {
            notify_email: false,
            notify_webhook: false,
            webhook_url: None,
            minimum_change_percent: DEFAULT_MINIMUM_CHANGE_PERCENT,
            alert_on_price_change: true,
            alert_on_feature_change: true,
            alert_on_messaging: false,
        }
    }

    /// Row written the first time a user's settings are needed.
    pub fn new_user() -> Self {
        Self {
            notify_email: true,
            ..Self::unresolved()
        }
    }

    /// Webhook target, only when the channel is enabled and a URL is set.
    pub fn webhook_target(&self) -> Option<&str> {
        if !self.notify_webhook {
            return None;
        }
        self.webhook_url.as_deref().filter(|url| !url.trim().is_empty())
    }
}

impl From<&UserNotificationSettings> for AlertPreferences {
    fn from(settings: &UserNotificationSettings) -> Self {
        Self {
            notify_email: settings.notify_email,
            notify_webhook: settings.notify_webhook,
            webhook_url: settings.webhook_url.clone(),
            minimum_change_percent: settings.minimum_change_percent,
            alert_on_price_change: settings.alert_on_price_change,
            alert_on_feature_change: settings.alert_on_feature_change,
            alert_on_messaging: settings.alert_on_messaging,
        }
    }
}

const COLUMNS: &str = "id, user_id, notify_email, notify_webhook, webhook_url, minimum_change_percent, \
                       alert_on_price_change, alert_on_feature_change, alert_on_messaging, \
                       created_at, updated_at";

impl UserNotificationSettings {
    pub async fn find_for_user(user_id: i64, pool: &SqlitePool) -> Result<Option<Self>> {
        let q = format!(
            "SELECT {} FROM user_notification_settings WHERE user_id = ?",
            COLUMNS
        );
        let settings = sqlx::query_as::<_, Self>(&q)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        Ok(settings)
    }

    /// Inserts the new-user defaults unless a row already exists, then returns
    /// whatever row is stored.
    pub async fn create_default_for_user(user_id: i64, pool: &SqlitePool) -> Result<Self> {
        let defaults = AlertPreferences::new_user();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO user_notification_settings
                (user_id, notify_email, notify_webhook, webhook_url, minimum_change_percent,
                 alert_on_price_change, alert_on_feature_change, alert_on_messaging,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(defaults.notify_email)
        .bind(defaults.notify_webhook)
        .bind(&defaults.webhook_url)
        .bind(defaults.minimum_change_percent)
        .bind(defaults.alert_on_price_change)
        .bind(defaults.alert_on_feature_change)
        .bind(defaults.alert_on_messaging)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_for_user(user_id, pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("notification settings for user {}", user_id),
            })
    }

    /// Writes a full preference set for a user, creating the row if needed.
    pub async fn upsert_for_user(
        user_id: i64,
        preferences: &AlertPreferences,
        pool: &SqlitePool,
    ) -> Result<Self> {
        let now = Utc::now();
        let q = format!(
            "INSERT INTO user_notification_settings
                (user_id, notify_email, notify_webhook, webhook_url, minimum_change_percent,
                 alert_on_price_change, alert_on_feature_change, alert_on_messaging,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                notify_email = excluded.notify_email,
                notify_webhook = excluded.notify_webhook,
                webhook_url = excluded.webhook_url,
                minimum_change_percent = excluded.minimum_change_percent,
                alert_on_price_change = excluded.alert_on_price_change,
                alert_on_feature_change = excluded.alert_on_feature_change,
                alert_on_messaging = excluded.alert_on_messaging,
                updated_at = excluded.updated_at
             RETURNING {}",
            COLUMNS
        );
        let settings = sqlx::query_as::<_, Self>(&q)
            .bind(user_id)
            .bind(preferences.notify_email)
            .bind(preferences.notify_webhook)
            .bind(&preferences.webhook_url)
            .bind(preferences.minimum_change_percent)
            .bind(preferences.alert_on_price_change)
            .bind(preferences.alert_on_feature_change)
            .bind(preferences.alert_on_messaging)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await?;
        Ok(settings)
    }
}

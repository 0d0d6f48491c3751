use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, warn};

use crate::models::{AlertPreferences, UserNotificationSettings};
use crate::utils::error::Result;

/// Notification rules and contact for the user owning a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedPreferences {
    pub preferences: AlertPreferences,
    pub email: Option<String>,
    pub user_id: Option<i64>,
}

impl ResolvedPreferences {
    pub fn unresolved() -> Self {
        Self {
            preferences: AlertPreferences::unresolved(),
            email: None,
            user_id: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.user_id.is_some()
    }

    /// Email recipient, only when the channel is on and an address is known.
    pub fn email_target(&self) -> Option<&str> {
        if !self.preferences.notify_email {
            return None;
        }
        self.email.as_deref().filter(|email| !email.trim().is_empty())
    }
}

#[derive(Debug, FromRow)]
struct OwnerRow {
    user_id: i64,
    email: String,
    settings_id: Option<i64>,
    notify_email: Option<bool>,
    notify_webhook: Option<bool>,
    webhook_url: Option<String>,
    minimum_change_percent: Option<f64>,
    alert_on_price_change: Option<bool>,
    alert_on_feature_change: Option<bool>,
    alert_on_messaging: Option<bool>,
}

impl OwnerRow {
    fn stored_preferences(&self) -> Option<AlertPreferences> {
        self.settings_id?;
        Some(AlertPreferences {
            notify_email: self.notify_email?,
            notify_webhook: self.notify_webhook?,
            webhook_url: self.webhook_url.clone(),
            minimum_change_percent: self.minimum_change_percent?,
            alert_on_price_change: self.alert_on_price_change?,
            alert_on_feature_change: self.alert_on_feature_change?,
            alert_on_messaging: self.alert_on_messaging?,
        })
    }
}

/// Walks page -> competitor -> project -> user -> settings.
#[derive(Clone)]
pub struct PreferenceResolver {
    pool: SqlitePool,
}

impl PreferenceResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Never fails on a broken ownership chain: that yields
    /// [`ResolvedPreferences::unresolved`]. Store errors do propagate.
    pub async fn resolve(&self, page_id: i64) -> Result<ResolvedPreferences> {
        let owner = sqlx::query_as::<_, OwnerRow>(
            "SELECT u.id AS user_id, u.email AS email, s.id AS settings_id,
                    s.notify_email, s.notify_webhook, s.webhook_url, s.minimum_change_percent,
                    s.alert_on_price_change, s.alert_on_feature_change, s.alert_on_messaging
             FROM monitored_pages mp
             JOIN competitors c ON c.id = mp.competitor_id
             JOIN projects p ON p.id = c.project_id
             JOIN users u ON u.id = p.user_id
             LEFT JOIN user_notification_settings s ON s.user_id = u.id
             WHERE mp.id = ?
             LIMIT 1",
        )
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(owner) = owner else {
            warn!(page_id, "Could not resolve owner for page, using default preferences");
            return Ok(ResolvedPreferences::unresolved());
        };

        let preferences = match owner.stored_preferences() {
            Some(preferences) => preferences,
            None => {
                let created =
                    UserNotificationSettings::create_default_for_user(owner.user_id, &self.pool)
                        .await?;
                info!(
                    page_id,
                    user_id = owner.user_id,
                    "Created default notification settings"
                );
                AlertPreferences::from(&created)
            }
        };

        Ok(ResolvedPreferences {
            preferences,
            email: Some(owner.email),
            user_id: Some(owner.user_id),
        })
    }
}

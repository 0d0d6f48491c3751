use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{AlertLog, Severity};
use crate::utils::error::AppError;

/// Everything a delivery channel needs to render one alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub alert_id: i64,
    pub change_id: i64,
    pub page_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub summary: String,
    pub recommendation: String,
    pub message: String,
    pub impact_level: Option<i64>,
}

impl From<&AlertLog> for AlertEvent {
    fn from(alert: &AlertLog) -> Self {
        Self {
            alert_id: alert.id,
            change_id: alert.change_id,
            page_id: alert.page_id,
            alert_type: alert.alert_type.clone(),
            severity: alert.severity,
            summary: alert.summary.clone(),
            recommendation: alert.recommendation.clone(),
            message: alert.message.clone(),
            impact_level: alert.impact_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn not_delivered(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(reason.into()),
        }
    }
}

/// A best-effort alert delivery channel (email, webhook).
///
/// `target` is channel specific: a recipient address for email, a URL for
/// webhooks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Label recorded in `alert_logs.notify_channel`.
    fn plugin_type(&self) -> &'static str;

    async fn notify(&self, target: &str, event: &AlertEvent) -> Result<NotificationResult, AppError>;
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::plugins::traits::{AlertEvent, NotificationResult, NotifierPlugin};
use crate::utils::error::Result;

/// POSTs the alert as JSON to a user-supplied URL. Any non-2xx status is a
/// failed delivery.
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn create_payload(&self, event: &AlertEvent) -> serde_json::Value {
        json!({
            "alert_id": event.alert_id,
            "change_id": event.change_id,
            "page_id": event.page_id,
            "alert_type": event.alert_type,
            "severity": event.severity,
            "summary": event.summary,
            "recommendation": event.recommendation,
            "message": event.message,
            "impact_level": event.impact_level,
        })
    }
}

#[async_trait]
impl NotifierPlugin for WebhookNotifier {
    fn plugin_type(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, target: &str, event: &AlertEvent) -> Result<NotificationResult> {
        let response = self
            .client
            .post(target)
            .json(&self.create_payload(event))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(NotificationResult::delivered(format!(
                "webhook-{}-{}",
                event.alert_id,
                status.as_u16()
            )))
        } else {
            Ok(NotificationResult::not_delivered(format!(
                "webhook responded with status {}",
                status
            )))
        }
    }
}

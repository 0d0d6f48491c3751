use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::traits::{AlertEvent, NotificationResult, NotifierPlugin};
use crate::models::LOG_CHANNEL;
use crate::utils::error::AppError;

pub type NotifierPluginBox = Arc<dyn NotifierPlugin>;

/// One channel to attempt for one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub channel: String,
    pub address: String,
}

impl DeliveryTarget {
    pub fn new(channel: &str, address: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }

    /// `log` when nothing went out, else the delivered channels in attempt
    /// order joined by commas.
    pub fn channel_label(&self) -> String {
        if self.delivered.is_empty() {
            LOG_CHANNEL.to_string()
        } else {
            self.delivered.join(",")
        }
    }
}

/// Registry of notifier plugins keyed by channel name.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifiers: Arc<RwLock<HashMap<String, NotifierPluginBox>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_notifier(&self, plugin: NotifierPluginBox) {
        let plugin_type = plugin.plugin_type().to_string();
        let mut notifiers = self.notifiers.write().await;
        notifiers.insert(plugin_type, plugin);
    }

    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        let notifiers = self.notifiers.read().await;
        notifiers.contains_key(plugin_type)
    }

    pub async fn list_notifier_types(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().await;
        let mut types: Vec<String> = notifiers.keys().cloned().collect();
        types.sort();
        types
    }

    pub async fn send_notification(
        &self,
        plugin_type: &str,
        target: &str,
        event: &AlertEvent,
    ) -> Result<NotificationResult, AppError> {
        let notifier = {
            let notifiers = self.notifiers.read().await;
            notifiers.get(plugin_type).cloned()
        };
        match notifier {
            Some(notifier) => notifier.notify(target, event).await,
            None => Err(AppError::notification(
                plugin_type,
                format!("notifier plugin '{}' not registered", plugin_type),
            )),
        }
    }

    /// Attempts every target independently. A failing channel never stops the
    /// ones after it.
    pub async fn dispatch(&self, event: &AlertEvent, targets: &[DeliveryTarget]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for target in targets {
            let outcome = self
                .send_notification(&target.channel, &target.address, event)
                .await;
            match outcome {
                Ok(result) if result.success => {
                    info!(
                        alert_id = event.alert_id,
                        channel = %target.channel,
                        "Notification delivered"
                    );
                    counter!("rivalprice_notifications_total", "channel" => target.channel.clone(), "result" => "delivered")
                        .increment(1);
                    report.delivered.push(target.channel.clone());
                }
                Ok(result) => {
                    warn!(
                        alert_id = event.alert_id,
                        channel = %target.channel,
                        "Notification not delivered: {}",
                        result.error.unwrap_or_default()
                    );
                    counter!("rivalprice_notifications_total", "channel" => target.channel.clone(), "result" => "failed")
                        .increment(1);
                    report.failed.push(target.channel.clone());
                }
                Err(e) => {
                    warn!(
                        alert_id = event.alert_id,
                        channel = %target.channel,
                        "Notification failed: {}",
                        e
                    );
                    counter!("rivalprice_notifications_total", "channel" => target.channel.clone(), "result" => "failed")
                        .increment(1);
                    report.failed.push(target.channel.clone());
                }
            }
        }

        report
    }
}

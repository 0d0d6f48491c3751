use chrono::Utc;
use metrics::counter;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use super::rules::{self, AlertDecision};
use crate::models::{AlertLog, AlertSuppression, DetectedChange, NewAlertLog};
use crate::plugins::summarizers::rule_based_insight;
use crate::plugins::traits::{AlertEvent, ChangeContext, Insight, Summarizer};
use crate::plugins::{DeliveryTarget, NotificationDispatcher};
use crate::preferences::{PreferenceResolver, ResolvedPreferences};
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Suppressed { reason: String },
    Alerted(AlertLog),
    /// An alert row already existed for the change.
    AlreadyProcessed,
}

/// Turns one detected change into either a recorded suppression or a
/// persisted, dispatched alert.
pub struct AlertEngine {
    pool: SqlitePool,
    resolver: PreferenceResolver,
    summarizer: Arc<dyn Summarizer>,
    dispatcher: NotificationDispatcher,
}

impl AlertEngine {
    pub fn new(
        pool: SqlitePool,
        summarizer: Arc<dyn Summarizer>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            resolver: PreferenceResolver::new(pool.clone()),
            pool,
            summarizer,
            dispatcher,
        }
    }

    pub async fn process_change(&self, change: &DetectedChange) -> Result<ProcessOutcome> {
        if AlertLog::find_by_change(change.id, &self.pool).await?.is_some() {
            return Ok(ProcessOutcome::AlreadyProcessed);
        }

        let resolved = match self.resolver.resolve(change.page_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    change_id = change.id,
                    page_id = change.page_id,
                    "Preference lookup failed, using defaults: {}",
                    e
                );
                ResolvedPreferences::unresolved()
            }
        };

        if let AlertDecision::Suppress(reason) = rules::should_alert(change, &resolved.preferences) {
            AlertSuppression::record(change.id, reason, &self.pool).await?;
            counter!("rivalprice_alerts_suppressed_total").increment(1);
            info!(change_id = change.id, "Change skipped: {}", reason);
            return Ok(ProcessOutcome::Suppressed {
                reason: reason.to_string(),
            });
        }

        let severity = rules::severity_from_change(change.kind(), change.percent());
        let insight = self.enrich(change).await;
        let message = build_alert_message(change, &insight);

        let created = AlertLog::create_once(
            NewAlertLog {
                change_id: change.id,
                page_id: change.page_id,
                alert_type: change.change_type.clone(),
                severity,
                old_price: change.old_price.clone(),
                new_price: change.new_price.clone(),
                change_percent: change.change_percent,
                summary: insight.summary.clone(),
                recommendation: insight.recommendation.clone(),
                impact_level: insight.impact_level,
                model: Some(insight.model.clone()),
                message,
            },
            &self.pool,
        )
        .await?;

        let Some(mut alert) = created else {
            return Ok(ProcessOutcome::AlreadyProcessed);
        };

        counter!("rivalprice_alerts_created_total", "severity" => severity.as_str()).increment(1);
        info!(
            change_id = change.id,
            page_id = change.page_id,
            severity = %severity,
            impact = insight.impact_level.unwrap_or_default(),
            "Alert created [{}]: {}",
            change.change_type,
            insight.summary
        );

        let targets = delivery_targets(&resolved);
        if targets.is_empty() {
            return Ok(ProcessOutcome::Alerted(alert));
        }

        let report = self
            .dispatcher
            .dispatch(&AlertEvent::from(&alert), &targets)
            .await;

        if report.any_delivered() {
            let channel = report.channel_label();
            let notified_at = Utc::now();
            AlertLog::mark_notified(alert.id, &channel, notified_at, &self.pool).await?;
            alert.notified = true;
            alert.notified_at = Some(notified_at);
            alert.notify_channel = channel;
        }

        Ok(ProcessOutcome::Alerted(alert))
    }

    /// Summarizer output, or the rule-based templates when it fails.
    async fn enrich(&self, change: &DetectedChange) -> Insight {
        let context = ChangeContext::from(change);
        match self.summarizer.summarize(&context).await {
            Ok(insight) => insight,
            Err(e) => {
                warn!(change_id = change.id, "Summarizer unavailable, using rule-based insight: {}", e);
                rule_based_insight(&context)
            }
        }
    }
}

fn delivery_targets(resolved: &ResolvedPreferences) -> Vec<DeliveryTarget> {
    let mut targets = Vec::new();
    if let Some(email) = resolved.email_target() {
        targets.push(DeliveryTarget::new("email", email));
    }
    if let Some(url) = resolved.preferences.webhook_target() {
        targets.push(DeliveryTarget::new("webhook", url));
    }
    targets
}

/// Factual section, then summary, then recommendation.
pub fn build_alert_message(change: &DetectedChange, insight: &Insight) -> String {
    let mut msg = String::new();

    msg.push_str("=== FACTS ===\n");
    let old_price = change.old_price.as_deref().unwrap_or_default();
    let new_price = change.new_price.as_deref().unwrap_or_default();
    if !old_price.is_empty() && !new_price.is_empty() {
        msg.push_str(&format!(
            "Price: {} → {} ({:.1}%)\n",
            old_price,
            new_price,
            change.percent()
        ));
    }
    msg.push_str(&format!("Change type: {}\n", change.change_type));
    msg.push_str(&format!("Page ID: {}\n", change.page_id));
    msg.push('\n');

    if !insight.summary.is_empty() {
        msg.push_str("=== SUMMARY ===\n");
        msg.push_str(&insight.summary);
        msg.push_str("\n\n");
    }

    if !insight.recommendation.is_empty() {
        msg.push_str("=== RECOMMENDATION ===\n");
        msg.push_str(&insight.recommendation);
        msg.push('\n');
    }

    msg
}

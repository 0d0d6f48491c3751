//! Pure decision steps: suppression and severity.

use crate::models::{AlertPreferences, ChangeCategory, ChangeKind, DetectedChange, Severity};

pub const PRICE_ALERTS_DISABLED: &str = "price alerts disabled by user";
pub const BELOW_THRESHOLD: &str = "change_percent below minimum_change_percent threshold";
pub const FEATURE_ALERTS_DISABLED: &str = "feature alerts disabled by user";
pub const MESSAGING_ALERTS_DISABLED: &str = "messaging alerts disabled by user";
pub const UNKNOWN_CHANGE_TYPE: &str = "unknown change type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    Allow,
    Suppress(&'static str),
}

impl AlertDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AlertDecision::Allow)
    }
}

pub fn should_alert(change: &DetectedChange, preferences: &AlertPreferences) -> AlertDecision {
    decide(change.kind(), change.percent(), preferences)
}

/// Exactly one branch applies per kind: price, feature, messaging, unknown.
pub fn decide(kind: ChangeKind, percent: f64, preferences: &AlertPreferences) -> AlertDecision {
    match kind.category() {
        ChangeCategory::Price => {
            if !preferences.alert_on_price_change {
                AlertDecision::Suppress(PRICE_ALERTS_DISABLED)
            } else if percent.abs() < preferences.minimum_change_percent {
                AlertDecision::Suppress(BELOW_THRESHOLD)
            } else {
                AlertDecision::Allow
            }
        }
        ChangeCategory::Feature if !preferences.alert_on_feature_change => {
            AlertDecision::Suppress(FEATURE_ALERTS_DISABLED)
        }
        ChangeCategory::Messaging if !preferences.alert_on_messaging => {
            AlertDecision::Suppress(MESSAGING_ALERTS_DISABLED)
        }
        ChangeCategory::Feature | ChangeCategory::Messaging => AlertDecision::Allow,
        ChangeCategory::Unknown => AlertDecision::Suppress(UNKNOWN_CHANGE_TYPE),
    }
}

pub fn severity_from_change(kind: ChangeKind, percent: f64) -> Severity {
    match kind.category() {
        ChangeCategory::Price => {
            let magnitude = percent.abs();
            if magnitude >= 30.0 {
                Severity::Critical
            } else if magnitude >= 15.0 {
                Severity::High
            } else if magnitude >= 5.0 {
                Severity::Medium
            } else {
                Severity::Low
            }
        }
        ChangeCategory::Feature => Severity::High,
        ChangeCategory::Messaging => Severity::Medium,
        ChangeCategory::Unknown => Severity::Low,
    }
}

use async_trait::async_trait;

use crate::models::ChangeKind;
use crate::plugins::traits::{ChangeContext, Insight, Summarizer, SummarizerError};

pub const RULE_BASED_MODEL: &str = "rule-based";

/// Deterministic templates keyed on the change kind. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedSummarizer;

impl RuleBasedSummarizer {
    pub fn new() -> Self {
        Self
    }
}

pub fn rule_based_insight(context: &ChangeContext) -> Insight {
    let magnitude = context.change_percent.abs();
    let (summary, recommendation, impact) = match ChangeKind::from_tag(&context.change_type) {
        ChangeKind::PriceIncrease => (
            format!(
                "Competitor raised price from {} to {} (+{:.1}%)",
                context.old_price, context.new_price, magnitude
            ),
            "Opportunity to capture price-sensitive customers".to_string(),
            scaled_impact(magnitude, [9, 7, 5, 3]),
        ),
        ChangeKind::PriceDecrease => (
            format!(
                "Competitor lowered price from {} to {} ({:.1}%)",
                context.old_price, context.new_price, context.change_percent
            ),
            "Consider matching price or reinforcing value proposition".to_string(),
            scaled_impact(magnitude, [10, 8, 6, 4]),
        ),
        ChangeKind::FeatureAdded => (
            "Competitor added new features to their offering".to_string(),
            "Evaluate feature gap and update roadmap".to_string(),
            7,
        ),
        ChangeKind::FeatureRemoved => (
            "Competitor removed features from their offering".to_string(),
            "Highlight your superior feature set in marketing".to_string(),
            4,
        ),
        ChangeKind::MessagingChange => (
            "Competitor updated their messaging and positioning".to_string(),
            "Review your own messaging for competitive differentiation".to_string(),
            5,
        ),
        ChangeKind::Other => (
            format!("Competitor made changes: {}", context.change_type),
            "Monitor closely for further changes".to_string(),
            3,
        ),
    };

    Insight {
        summary,
        recommendation,
        impact_level: Some(impact),
        model: RULE_BASED_MODEL.to_string(),
    }
}

// Thresholds mirror price severity: >=30, >=15, >=5, below.
fn scaled_impact(magnitude: f64, levels: [i64; 4]) -> i64 {
    if magnitude >= 30.0 {
        levels[0]
    } else if magnitude >= 15.0 {
        levels[1]
    } else if magnitude >= 5.0 {
        levels[2]
    } else {
        levels[3]
    }
}

#[async_trait]
impl Summarizer for RuleBasedSummarizer {
    fn name(&self) -> &str {
        RULE_BASED_MODEL
    }

    async fn summarize(&self, context: &ChangeContext) -> Result<Insight, SummarizerError> {
        Ok(rule_based_insight(context))
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DetectedChange;

/// Context handed to the summarization collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangeContext {
    pub change_type: String,
    pub page_type: String,
    pub old_price: String,
    pub new_price: String,
    pub change_percent: f64,
    pub features_added: String,
    pub features_removed: String,
    pub old_text: String,
    pub new_text: String,
}

impl From<&DetectedChange> for ChangeContext {
    fn from(change: &DetectedChange) -> Self {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        Self {
            change_type: change.change_type.clone(),
            page_type: text(&change.page_type),
            old_price: text(&change.old_price),
            new_price: text(&change.new_price),
            change_percent: change.percent(),
            features_added: text(&change.features_added),
            features_removed: text(&change.features_removed),
            old_text: text(&change.old_text),
            new_text: text(&change.new_text),
        }
    }
}

/// Natural-language enrichment of a change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub summary: String,
    pub recommendation: String,
    /// 1..=10 when known.
    pub impact_level: Option<i64>,
    pub model: String,
}

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("no API credential configured")]
    MissingCredential,

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparsable response: {0}")]
    Parse(String),

    #[error("response contained no content")]
    EmptyResponse,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    async fn summarize(&self, context: &ChangeContext) -> Result<Insight, SummarizerError>;
}

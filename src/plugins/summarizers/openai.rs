use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::plugins::traits::{ChangeContext, Insight, Summarizer, SummarizerError};

const SYSTEM_PROMPT: &str = "You are a competitive pricing analyst. Be concise and actionable. \
                             Return impact_level as integer 1-10.";
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f32 = 0.5;
const DEFAULT_IMPACT: i64 = 5;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InsightPayload {
    summary: String,
    recommendation: String,
    #[serde(default)]
    impact_level: Option<serde_json::Value>,
}

/// Chat-completions backed summarizer for any OpenAI compatible endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_prompt(context: &ChangeContext) -> String {
        format!(
            "Analyze this competitor change and respond with a JSON object containing \
             \"summary\", \"recommendation\" and \"impact_level\".\n\n\
             Change type: {}\n\
             Page type: {}\n\
             Old price: {}\n\
             New price: {}\n\
             Change percent: {:.1}%\n\
             Features added: {}\n\
             Features removed: {}\n\
             Old text: {}\n\
             New text: {}",
            context.change_type,
            context.page_type,
            context.old_price,
            context.new_price,
            context.change_percent,
            context.features_added,
            context.features_removed,
            context.old_text,
            context.new_text,
        )
    }
}

/// The outermost `{...}` span of a reply, which may be wrapped in prose or a
/// markdown fence.
pub fn cut_json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (start < end).then(|| &reply[start..=end])
}

pub fn normalize_impact(value: Option<&serde_json::Value>) -> i64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    raw.map(|level| level.clamp(1, 10)).unwrap_or(DEFAULT_IMPACT)
}

pub fn parse_insight(reply: &str, model: &str) -> Result<Insight, SummarizerError> {
    let object = cut_json_object(reply)
        .ok_or_else(|| SummarizerError::Parse("no JSON object in reply".to_string()))?;
    let payload: InsightPayload =
        serde_json::from_str(object).map_err(|e| SummarizerError::Parse(e.to_string()))?;

    Ok(Insight {
        summary: payload.summary,
        recommendation: payload.recommendation,
        impact_level: Some(normalize_impact(payload.impact_level.as_ref())),
        model: model.to_string(),
    })
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, context: &ChangeContext) -> Result<Insight, SummarizerError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SummarizerError::MissingCredential)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(Self::build_prompt(context)),
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Parse(e.to_string()))?;
        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(SummarizerError::EmptyResponse)?;

        debug!(model = %self.model, "Summarizer reply: {}", reply);
        parse_insight(&reply, &self.model)
    }
}

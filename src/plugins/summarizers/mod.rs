// Summarizer plugin implementations
pub mod openai;
pub mod rule_based;

pub use openai::OpenAiSummarizer;
pub use rule_based::{rule_based_insight, RuleBasedSummarizer, RULE_BASED_MODEL};

pub mod notifier;
pub mod summarizer;

pub use notifier::{AlertEvent, NotificationResult, NotifierPlugin};
pub use summarizer::{ChangeContext, Insight, Summarizer, SummarizerError};

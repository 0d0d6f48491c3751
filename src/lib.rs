pub mod alerts;
pub mod config;
pub mod db;
pub mod extraction;
pub mod models;
pub mod plugins;
pub mod preferences;
pub mod queue;
pub mod scheduler;
pub mod scraper;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::{AppError, Result};

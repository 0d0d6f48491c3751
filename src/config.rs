use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

pub const ENV_PREFIX: &str = "RIVALPRICE";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Conventional deployment variables and the keys they stand in for.
const ENV_FALLBACKS: [(&str, &str); 8] = [
    ("DATABASE_URL", "database.url"),
    ("REDIS_URL", "queue.url"),
    ("OPENAI_API_KEY", "summarizer.api_key"),
    ("SMTP_HOST", "notifications.smtp.host"),
    ("SMTP_PORT", "notifications.smtp.port"),
    ("SMTP_FROM", "notifications.smtp.from_address"),
    ("SMTP_USERNAME", "notifications.smtp.username"),
    ("SMTP_PASSWORD", "notifications.smtp.password"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub scraper: ScraperConfig,
    pub alerts: AlertsConfig,
    pub summarizer: SummarizerConfig,
    pub notifications: NotificationsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://rivalprice.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub url: String,
    pub key: String,
    pub push_timeout_secs: u64,
    pub pop_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key: "scrape_job".to_string(),
            push_timeout_secs: 5,
            pop_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub concurrency: usize,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub poll_interval_secs: u64,
    pub batch_size: u32,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub product_name: String,
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            product_name: "RivalPrice".to_string(),
            smtp: SmtpConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// Email is log-only while this is unset.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub use_tls: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from_address: "alerts@rivalprice.local".to_string(),
            use_tls: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Adds a daily rolling file next to stderr output when set.
    pub directory: Option<String>,
}

impl AppConfig {
    /// Layers, lowest precedence first: built-in defaults, `config/default`,
    /// `config/{RUN_MODE}`, `config/local`, conventional variables such as
    /// `DATABASE_URL`, then `RIVALPRICE__SECTION__KEY` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        for (variable, key) in ENV_FALLBACKS {
            if env::var(structured_env_name(key)).is_ok() {
                continue;
            }
            if let Ok(value) = env::var(variable) {
                builder = builder.set_override(key, value)?;
            }
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.database.url).is_err() {
            return Err(ConfigError::Message("Invalid database URL format".into()));
        }

        if Url::parse(&self.queue.url).is_err() {
            return Err(ConfigError::Message("Invalid queue URL format".into()));
        }

        if self.queue.key.trim().is_empty() {
            return Err(ConfigError::Message("Queue key must not be empty".into()));
        }

        if self.queue.push_timeout_secs == 0 || self.queue.pop_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Queue timeouts must be greater than 0".into(),
            ));
        }

        if self.scheduler.tick_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Scheduler tick_interval_secs must be greater than 0".into(),
            ));
        }

        if self.scraper.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Scraper request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.scraper.concurrency == 0 {
            return Err(ConfigError::Message(
                "Scraper concurrency must be greater than 0".into(),
            ));
        }

        if self.alerts.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "Alerts poll_interval_secs must be greater than 0".into(),
            ));
        }

        if self.alerts.batch_size == 0 {
            return Err(ConfigError::Message(
                "Alerts batch_size must be greater than 0".into(),
            ));
        }

        if Url::parse(&self.summarizer.base_url).is_err() {
            return Err(ConfigError::Message("Invalid summarizer base URL format".into()));
        }

        if self.summarizer.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Summarizer timeout_secs must be greater than 0".into(),
            ));
        }

        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        if self.notifications.webhook.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Webhook timeout_secs must be greater than 0".into(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}

fn structured_env_name(key: &str) -> String {
    format!("{}__{}", ENV_PREFIX, key.replace('.', "__").to_uppercase())
}

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod alert_log;
pub mod detected_change;
pub mod monitored_page;
pub mod notification_settings;
pub mod snapshot;

// Re-exports for convenience
pub use alert_log::*;
pub use detected_change::*;
pub use monitored_page::*;
pub use notification_settings::*;
pub use snapshot::*;

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum PageType {
    #[sqlx(rename = "pricing")]
    Pricing,
    #[sqlx(rename = "features")]
    Features,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Pricing => "pricing",
            PageType::Features => "features",
        }
    }
}

/// Re-check cadence of a monitored page.
///
/// Stored as free text by the CRUD layer, so unknown values are tolerated and
/// scheduled like `Daily`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Fixed-width interval until the next run. Months are always 30 days.
    pub fn interval(frequency: Option<Frequency>) -> chrono::Duration {
        match frequency {
            Some(Frequency::Daily) | None => chrono::Duration::hours(24),
            Some(Frequency::Weekly) => chrono::Duration::days(7),
            Some(Frequency::Monthly) => chrono::Duration::days(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum Availability {
    #[sqlx(rename = "in_stock")]
    InStock,
    #[sqlx(rename = "out_of_stock")]
    OutOfStock,
    #[sqlx(rename = "pre_order")]
    PreOrder,
    #[sqlx(rename = "available")]
    Available,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::InStock => "in_stock",
            Availability::OutOfStock => "out_of_stock",
            Availability::PreOrder => "pre_order",
            Availability::Available => "available",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal importance of an alert: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum Severity {
    #[sqlx(rename = "low")]
    Low,
    #[sqlx(rename = "medium")]
    Medium,
    #[sqlx(rename = "high")]
    High,
    #[sqlx(rename = "critical")]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

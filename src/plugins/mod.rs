pub mod manager;
pub mod notifiers;
pub mod summarizers;
pub mod traits;

pub use manager::{DeliveryTarget, DispatchReport, NotificationDispatcher};
pub use traits::{NotifierPlugin, Summarizer};

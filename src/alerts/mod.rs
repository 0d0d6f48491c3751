pub mod engine;
pub mod poller;
pub mod rules;

pub use engine::{build_alert_message, AlertEngine, ProcessOutcome};
pub use poller::{AlertPoller, PollReport};
pub use rules::{severity_from_change, should_alert, AlertDecision};

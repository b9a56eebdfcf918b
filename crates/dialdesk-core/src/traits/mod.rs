//! Traits at the seams between the engine and the outside world.

pub mod notify;
pub mod prompt;
pub mod store;

pub use notify::{Alert, NotificationSink};
pub use prompt::{FixedAnswer, OperatorPrompt};
pub use store::{LeadStore, ScheduledCallStore};

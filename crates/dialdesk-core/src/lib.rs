//! # DialDesk Core
//!
//! Shared building blocks for the DialDesk worklist engine:
//! the lead / scheduled-call data model, the error type, configuration,
//! and the traits through which the engine talks to its collaborators.
//!
//! ## Collaborators
//! ```text
//! WorklistEngine
//!   ├── LeadStore           list / update status / complete call
//!   ├── ScheduledCallStore  list by lead / create / update / delete
//!   ├── NotificationSink    request permission / show reminder
//!   ├── OperatorPrompt      yes/no confirmation
//!   └── Clock               wall-clock source
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DialDeskConfig;
pub use error::{DialDeskError, Result};
pub use types::{
    AUTO_SCHEDULE_TAG, AUTO_SCHEDULE_UPDATED_TAG, CallOrigin, CallStatus, Lead, LeadFilter,
    LeadStatus, ScheduledCall,
};

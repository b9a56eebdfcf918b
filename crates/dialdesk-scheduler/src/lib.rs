//! # DialDesk Scheduler
//!
//! Call-scheduling and dynamic priority engine: decides which lead to call
//! next, books follow-ups when an attempt fails, counts down to due calls
//! and raises one reminder per follow-up.
//!
//! ## Architecture
//! ```text
//! Scheduler loop (one tokio interval, 1s)
//!   ├── every tick        → countdown pass → reminders → NotifyRouter
//!   ├── every 10s         → re-poll calls (join_all) → re-sort, overdue check
//!   └── every 120s        → silent lead refresh (fixed-delay retries)
//!
//! WorklistEngine
//!   ├── CallRepository    local cache + pending-write queue → ScheduledCallStore
//!   ├── escalation        "not connected" → auto follow-up at now + 2h
//!   ├── priority          (lead, calls, now) → urgent / soon / scheduled / normal
//!   └── worklist          overdue, then no call, then by time; auto demotion
//!
//! Stores: SqliteStore (rusqlite) · MemoryStore
//! Notify: NotifyRouter → dispatch → log / webhook / Discord
//! ```

pub mod cache;
pub mod countdown;
pub mod dispatch;
pub mod engine;
pub mod escalation;
pub mod memory;
pub mod notify;
pub mod persistence;
pub mod priority;
pub mod repository;
pub mod retry;
pub mod worklist;

pub use countdown::{CountdownTracker, Reminder, format_countdown};
pub use engine::{SchedulerHandle, WorklistEngine, WorklistEntry, spawn_scheduler};
pub use escalation::NotConnectedOutcome;
pub use memory::MemoryStore;
pub use notify::{Notification, NotifyPriority, NotifyRouter};
pub use persistence::SqliteStore;
pub use priority::{PriorityClassification, PriorityStatus, evaluate};
pub use repository::CallRepository;
pub use retry::{RetryPolicy, RetryStats};
pub use worklist::sort_worklist;

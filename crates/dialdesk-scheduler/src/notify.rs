//! Notification router: the engine's `NotificationSink`.
//! Records every reminder in a small ring buffer and hands it to each
//! configured delivery target. Lightweight: no queues, just send.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialdesk_core::config::NotifyConfig;
use dialdesk_core::traits::{Alert, NotificationSink};
use dialdesk_core::{Clock, DialDeskError, Result};
use serde::{Deserialize, Serialize};

use crate::dispatch::{self, NotifyTarget};

const HISTORY_LIMIT: usize = 100;

/// Reminders at or under this many minutes go out as high priority.
pub const URGENT_REMINDER_MINS: i64 = 5;

/// A notification to send to the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Title/summary.
    pub title: String,
    /// Body content.
    pub body: String,
    pub priority: NotifyPriority,
    /// Which component raised it.
    pub source: String,
    /// Labelled values, e.g. lead name and phone.
    #[serde(default)]
    pub fields: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: &str, body: &str, source: &str, at: DateTime<Utc>) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            priority: NotifyPriority::Normal,
            source: source.to_string(),
            fields: Vec::new(),
            timestamp: at,
        }
    }

    fn from_alert(alert: &Alert, at: DateTime<Utc>) -> Self {
        Self {
            priority: NotifyPriority::for_minutes_left(alert.minutes_left),
            fields: alert.fields.clone(),
            ..Self::new(&alert.title, &alert.body, "countdown", at)
        }
    }
}

/// Notification priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum NotifyPriority {
    Normal,
    High,
}

impl NotifyPriority {
    pub fn for_minutes_left(minutes_left: Option<i64>) -> Self {
        match minutes_left {
            Some(m) if m <= URGENT_REMINDER_MINS => NotifyPriority::High,
            _ => NotifyPriority::Normal,
        }
    }
}

/// Routes reminders to every registered target.
pub struct NotifyRouter {
    targets: Vec<(String, NotifyTarget)>,
    history: Mutex<VecDeque<Notification>>,
    clock: Arc<dyn Clock>,
}

impl NotifyRouter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            targets: Vec::new(),
            history: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn from_config(config: &NotifyConfig, clock: Arc<dyn Clock>) -> Self {
        let mut router = Self::new(clock);
        for (name, target) in dispatch::targets_from_config(config) {
            router.register(&name, target);
        }
        router
    }

    /// Register a delivery target.
    pub fn register(&mut self, name: &str, target: NotifyTarget) {
        tracing::debug!("🔔 Notification target registered: {name}");
        self.targets.push((name.to_string(), target));
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Record a notification in history.
    pub fn record(&self, notification: Notification) {
        if let Ok(mut history) = self.history.lock() {
            history.push_back(notification);
            while history.len() > HISTORY_LIMIT {
                history.pop_front();
            }
        }
    }

    /// Notification history, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn send(&self, notification: Notification) -> Result<()> {
        self.record(notification.clone());

        if self.targets.is_empty() {
            return Err(DialDeskError::Notify("no notification target configured".into()));
        }

        let results = dispatch::dispatch_all(&notification, &self.targets).await;
        let delivered = results.iter().filter(|(_, r)| r.is_ok()).count();
        for (target, result) in &results {
            if let Err(e) = result {
                tracing::warn!("⚠️ Notification to {target} failed: {e}");
            }
        }
        if delivered == 0 {
            return Err(DialDeskError::Notify("all notification targets failed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for NotifyRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn request_permission(&self) -> Result<bool> {
        Ok(!self.targets.is_empty())
    }

    async fn show(&self, title: &str, body: &str) -> Result<()> {
        self.send(Notification::new(title, body, "countdown", self.clock.now()))
            .await
    }

    async fn show_alert(&self, alert: &Alert) -> Result<()> {
        self.send(Notification::from_alert(alert, self.clock.now()))
            .await
    }
}

//! Notification sink trait.

use async_trait::async_trait;

use crate::error::Result;

/// A structured alert. Sinks that only render text get `title` and `body`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    /// Minutes until the call is due, when the alert is about one.
    pub minutes_left: Option<i64>,
    /// Labelled values for sinks that can lay them out.
    pub fields: Vec<(String, String)>,
}

/// Alert delivery. Both calls are best-effort: callers log and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Returns whether alerts may be shown.
    async fn request_permission(&self) -> Result<bool>;

    async fn show(&self, title: &str, body: &str) -> Result<()>;

    async fn show_alert(&self, alert: &Alert) -> Result<()> {
        self.show(&alert.title, &alert.body).await
    }
}

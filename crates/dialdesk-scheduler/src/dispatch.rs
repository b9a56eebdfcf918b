//! Notification dispatch: actually sends reminders to configured targets.
//! Supports: tracing log, Discord webhook, generic HTTP webhook.

use dialdesk_core::config::NotifyConfig;

use super::notify::{Notification, NotifyPriority};

/// Notification target configuration.
#[derive(Debug, Clone)]
pub enum NotifyTarget {
    /// Write the reminder to the log.
    Log,
    /// Discord Webhook URL.
    Discord { webhook_url: String },
    /// Generic HTTP webhook: POST with JSON body.
    Webhook {
        url: String,
        headers: Vec<(String, String)>,
    },
}

/// Dispatch a notification to a target.
/// Returns Ok(()) on success, Err(reason) on failure.
pub async fn dispatch(notification: &Notification, target: &NotifyTarget) -> Result<(), String> {
    match target {
        NotifyTarget::Log => {
            tracing::info!(priority = ?notification.priority, "🔔 {}: {}", notification.title, notification.body);
            Ok(())
        }
        NotifyTarget::Discord { webhook_url } => send_discord(webhook_url, notification).await,
        NotifyTarget::Webhook { url, headers } => send_webhook(url, headers, notification).await,
    }
}

/// Discord embed for a reminder: red when the call is minutes away.
fn discord_payload(notification: &Notification) -> serde_json::Value {
    let color = match notification.priority {
        NotifyPriority::High => 0xE53935,
        NotifyPriority::Normal => 0x00AAFF,
    };
    let fields: Vec<serde_json::Value> = notification
        .fields
        .iter()
        .map(|(name, value)| serde_json::json!({"name": name, "value": value, "inline": true}))
        .collect();

    serde_json::json!({
        "embeds": [{
            "title": format!("📞 {}", notification.title),
            "description": notification.body,
            "color": color,
            "fields": fields,
            "footer": {
                "text": format!("DialDesk • {}", notification.timestamp.format("%H:%M:%S UTC"))
            }
        }]
    })
}

/// Body for the generic webhook; `fields` become a flat object.
fn webhook_payload(notification: &Notification) -> serde_json::Value {
    let fields: serde_json::Map<String, serde_json::Value> = notification
        .fields
        .iter()
        .map(|(name, value)| (name.to_lowercase(), serde_json::Value::from(value.as_str())))
        .collect();

    serde_json::json!({
        "title": notification.title,
        "body": notification.body,
        "priority": format!("{:?}", notification.priority).to_lowercase(),
        "source": notification.source,
        "fields": fields,
        "timestamp": notification.timestamp.to_rfc3339(),
    })
}

/// Send notification via Discord Webhook.
async fn send_discord(webhook_url: &str, notification: &Notification) -> Result<(), String> {
    let client = reqwest::Client::new();
    let resp = client
        .post(webhook_url)
        .json(&discord_payload(notification))
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| format!("Discord send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("✅ Discord reminder sent: {}", notification.title);
        Ok(())
    } else {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(format!("Discord webhook error {status}: {body}"))
    }
}

/// Send notification via generic HTTP webhook.
async fn send_webhook(
    url: &str,
    headers: &[(String, String)],
    notification: &Notification,
) -> Result<(), String> {
    let client = reqwest::Client::new();
    let mut req = client
        .post(url)
        .json(&webhook_payload(notification))
        .timeout(std::time::Duration::from_secs(10));

    for (key, value) in headers {
        req = req.header(key.as_str(), value.as_str());
    }

    let resp = req
        .send()
        .await
        .map_err(|e| format!("Webhook send failed: {e}"))?;

    if resp.status().is_success() {
        tracing::debug!("✅ Webhook reminder sent to {}: {}", url, notification.title);
        Ok(())
    } else {
        Err(format!("Webhook error {}", resp.status()))
    }
}

/// Dispatch to every target. Returns (target name, result) pairs.
pub async fn dispatch_all(
    notification: &Notification,
    targets: &[(String, NotifyTarget)],
) -> Vec<(String, Result<(), String>)> {
    let mut results = Vec::with_capacity(targets.len());
    for (name, target) in targets {
        let result = dispatch(notification, target).await;
        results.push((name.clone(), result));
    }
    results
}

/// Build targets from the `[notify]` config section.
pub fn targets_from_config(config: &NotifyConfig) -> Vec<(String, NotifyTarget)> {
    let mut targets = Vec::new();

    if config.log {
        targets.push(("log".to_string(), NotifyTarget::Log));
    }

    if let Some(url) = config.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        targets.push((
            "webhook".to_string(),
            NotifyTarget::Webhook {
                url: url.to_string(),
                headers: vec![],
            },
        ));
    }

    if let Some(url) = config.discord_webhook_url.as_deref().filter(|u| !u.is_empty()) {
        targets.push((
            "discord".to_string(),
            NotifyTarget::Discord {
                webhook_url: url.to_string(),
            },
        ));
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn reminder(priority: NotifyPriority) -> Notification {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        Notification {
            priority,
            fields: vec![
                ("Lead".into(), "Ada".into()),
                ("Phone".into(), "+1 555 0100".into()),
            ],
            ..Notification::new("Call Ada soon", "due in 4 min", "countdown", at)
        }
    }

    #[test]
    fn test_discord_payload_carries_reminder_fields() {
        let payload = discord_payload(&reminder(NotifyPriority::High));
        let embed = &payload["embeds"][0];
        assert_eq!(embed["color"], 0xE53935);
        assert_eq!(embed["fields"][1]["name"], "Phone");
        assert_eq!(embed["fields"][1]["value"], "+1 555 0100");
        assert_eq!(embed["footer"]["text"], "DialDesk • 09:00:00 UTC");

        let calm = discord_payload(&reminder(NotifyPriority::Normal));
        assert_eq!(calm["embeds"][0]["color"], 0x00AAFF);
    }

    #[test]
    fn test_webhook_payload_flattens_fields() {
        let payload = webhook_payload(&reminder(NotifyPriority::High));
        assert_eq!(payload["priority"], "high");
        assert_eq!(payload["fields"]["lead"], "Ada");
        assert_eq!(payload["timestamp"], "2026-03-02T09:00:00+00:00");
    }

    #[test]
    fn test_targets_from_config() {
        let config = NotifyConfig {
            log: false,
            webhook_url: Some("http://127.0.0.1:9/hook".into()),
            discord_webhook_url: Some(String::new()),
        };
        let targets = targets_from_config(&config);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0, "webhook");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_reports_error() {
        let n = reminder(NotifyPriority::Normal);
        let targets = vec![
            ("log".to_string(), NotifyTarget::Log),
            (
                "webhook".to_string(),
                NotifyTarget::Webhook {
                    url: "http://127.0.0.1:9/hook".into(),
                    headers: vec![],
                },
            ),
        ];
        let results = dispatch_all(&n, &targets).await;
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
    }
}

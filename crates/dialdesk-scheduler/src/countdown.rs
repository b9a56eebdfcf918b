//! Countdown and reminder emitter.
//!
//! Each tick recomputes the countdown string for every lead that has a
//! pending auto follow-up, and raises one reminder per follow-up when it
//! comes within the reminder window. The latch remembers which call (and
//! which time) was announced, so moving the call re-arms it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dialdesk_core::traits::{Alert, NotificationSink};
use dialdesk_core::{Lead, ScheduledCall};
use serde::Serialize;

use crate::priority::next_pending_call;

/// Default reminder window in minutes.
pub const REMINDER_WINDOW_MINS: i64 = 15;

/// "{h}h {m}m" while time remains, "Overdue" after.
pub fn format_countdown(scheduled: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining_ms = (scheduled - now).num_milliseconds();
    if remaining_ms <= 0 {
        return "Overdue".to_string();
    }
    let hours = remaining_ms / 3_600_000;
    let minutes = (remaining_ms % 3_600_000) / 60_000;
    format!("{hours}h {minutes}m")
}

/// A reminder ready to be shown.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reminder {
    pub lead_id: String,
    pub lead_name: String,
    pub phone: String,
    pub call_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub minutes_left: i64,
}

impl Reminder {
    pub fn title(&self) -> String {
        format!("Call {} soon", self.lead_name)
    }

    pub fn body(&self) -> String {
        format!(
            "Follow-up call to {} ({}) is due in {} min at {}",
            self.lead_name,
            self.phone,
            self.minutes_left,
            self.scheduled_time.format("%H:%M UTC")
        )
    }

    pub fn alert(&self) -> Alert {
        Alert {
            title: self.title(),
            body: self.body(),
            minutes_left: Some(self.minutes_left),
            fields: vec![
                ("Lead".into(), self.lead_name.clone()),
                ("Phone".into(), self.phone.clone()),
                ("Due".into(), self.scheduled_time.format("%H:%M UTC").to_string()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Latch {
    call_id: String,
    scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct CountdownTracker {
    countdowns: HashMap<String, String>,
    notified: HashMap<String, Latch>,
}

impl CountdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn countdown_for(&self, lead_id: &str) -> Option<&str> {
        self.countdowns.get(lead_id).map(String::as_str)
    }

    pub fn is_notified(&self, lead_id: &str) -> bool {
        self.notified.contains_key(lead_id)
    }

    /// Recompute countdowns; returns reminders that became due this tick.
    pub fn tick(
        &mut self,
        leads: &[Lead],
        calls_by_lead: &HashMap<String, Vec<ScheduledCall>>,
        now: DateTime<Utc>,
        reminder_window_mins: i64,
    ) -> Vec<Reminder> {
        let mut due = Vec::new();
        let mut countdowns = HashMap::with_capacity(self.countdowns.len());

        for lead in leads {
            let auto = calls_by_lead
                .get(&lead.id)
                .and_then(|calls| next_pending_call(calls.iter().filter(|c| c.is_auto())));
            let Some(call) = auto else {
                self.notified.remove(&lead.id);
                continue;
            };

            countdowns.insert(lead.id.clone(), format_countdown(call.scheduled_time, now));

            let latch = Latch {
                call_id: call.id.clone(),
                scheduled_time: call.scheduled_time,
            };
            if self.notified.get(&lead.id) == Some(&latch) {
                continue;
            }
            // a different call or a new time for this lead re-arms the latch
            self.notified.remove(&lead.id);

            let remaining_ms = (call.scheduled_time - now).num_milliseconds();
            if remaining_ms > 0 && remaining_ms <= reminder_window_mins * 60_000 {
                due.push(Reminder {
                    lead_id: lead.id.clone(),
                    lead_name: lead.name.clone(),
                    phone: lead.phone.clone(),
                    call_id: call.id.clone(),
                    scheduled_time: call.scheduled_time,
                    minutes_left: remaining_ms.div_euclid(60_000),
                });
                self.notified.insert(lead.id.clone(), latch);
            }
        }

        self.notified.retain(|id, _| countdowns.contains_key(id));
        self.countdowns = countdowns;
        due
    }
}

/// Show each reminder; sink failures are logged and dropped.
pub async fn deliver(sink: &dyn NotificationSink, reminders: &[Reminder]) -> usize {
    let mut shown = 0;
    for reminder in reminders {
        match sink.show_alert(&reminder.alert()).await {
            Ok(()) => shown += 1,
            Err(e) => {
                tracing::warn!(lead = %reminder.lead_id, sink = sink.name(), "⚠️ Reminder not shown: {e}");
            }
        }
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use dialdesk_core::{AUTO_SCHEDULE_TAG, CallOrigin, DialDeskError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap()
    }

    fn lead() -> Lead {
        let mut lead = Lead::new("Alan Turing", "+44 161 496 0000", t0());
        lead.id = "lead-t".into();
        lead
    }

    fn auto_call(at: DateTime<Utc>) -> ScheduledCall {
        let mut c = ScheduledCall::new("lead-t", at, AUTO_SCHEDULE_TAG, CallOrigin::Auto, t0());
        c.id = "call-t".into();
        c
    }

    fn map(calls: Vec<ScheduledCall>) -> HashMap<String, Vec<ScheduledCall>> {
        HashMap::from([("lead-t".to_string(), calls)])
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(t0() + Duration::seconds(90), t0()), "0h 1m");
        assert_eq!(format_countdown(t0() + Duration::minutes(125), t0()), "2h 5m");
        assert_eq!(format_countdown(t0(), t0()), "Overdue");
        assert_eq!(format_countdown(t0() - Duration::seconds(1), t0()), "Overdue");
    }

    #[test]
    fn test_countdown_turns_overdue_within_one_tick() {
        let mut tracker = CountdownTracker::new();
        let leads = vec![lead()];
        let calls = map(vec![auto_call(t0() + Duration::seconds(90))]);

        tracker.tick(&leads, &calls, t0(), REMINDER_WINDOW_MINS);
        assert_eq!(tracker.countdown_for("lead-t"), Some("0h 1m"));

        let mut now = t0();
        let mut ticks = 0;
        while tracker.countdown_for("lead-t") != Some("Overdue") {
            now += Duration::seconds(1);
            ticks += 1;
            tracker.tick(&leads, &calls, now, REMINDER_WINDOW_MINS);
        }
        assert_eq!(ticks, 90);
    }

    #[test]
    fn test_reminder_fires_once() {
        let mut tracker = CountdownTracker::new();
        let leads = vec![lead()];
        let calls = map(vec![auto_call(t0() + Duration::minutes(20))]);

        assert!(tracker.tick(&leads, &calls, t0(), 15).is_empty());
        let fired = tracker.tick(&leads, &calls, t0() + Duration::minutes(5), 15);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].minutes_left, 15);
        assert!(tracker.is_notified("lead-t"));

        for s in 1..120 {
            let later = t0() + Duration::minutes(5) + Duration::seconds(s);
            assert!(tracker.tick(&leads, &calls, later, 15).is_empty());
        }
    }

    #[test]
    fn test_moving_the_call_rearms_the_latch() {
        let mut tracker = CountdownTracker::new();
        let leads = vec![lead()];
        let calls = map(vec![auto_call(t0() + Duration::minutes(10))]);
        assert_eq!(tracker.tick(&leads, &calls, t0(), 15).len(), 1);

        let moved = map(vec![auto_call(t0() + Duration::minutes(12))]);
        assert_eq!(tracker.tick(&leads, &moved, t0(), 15).len(), 1);
    }

    #[test]
    fn test_manual_calls_have_no_countdown() {
        let mut tracker = CountdownTracker::new();
        let mut manual = auto_call(t0() + Duration::minutes(5));
        manual.origin = CallOrigin::Manual;
        let fired = tracker.tick(&[lead()], &map(vec![manual]), t0(), 15);
        assert!(fired.is_empty());
        assert_eq!(tracker.countdown_for("lead-t"), None);
    }

    #[test]
    fn test_overdue_call_does_not_remind() {
        let mut tracker = CountdownTracker::new();
        let calls = map(vec![auto_call(t0() - Duration::minutes(1))]);
        assert!(tracker.tick(&[lead()], &calls, t0(), 15).is_empty());
        assert_eq!(tracker.countdown_for("lead-t"), Some("Overdue"));
    }

    struct DeniedSink {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl NotificationSink for DeniedSink {
        fn name(&self) -> &str {
            "denied"
        }
        async fn request_permission(&self) -> Result<bool> {
            Ok(false)
        }
        async fn show(&self, _title: &str, _body: &str) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(DialDeskError::Notify("permission denied".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let sink = DeniedSink {
            attempts: AtomicUsize::new(0),
        };
        let mut tracker = CountdownTracker::new();
        let calls = map(vec![auto_call(t0() + Duration::minutes(3))]);
        let due = tracker.tick(&[lead()], &calls, t0(), 15);
        let shown = deliver(&sink, &due).await;
        assert_eq!(shown, 0);
        assert_eq!(sink.attempts.load(Ordering::Relaxed), 1);
        assert_eq!(tracker.countdown_for("lead-t"), Some("0h 3m"));
        // still latched: a failed delivery is not retried
        assert!(tracker.tick(&[lead()], &calls, t0(), 15).is_empty());
    }
}

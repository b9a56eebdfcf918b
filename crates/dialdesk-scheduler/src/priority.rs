//! Priority evaluator: classifies a lead from its next pending call.
//! Pure: the same (lead, calls, now) always yields the same classification.

use chrono::{DateTime, Utc};
use dialdesk_core::{Lead, ScheduledCall};
use serde::{Deserialize, Serialize};

/// Default "soon" window in minutes.
pub const SOON_WINDOW_MINS: i64 = 30;

/// Priority bucket, most pressing first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PriorityStatus {
    Urgent,
    Soon,
    Scheduled,
    Normal,
}

impl std::fmt::Display for PriorityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityStatus::Urgent => write!(f, "urgent"),
            PriorityStatus::Soon => write!(f, "soon"),
            PriorityStatus::Scheduled => write!(f, "scheduled"),
            PriorityStatus::Normal => write!(f, "normal"),
        }
    }
}

/// Computed each evaluation pass, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriorityClassification {
    pub status: PriorityStatus,
    pub text: String,
    /// Signed minutes to due; negative when overdue, absent for `normal`.
    pub minutes: Option<i64>,
}

impl PriorityClassification {
    fn normal(text: &str) -> Self {
        Self {
            status: PriorityStatus::Normal,
            text: text.to_string(),
            minutes: None,
        }
    }
}

/// Whole minutes from `now` to `at`, floored (so 4.5 minutes ago is -5).
pub fn minutes_until(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (at - now).num_milliseconds().div_euclid(60_000)
}

/// Earliest pending call; equal times fall back to creation time, then id.
pub fn next_pending_call<'a, I>(calls: I) -> Option<&'a ScheduledCall>
where
    I: IntoIterator<Item = &'a ScheduledCall>,
{
    calls.into_iter().filter(|c| c.is_pending()).min_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// Classify `lead` with the default 30 minute window.
pub fn evaluate(lead: &Lead, calls: &[ScheduledCall], now: DateTime<Utc>) -> PriorityClassification {
    evaluate_with_window(lead, calls, now, SOON_WINDOW_MINS)
}

/// Classify `lead`. Calls belonging to other leads are ignored.
pub fn evaluate_with_window(
    lead: &Lead,
    calls: &[ScheduledCall],
    now: DateTime<Utc>,
    soon_window_mins: i64,
) -> PriorityClassification {
    let own: Vec<&ScheduledCall> = calls.iter().filter(|c| c.lead_id == lead.id).collect();
    if own.is_empty() {
        return PriorityClassification::normal("No scheduled calls");
    }
    let Some(next) = next_pending_call(own.iter().copied()) else {
        return PriorityClassification::normal("No pending calls");
    };

    let diff = minutes_until(next.scheduled_time, now);

    if next.scheduled_time <= now {
        return PriorityClassification {
            status: PriorityStatus::Urgent,
            text: format!("Overdue: {} min ago", diff.abs()),
            minutes: Some(-diff.abs()),
        };
    }

    if diff <= soon_window_mins {
        return PriorityClassification {
            status: PriorityStatus::Soon,
            text: format!("Due in {diff} min"),
            minutes: Some(diff),
        };
    }

    let clock_time = next.scheduled_time.format("%H:%M UTC");
    let text = if next.is_auto() {
        format!("Scheduled: {clock_time} (Low Priority)")
    } else {
        format!("Scheduled: {clock_time}")
    };
    PriorityClassification {
        status: PriorityStatus::Scheduled,
        text,
        minutes: Some(diff),
    }
}

//! Auto-escalation and manual scheduling.
//!
//! A failed call attempt books a follow-up two hours out, tagged as
//! auto-generated. An operator scheduling a call for a lead that already
//! has a pending auto follow-up moves that follow-up instead of adding a
//! second one, so a lead never holds more than one pending auto call.

use chrono::{DateTime, Duration, Utc};
use dialdesk_core::{
    AUTO_SCHEDULE_TAG, AUTO_SCHEDULE_UPDATED_TAG, CallOrigin, DialDeskError, Result,
    ScheduledCall,
};
use serde::Serialize;

use crate::repository::CallRepository;

/// Default follow-up delay after a failed attempt.
pub const ESCALATION_DELAY_MINS: i64 = 120;

/// What happened after the operator reported "not connected".
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotConnectedOutcome {
    /// Operator declined the follow-up; only the lead status changed.
    Declined,
    /// A new auto follow-up was booked.
    Scheduled { call: ScheduledCall },
    /// The existing auto follow-up was moved.
    Rescheduled { call: ScheduledCall },
    /// The status change stuck but the follow-up could not be booked.
    ScheduleFailed { message: String },
}

impl NotConnectedOutcome {
    pub fn call(&self) -> Option<&ScheduledCall> {
        match self {
            NotConnectedOutcome::Scheduled { call } | NotConnectedOutcome::Rescheduled { call } => {
                Some(call)
            }
            _ => None,
        }
    }
}

pub fn follow_up_time(now: DateTime<Utc>, delay_mins: i64) -> DateTime<Utc> {
    now + Duration::minutes(delay_mins)
}

/// Book (or move) the auto follow-up for a lead whose call did not connect.
pub async fn escalate_not_connected(
    repo: &CallRepository,
    lead_id: &str,
    now: DateTime<Utc>,
    delay_mins: i64,
) -> NotConnectedOutcome {
    let at = follow_up_time(now, delay_mins);

    let result = match repo.pending_auto_call(lead_id).await {
        Some(existing) => repo
            .update(&existing.id, at, AUTO_SCHEDULE_TAG, now)
            .await
            .map(|call| NotConnectedOutcome::Rescheduled { call }),
        None => repo
            .create(lead_id, at, AUTO_SCHEDULE_TAG, CallOrigin::Auto, now)
            .await
            .map(|call| NotConnectedOutcome::Scheduled { call }),
    };

    match result {
        Ok(outcome) => {
            tracing::info!(lead = %lead_id, at = %at, "📅 Auto follow-up booked");
            outcome
        }
        Err(e) => {
            tracing::warn!(lead = %lead_id, "⚠️ Auto follow-up failed: {e}");
            NotConnectedOutcome::ScheduleFailed {
                message: format!(
                    "Marked as not connected, but the follow-up call could not be \
                     scheduled automatically ({e}). Please schedule it manually."
                ),
            }
        }
    }
}

/// Schedule a call for `lead_id`, or move its pending auto follow-up.
pub async fn schedule_or_update(
    repo: &CallRepository,
    lead_id: &str,
    time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<ScheduledCall> {
    let Some(time) = time else {
        return Err(DialDeskError::Validation(
            "a call time is required to schedule".into(),
        ));
    };

    let call = match repo.pending_auto_call(lead_id).await {
        Some(existing) => {
            repo.update(&existing.id, time, AUTO_SCHEDULE_UPDATED_TAG, now)
                .await?
        }
        None => repo.create(lead_id, time, "", CallOrigin::Manual, now).await?,
    };
    tracing::info!(lead = %lead_id, call = %call.id, at = %time, "📅 Call scheduled");
    Ok(call)
}

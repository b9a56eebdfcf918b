//! Worklist sorter: orders leads by who should be called next.
//!
//! Precedence, each level only consulted on a tie of the previous one:
//! 1. overdue before not overdue (more overdue first)
//! 2. no pending call before a future pending call
//! 3. future calls: an auto follow-up outranks others only inside the
//!    soon window and sinks below manual calls outside it; otherwise
//!    earlier time first
//!
//! The comparator is pairwise and fed to a stable sort, so equal leads keep
//! their input order and re-sorting with the same `now` is a no-op.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dialdesk_core::{Lead, ScheduledCall};

use crate::priority::{SOON_WINDOW_MINS, minutes_until, next_pending_call};

/// Compare two leads by their next pending calls.
pub fn compare_next_calls(
    a: Option<&ScheduledCall>,
    b: Option<&ScheduledCall>,
    now: DateTime<Utc>,
    soon_window_mins: i64,
) -> Ordering {
    let a_overdue = a.is_some_and(|c| c.scheduled_time <= now);
    let b_overdue = b.is_some_and(|c| c.scheduled_time <= now);

    match (a_overdue, b_overdue) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (true, true) => {
            if let (Some(a), Some(b)) = (a, b) {
                return a.scheduled_time.cmp(&b.scheduled_time);
            }
        }
        (false, false) => {}
    }

    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };

    let a_soon = minutes_until(a.scheduled_time, now) <= soon_window_mins;
    let b_soon = minutes_until(b.scheduled_time, now) <= soon_window_mins;
    let by_time = a.scheduled_time.cmp(&b.scheduled_time);

    match (a.is_auto(), b.is_auto()) {
        (true, true) => match (a_soon, b_soon) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => by_time,
        },
        (true, false) => {
            if a_soon {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if b_soon {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => by_time,
    }
}

/// Sort `leads` using each lead's calls from `calls_by_lead`.
pub fn sort_worklist(
    leads: &[Lead],
    calls_by_lead: &HashMap<String, Vec<ScheduledCall>>,
    now: DateTime<Utc>,
) -> Vec<Lead> {
    sort_worklist_with_window(leads, calls_by_lead, now, SOON_WINDOW_MINS)
}

pub fn sort_worklist_with_window(
    leads: &[Lead],
    calls_by_lead: &HashMap<String, Vec<ScheduledCall>>,
    now: DateTime<Utc>,
    soon_window_mins: i64,
) -> Vec<Lead> {
    let mut keyed: Vec<(&Lead, Option<&ScheduledCall>)> = leads
        .iter()
        .map(|lead| {
            let next = calls_by_lead
                .get(&lead.id)
                .and_then(|calls| next_pending_call(calls));
            (lead, next)
        })
        .collect();

    keyed.sort_by(|(_, a), (_, b)| compare_next_calls(*a, *b, now, soon_window_mins));

    keyed.into_iter().map(|(lead, _)| lead.clone()).collect()
}

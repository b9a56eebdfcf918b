//! Local scheduled-call cache with a pending-write queue.
//!
//! Writes are applied to the cache first and queued for the store. When a
//! fresh listing arrives from the store it is reconciled against the cache:
//! records with an unacknowledged write keep their local version, records
//! present on both sides keep whichever has the later `updated_at`, and a
//! listing that was requested before a local write landed is discarded.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use dialdesk_core::{CallOrigin, DialDeskError, ScheduledCall};

use crate::priority::next_pending_call;

/// A local mutation waiting to be written to the store.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    Create {
        seq: u64,
        provisional: ScheduledCall,
    },
    Update {
        seq: u64,
        previous: ScheduledCall,
        current: ScheduledCall,
    },
    Delete {
        seq: u64,
        previous: ScheduledCall,
    },
}

impl PendingWrite {
    pub fn seq(&self) -> u64 {
        match self {
            PendingWrite::Create { seq, .. }
            | PendingWrite::Update { seq, .. }
            | PendingWrite::Delete { seq, .. } => *seq,
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            PendingWrite::Create { provisional, .. } => &provisional.id,
            PendingWrite::Update { current, .. } => &current.id,
            PendingWrite::Delete { previous, .. } => &previous.id,
        }
    }

    pub fn lead_id(&self) -> &str {
        match self {
            PendingWrite::Create { provisional, .. } => &provisional.lead_id,
            PendingWrite::Update { current, .. } => &current.lead_id,
            PendingWrite::Delete { previous, .. } => &previous.lead_id,
        }
    }
}

/// Outcome of a flushed write, collected by whoever staged it.
pub type WriteResult = std::result::Result<Option<ScheduledCall>, DialDeskError>;

/// Issued when a listing request starts; handed back when it completes.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub lead_id: String,
    revision: u64,
}

#[derive(Debug, Default)]
pub struct CallCache {
    by_lead: HashMap<String, Vec<ScheduledCall>>,
    queue: VecDeque<PendingWrite>,
    /// Call ids with a write that the store has not acknowledged yet.
    in_flight: HashSet<String>,
    completed: HashMap<u64, WriteResult>,
    /// Outstanding listing requests per lead.
    fetching: HashMap<String, usize>,
    /// Revision of the last local write per lead.
    lead_revision: HashMap<String, u64>,
    revision: u64,
    next_seq: u64,
}

impl CallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls_for(&self, lead_id: &str) -> &[ScheduledCall] {
        self.by_lead.get(lead_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all(&self) -> &HashMap<String, Vec<ScheduledCall>> {
        &self.by_lead
    }

    pub fn find(&self, call_id: &str) -> Option<&ScheduledCall> {
        self.by_lead.values().flatten().find(|c| c.id == call_id)
    }

    /// The lead's pending auto-generated call, if any.
    pub fn pending_auto_call(&self, lead_id: &str) -> Option<&ScheduledCall> {
        next_pending_call(self.calls_for(lead_id).iter().filter(|c| c.is_auto()))
    }

    pub fn queued_writes(&self) -> usize {
        self.queue.len()
    }

    pub fn is_in_flight(&self, call_id: &str) -> bool {
        self.in_flight.contains(call_id)
    }

    pub fn is_fetching(&self, lead_id: &str) -> bool {
        self.fetching.get(lead_id).is_some_and(|n| *n > 0)
    }

    fn touch(&mut self, lead_id: &str) {
        self.revision += 1;
        self.lead_revision.insert(lead_id.to_string(), self.revision);
    }

    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn upsert(&mut self, call: ScheduledCall) {
        let calls = self.by_lead.entry(call.lead_id.clone()).or_default();
        match calls.iter_mut().find(|c| c.id == call.id) {
            Some(existing) => *existing = call,
            None => calls.push(call),
        }
    }

    fn remove(&mut self, call_id: &str) -> Option<ScheduledCall> {
        for calls in self.by_lead.values_mut() {
            if let Some(idx) = calls.iter().position(|c| c.id == call_id) {
                return Some(calls.remove(idx));
            }
        }
        None
    }

    /// Add a provisional call locally and queue its creation.
    pub fn stage_create(
        &mut self,
        lead_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
        now: DateTime<Utc>,
    ) -> (u64, ScheduledCall) {
        let mut provisional = ScheduledCall::new(lead_id, time, notes, origin, now);
        provisional.id = format!("local-{}", provisional.id);
        let seq = self.seq();
        self.upsert(provisional.clone());
        self.in_flight.insert(provisional.id.clone());
        self.touch(lead_id);
        self.queue.push_back(PendingWrite::Create {
            seq,
            provisional: provisional.clone(),
        });
        (seq, provisional)
    }

    /// Move a cached call locally and queue the update.
    pub fn stage_update(
        &mut self,
        call_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Option<(u64, ScheduledCall)> {
        let previous = self.find(call_id)?.clone();
        let mut current = previous.clone();
        current.scheduled_time = time;
        current.notes = notes.to_string();
        current.updated_at = now;
        let seq = self.seq();
        self.upsert(current.clone());
        self.in_flight.insert(current.id.clone());
        self.touch(&current.lead_id);
        self.queue.push_back(PendingWrite::Update {
            seq,
            previous,
            current: current.clone(),
        });
        Some((seq, current))
    }

    /// Drop a cached call locally and queue the delete.
    pub fn stage_delete(&mut self, call_id: &str) -> Option<(u64, ScheduledCall)> {
        let previous = self.remove(call_id)?;
        let seq = self.seq();
        self.in_flight.insert(previous.id.clone());
        self.touch(&previous.lead_id);
        self.queue.push_back(PendingWrite::Delete {
            seq,
            previous: previous.clone(),
        });
        Some((seq, previous))
    }

    pub fn next_write(&mut self) -> Option<PendingWrite> {
        self.queue.pop_front()
    }

    fn is_queued(&self, call_id: &str) -> bool {
        self.queue.iter().any(|w| w.call_id() == call_id)
    }

    /// Drop `call_id` from the in-flight set unless later writes still target it.
    fn settle_in_flight(&mut self, call_id: &str) {
        if !self.is_queued(call_id) {
            self.in_flight.remove(call_id);
        }
    }

    /// Point queued writes for a provisional call at its stored id.
    fn rename_queued(&mut self, from: &str, to: &str) {
        for write in self.queue.iter_mut() {
            match write {
                PendingWrite::Create { .. } => {}
                PendingWrite::Update {
                    previous, current, ..
                } => {
                    if current.id == from {
                        previous.id = to.to_string();
                        current.id = to.to_string();
                    }
                }
                PendingWrite::Delete { previous, .. } => {
                    if previous.id == from {
                        previous.id = to.to_string();
                    }
                }
            }
        }
    }

    /// The store accepted `write`; `confirmed` is the stored record.
    pub fn acknowledge(&mut self, write: &PendingWrite, confirmed: Option<ScheduledCall>) {
        match write {
            PendingWrite::Create { provisional, .. } => {
                let local = self.remove(&provisional.id);
                self.in_flight.remove(&provisional.id);
                if let Some(call) = confirmed.clone() {
                    if self.is_queued(&provisional.id) {
                        // later writes were staged against the provisional id
                        self.rename_queued(&provisional.id, &call.id);
                        self.in_flight.insert(call.id.clone());
                        if let Some(mut local) = local {
                            local.id = call.id.clone();
                            local.created_at = call.created_at;
                            self.upsert(local);
                        }
                    } else {
                        self.upsert(call);
                    }
                }
            }
            PendingWrite::Update { current, .. } => {
                self.settle_in_flight(&current.id);
                if let Some(call) = confirmed.clone() {
                    if !self.is_queued(&call.id) {
                        self.upsert(call);
                    }
                }
            }
            PendingWrite::Delete { previous, .. } => self.settle_in_flight(&previous.id),
        }
        self.touch(write.lead_id());
        self.completed.insert(write.seq(), Ok(confirmed));
    }

    /// The store refused `write`; undo its local effect.
    pub fn rollback(&mut self, write: &PendingWrite, err: DialDeskError) {
        match write {
            PendingWrite::Create { provisional, .. } => {
                self.remove(&provisional.id);
                self.in_flight.remove(&provisional.id);
                // writes chained onto a call that was never created fail with it
                let (orphaned, kept): (VecDeque<_>, VecDeque<_>) = self
                    .queue
                    .drain(..)
                    .partition(|w| w.call_id() == provisional.id);
                self.queue = kept;
                for w in orphaned {
                    self.completed.insert(
                        w.seq(),
                        Err(DialDeskError::Store(format!(
                            "scheduled call {} was never created: {err}",
                            provisional.id
                        ))),
                    );
                }
            }
            PendingWrite::Update { previous, .. } => {
                self.settle_in_flight(&previous.id);
                if self.find(&previous.id).is_some() && !self.is_queued(&previous.id) {
                    self.upsert(previous.clone());
                }
            }
            PendingWrite::Delete { previous, .. } => {
                self.settle_in_flight(&previous.id);
                self.upsert(previous.clone());
            }
        }
        self.touch(write.lead_id());
        self.completed.insert(write.seq(), Err(err));
    }

    pub fn take_result(&mut self, seq: u64) -> Option<WriteResult> {
        self.completed.remove(&seq)
    }

    pub fn begin_fetch(&mut self, lead_id: &str) -> FetchTicket {
        *self.fetching.entry(lead_id.to_string()).or_default() += 1;
        FetchTicket {
            lead_id: lead_id.to_string(),
            revision: self.revision,
        }
    }

    /// Close a listing request. Returns whether the listing was applied.
    pub fn finish_fetch(
        &mut self,
        ticket: FetchTicket,
        listing: Option<Vec<ScheduledCall>>,
    ) -> bool {
        if let Some(n) = self.fetching.get_mut(&ticket.lead_id) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.fetching.remove(&ticket.lead_id);
            }
        }
        let Some(remote) = listing else {
            return false;
        };
        let last_write = self.lead_revision.get(&ticket.lead_id).copied().unwrap_or(0);
        if last_write > ticket.revision {
            tracing::debug!(lead = %ticket.lead_id, "discarding listing older than a local write");
            return false;
        }
        self.reconcile(&ticket.lead_id, remote);
        true
    }

    fn reconcile(&mut self, lead_id: &str, remote: Vec<ScheduledCall>) {
        let local = self.by_lead.remove(lead_id).unwrap_or_default();
        let mut merged: Vec<ScheduledCall> = Vec::with_capacity(remote.len());

        for r in remote {
            let mine = local.iter().find(|l| l.id == r.id);
            if self.in_flight.contains(&r.id) {
                // a pending delete has no local copy left
                if let Some(l) = mine {
                    merged.push(l.clone());
                }
                continue;
            }
            match mine {
                Some(l) if l.updated_at > r.updated_at => merged.push(l.clone()),
                _ => merged.push(r),
            }
        }

        for l in local {
            if self.in_flight.contains(&l.id) && !merged.iter().any(|m| m.id == l.id) {
                merged.push(l);
            }
        }

        self.by_lead.insert(lead_id.to_string(), merged);
    }

    /// Forget leads that left the worklist.
    pub fn retain_leads(&mut self, lead_ids: &HashSet<String>) {
        self.by_lead.retain(|id, _| lead_ids.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use dialdesk_core::AUTO_SCHEDULE_TAG;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn stored(id: &str, lead: &str, in_mins: i64, updated: DateTime<Utc>) -> ScheduledCall {
        let mut c = ScheduledCall::new(lead, t0() + Duration::minutes(in_mins), "", CallOrigin::Manual, t0());
        c.id = id.to_string();
        c.updated_at = updated;
        c
    }

    #[test]
    fn test_stage_create_is_visible_immediately() {
        let mut cache = CallCache::new();
        let (seq, call) = cache.stage_create(
            "lead-1",
            t0() + Duration::hours(2),
            AUTO_SCHEDULE_TAG,
            CallOrigin::Auto,
            t0(),
        );
        assert_eq!(cache.calls_for("lead-1").len(), 1);
        assert!(cache.is_in_flight(&call.id));
        assert_eq!(cache.pending_auto_call("lead-1").map(|c| c.id.clone()), Some(call.id.clone()));
        assert_eq!(cache.queued_writes(), 1);

        let write = cache.next_write().unwrap();
        let mut confirmed = call.clone();
        confirmed.id = "call-42".into();
        cache.acknowledge(&write, Some(confirmed));
        assert_eq!(cache.calls_for("lead-1")[0].id, "call-42");
        assert!(!cache.is_in_flight(&call.id));
        assert!(matches!(cache.take_result(seq), Some(Ok(Some(_)))));
    }

    #[test]
    fn test_rollback_create_removes_provisional() {
        let mut cache = CallCache::new();
        let (seq, _) = cache.stage_create("lead-1", t0(), "", CallOrigin::Manual, t0());
        let write = cache.next_write().unwrap();
        cache.rollback(&write, DialDeskError::Store("offline".into()));
        assert!(cache.calls_for("lead-1").is_empty());
        assert!(matches!(cache.take_result(seq), Some(Err(DialDeskError::Store(_)))));
    }

    #[test]
    fn test_rollback_delete_restores_record() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(ticket, Some(vec![stored("c1", "lead-1", 30, t0())]));
        cache.stage_delete("c1").unwrap();
        assert!(cache.calls_for("lead-1").is_empty());
        let write = cache.next_write().unwrap();
        cache.rollback(&write, DialDeskError::Store("offline".into()));
        assert_eq!(cache.calls_for("lead-1").len(), 1);
    }

    #[test]
    fn test_stale_listing_discarded_after_local_write() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        assert!(cache.is_fetching("lead-1"));
        cache.stage_create("lead-1", t0(), "", CallOrigin::Manual, t0());
        let applied = cache.finish_fetch(ticket, Some(vec![]));
        assert!(!applied);
        assert!(!cache.is_fetching("lead-1"));
        assert_eq!(cache.calls_for("lead-1").len(), 1);
    }

    #[test]
    fn test_reconcile_keeps_in_flight_and_newer_local() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(
            ticket,
            Some(vec![
                stored("c1", "lead-1", 30, t0()),
                stored("c2", "lead-1", 60, t0()),
            ]),
        );
        // local update in flight on c1
        cache.stage_update("c1", t0() + Duration::minutes(90), "", t0() + Duration::minutes(1)).unwrap();

        let ticket = cache.begin_fetch("lead-1");
        let older_c2 = stored("c2", "lead-1", 75, t0() - Duration::minutes(5));
        cache.finish_fetch(
            ticket,
            Some(vec![stored("c1", "lead-1", 30, t0()), older_c2]),
        );
        let calls = cache.calls_for("lead-1");
        let c1 = calls.iter().find(|c| c.id == "c1").unwrap();
        assert_eq!(c1.scheduled_time, t0() + Duration::minutes(90));
        let c2 = calls.iter().find(|c| c.id == "c2").unwrap();
        assert_eq!(c2.scheduled_time, t0() + Duration::minutes(60));
    }

    #[test]
    fn test_reconcile_takes_newer_remote_and_drops_deleted() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(
            ticket,
            Some(vec![
                stored("c1", "lead-1", 30, t0()),
                stored("c2", "lead-1", 60, t0()),
            ]),
        );
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(
            ticket,
            Some(vec![stored("c1", "lead-1", 45, t0() + Duration::minutes(3))]),
        );
        let calls = cache.calls_for("lead-1");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].scheduled_time, t0() + Duration::minutes(45));
    }

    #[test]
    fn test_failed_listing_leaves_cache_alone() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(ticket, Some(vec![stored("c1", "lead-1", 30, t0())]));
        let ticket = cache.begin_fetch("lead-1");
        assert!(!cache.finish_fetch(ticket, None));
        assert_eq!(cache.calls_for("lead-1").len(), 1);
    }

    #[test]
    fn test_update_staged_on_provisional_follows_confirmed_id() {
        let mut cache = CallCache::new();
        let (_, provisional) = cache.stage_create(
            "lead-1",
            t0() + Duration::hours(2),
            AUTO_SCHEDULE_TAG,
            CallOrigin::Auto,
            t0(),
        );
        let create = cache.next_write().unwrap();
        let (update_seq, _) = cache
            .stage_update(&provisional.id, t0() + Duration::minutes(20), "", t0())
            .unwrap();

        let mut confirmed = provisional.clone();
        confirmed.id = "call-7".into();
        cache.acknowledge(&create, Some(confirmed));

        // local edit survives under the stored id
        let calls = cache.calls_for("lead-1");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call-7");
        assert_eq!(calls[0].scheduled_time, t0() + Duration::minutes(20));
        assert!(cache.is_in_flight("call-7"));
        assert!(!cache.is_in_flight(&provisional.id));

        let update = cache.next_write().unwrap();
        assert_eq!(update.call_id(), "call-7");
        let stored = cache.calls_for("lead-1")[0].clone();
        cache.acknowledge(&update, Some(stored));
        assert!(!cache.is_in_flight("call-7"));
        assert!(matches!(cache.take_result(update_seq), Some(Ok(Some(c))) if c.id == "call-7"));
    }

    #[test]
    fn test_failed_create_fails_chained_writes() {
        let mut cache = CallCache::new();
        let (create_seq, provisional) =
            cache.stage_create("lead-1", t0(), AUTO_SCHEDULE_TAG, CallOrigin::Auto, t0());
        let create = cache.next_write().unwrap();
        let (update_seq, _) = cache
            .stage_update(&provisional.id, t0() + Duration::minutes(5), "", t0())
            .unwrap();

        cache.rollback(&create, DialDeskError::Store("offline".into()));
        assert!(cache.calls_for("lead-1").is_empty());
        assert_eq!(cache.queued_writes(), 0);
        assert!(!cache.is_in_flight(&provisional.id));
        assert!(matches!(cache.take_result(create_seq), Some(Err(_))));
        assert!(matches!(cache.take_result(update_seq), Some(Err(DialDeskError::Store(_)))));
    }

    #[test]
    fn test_rollback_update_skips_record_deleted_locally() {
        let mut cache = CallCache::new();
        let ticket = cache.begin_fetch("lead-1");
        cache.finish_fetch(ticket, Some(vec![stored("c1", "lead-1", 30, t0())]));
        cache.stage_update("c1", t0() + Duration::minutes(90), "", t0()).unwrap();
        let update = cache.next_write().unwrap();
        cache.stage_delete("c1").unwrap();

        cache.rollback(&update, DialDeskError::Store("offline".into()));
        assert!(cache.calls_for("lead-1").is_empty());
        assert!(cache.is_in_flight("c1"));
    }
}

//! Scheduled-call repository client: the only path to the call store.
//! Owns the local cache; writes go through the cache's queue, reads are
//! reconciled back into it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dialdesk_core::traits::ScheduledCallStore;
use dialdesk_core::{CallOrigin, DialDeskError, Result, ScheduledCall};
use futures::future::join_all;
use tokio::sync::Mutex;

use crate::cache::{CallCache, PendingWrite};

pub struct CallRepository {
    store: Arc<dyn ScheduledCallStore>,
    cache: Mutex<CallCache>,
    /// Serialises flushes so queued writes reach the store in order.
    flush_lock: Mutex<()>,
}

impl CallRepository {
    pub fn new(store: Arc<dyn ScheduledCallStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(CallCache::new()),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Copy of every cached call, keyed by lead.
    pub async fn snapshot(&self) -> HashMap<String, Vec<ScheduledCall>> {
        self.cache.lock().await.all().clone()
    }

    pub async fn calls_for(&self, lead_id: &str) -> Vec<ScheduledCall> {
        self.cache.lock().await.calls_for(lead_id).to_vec()
    }

    pub async fn pending_auto_call(&self, lead_id: &str) -> Option<ScheduledCall> {
        self.cache.lock().await.pending_auto_call(lead_id).cloned()
    }

    /// Re-read one lead's calls from the store.
    pub async fn fetch_for_lead(&self, lead_id: &str) -> Result<Vec<ScheduledCall>> {
        let ticket = self.cache.lock().await.begin_fetch(lead_id);
        match self.store.list_by_lead(lead_id).await {
            Ok(listing) => {
                let mut cache = self.cache.lock().await;
                cache.finish_fetch(ticket, Some(listing));
                Ok(cache.calls_for(lead_id).to_vec())
            }
            Err(e) => {
                self.cache.lock().await.finish_fetch(ticket, None);
                Err(e)
            }
        }
    }

    /// Re-read every listed lead concurrently. Returns the failure count.
    pub async fn fetch_all(&self, lead_ids: &[String]) -> usize {
        let results = join_all(lead_ids.iter().map(|id| self.fetch_for_lead(id))).await;
        let mut failures = 0;
        for (id, result) in lead_ids.iter().zip(results) {
            if let Err(e) = result {
                failures += 1;
                tracing::debug!(lead = %id, "call listing failed: {e}");
            }
        }
        let keep: HashSet<String> = lead_ids.iter().cloned().collect();
        self.cache.lock().await.retain_leads(&keep);
        failures
    }

    /// Create a call. It is visible in the cache before the store answers.
    pub async fn create(
        &self,
        lead_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
        now: DateTime<Utc>,
    ) -> Result<ScheduledCall> {
        let (seq, _) = self
            .cache
            .lock()
            .await
            .stage_create(lead_id, time, notes, origin, now);
        self.settle(seq).await
    }

    pub async fn update(
        &self,
        call_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledCall> {
        let staged = self.cache.lock().await.stage_update(call_id, time, notes, now);
        let Some((seq, _)) = staged else {
            return Err(DialDeskError::NotFound(format!("scheduled call {call_id}")));
        };
        self.settle(seq).await
    }

    pub async fn delete(&self, call_id: &str) -> Result<ScheduledCall> {
        let staged = self.cache.lock().await.stage_delete(call_id);
        let Some((seq, _)) = staged else {
            return Err(DialDeskError::NotFound(format!("scheduled call {call_id}")));
        };
        // resolves to the removed record under its stored id
        self.settle(seq).await
    }

    async fn settle(&self, seq: u64) -> Result<ScheduledCall> {
        self.flush().await;
        let result = self.cache.lock().await.take_result(seq);
        match result {
            Some(Ok(Some(call))) => Ok(call),
            Some(Ok(None)) => Err(DialDeskError::NotFound(format!("write #{seq} returned no record"))),
            Some(Err(e)) => Err(e),
            None => Err(DialDeskError::Store(format!("write #{seq} was not flushed"))),
        }
    }

    /// Push every queued write to the store, oldest first.
    pub async fn flush(&self) {
        let _guard = self.flush_lock.lock().await;
        loop {
            let next = self.cache.lock().await.next_write();
            let Some(write) = next else {
                break;
            };
            let outcome = self.apply(&write).await;
            let mut cache = self.cache.lock().await;
            match outcome {
                Ok(confirmed) => cache.acknowledge(&write, confirmed),
                Err(e) => {
                    tracing::warn!(call = %write.call_id(), "⚠️ Scheduled-call write failed: {e}");
                    cache.rollback(&write, e);
                }
            }
        }
    }

    async fn apply(&self, write: &PendingWrite) -> Result<Option<ScheduledCall>> {
        match write {
            PendingWrite::Create { provisional, .. } => self
                .store
                .create(
                    &provisional.lead_id,
                    provisional.scheduled_time,
                    &provisional.notes,
                    provisional.origin,
                )
                .await
                .map(Some),
            PendingWrite::Update { current, .. } => self
                .store
                .update(&current.id, current.scheduled_time, &current.notes)
                .await
                .map(Some),
            PendingWrite::Delete { previous, .. } => {
                self.store.delete(&previous.id).await.map(|_| Some(previous.clone()))
            }
        }
    }
}

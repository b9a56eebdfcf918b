//! In-memory lead and scheduled-call store.
//! Used for demos and tests; failures can be switched on to exercise the
//! engine's degraded paths.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialdesk_core::traits::{LeadStore, ScheduledCallStore};
use dialdesk_core::{
    CallOrigin, CallStatus, Clock, DialDeskError, Lead, LeadFilter, LeadStatus, Result, ScheduledCall,
};

pub struct MemoryStore {
    leads: Mutex<Vec<Lead>>,
    calls: Mutex<Vec<ScheduledCall>>,
    clock: Arc<dyn Clock>,
    call_reads_failing: AtomicBool,
    call_writes_failing: AtomicBool,
    lead_writes_failing: AtomicBool,
    /// Yield to the runtime before each call write, like a network round trip.
    call_writes_slow: AtomicBool,
    /// Number of upcoming `list_leads` calls that fail.
    lead_list_failures: AtomicU32,
    lead_list_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            leads: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            clock,
            call_reads_failing: AtomicBool::new(false),
            call_writes_failing: AtomicBool::new(false),
            lead_writes_failing: AtomicBool::new(false),
            call_writes_slow: AtomicBool::new(false),
            lead_list_failures: AtomicU32::new(0),
            lead_list_calls: AtomicU32::new(0),
        }
    }

    pub fn set_call_reads_failing(&self, failing: bool) {
        self.call_reads_failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_call_writes_failing(&self, failing: bool) {
        self.call_writes_failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_call_writes_slow(&self, slow: bool) {
        self.call_writes_slow.store(slow, Ordering::Relaxed);
    }

    async fn write_latency(&self) {
        if self.call_writes_slow.load(Ordering::Relaxed) {
            tokio::task::yield_now().await;
        }
    }

    pub fn set_lead_writes_failing(&self, failing: bool) {
        self.lead_writes_failing.store(failing, Ordering::Relaxed);
    }

    pub fn fail_next_lead_lists(&self, n: u32) {
        self.lead_list_failures.store(n, Ordering::Relaxed);
    }

    /// How many times `list_leads` has been called.
    pub fn lead_list_calls(&self) -> u32 {
        self.lead_list_calls.load(Ordering::Relaxed)
    }

    /// Direct copy of every stored call, bypassing failure switches.
    pub fn stored_calls(&self) -> Vec<ScheduledCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn stored_lead(&self, id: &str) -> Option<Lead> {
        self.leads
            .lock()
            .ok()
            .and_then(|leads| leads.iter().find(|l| l.id == id).cloned())
    }

    /// Insert a call record as-is.
    pub fn insert_call(&self, call: ScheduledCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn poisoned<T>(_: T) -> DialDeskError {
        DialDeskError::Store("memory store lock poisoned".into())
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::Relaxed) {
            Err(DialDeskError::Store(format!("{what}: store unavailable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        self.lead_list_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.lead_list_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.lead_list_failures.store(remaining - 1, Ordering::Relaxed);
            return Err(DialDeskError::Store("list leads: store unavailable".into()));
        }
        let leads = self.leads.lock().map_err(Self::poisoned)?;
        Ok(leads.iter().filter(|l| filter.matches(l)).cloned().collect())
    }

    async fn create_lead(&self, lead: Lead) -> Result<Lead> {
        Self::check(&self.lead_writes_failing, "create lead")?;
        self.leads.lock().map_err(Self::poisoned)?.push(lead.clone());
        Ok(lead)
    }

    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<()> {
        Self::check(&self.lead_writes_failing, "update lead status")?;
        let mut leads = self.leads.lock().map_err(Self::poisoned)?;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| DialDeskError::NotFound(format!("lead {id}")))?;
        lead.status = status;
        Ok(())
    }

    async fn complete_call(&self, id: &str) -> Result<Lead> {
        Self::check(&self.lead_writes_failing, "complete call")?;
        let mut leads = self.leads.lock().map_err(Self::poisoned)?;
        let lead = leads
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| DialDeskError::NotFound(format!("lead {id}")))?;
        lead.status = LeadStatus::CallCompleted;
        let now = self.clock.now();
        for call in self.calls.lock().map_err(Self::poisoned)?.iter_mut() {
            if call.lead_id == id && call.is_pending() {
                call.status = CallStatus::Completed;
                call.updated_at = now;
            }
        }
        Ok(lead.clone())
    }
}

#[async_trait]
impl ScheduledCallStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<ScheduledCall>> {
        Self::check(&self.call_reads_failing, "list calls")?;
        let calls = self.calls.lock().map_err(Self::poisoned)?;
        let mut own: Vec<ScheduledCall> =
            calls.iter().filter(|c| c.lead_id == lead_id).cloned().collect();
        own.sort_by_key(|c| c.scheduled_time);
        Ok(own)
    }

    async fn create(
        &self,
        lead_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
    ) -> Result<ScheduledCall> {
        self.write_latency().await;
        Self::check(&self.call_writes_failing, "create call")?;
        let call = ScheduledCall::new(lead_id, time, notes, origin, self.clock.now());
        self.calls.lock().map_err(Self::poisoned)?.push(call.clone());
        Ok(call)
    }

    async fn update(&self, id: &str, time: DateTime<Utc>, notes: &str) -> Result<ScheduledCall> {
        self.write_latency().await;
        Self::check(&self.call_writes_failing, "update call")?;
        let mut calls = self.calls.lock().map_err(Self::poisoned)?;
        let call = calls
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DialDeskError::NotFound(format!("scheduled call {id}")))?;
        call.scheduled_time = time;
        call.notes = notes.to_string();
        call.updated_at = self.clock.now();
        Ok(call.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.write_latency().await;
        Self::check(&self.call_writes_failing, "delete call")?;
        let mut calls = self.calls.lock().map_err(Self::poisoned)?;
        let before = calls.len();
        calls.retain(|c| c.id != id);
        if calls.len() == before {
            return Err(DialDeskError::NotFound(format!("scheduled call {id}")));
        }
        Ok(())
    }
}

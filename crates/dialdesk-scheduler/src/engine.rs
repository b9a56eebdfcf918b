//! Worklist engine: owns the ordered worklist and the operator actions,
//! plus the single scheduler loop that keeps it fresh.
//!
//! Store I/O always happens outside the state lock; results are applied
//! back under it. The loop ticks once per `tick_ms`: every tick runs the
//! countdown pass, every `refresh_secs` re-polls the scheduled calls, and
//! every `lead_refresh_secs` silently reloads the lead list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dialdesk_core::config::SchedulerConfig;
use dialdesk_core::traits::{LeadStore, NotificationSink, OperatorPrompt, ScheduledCallStore};
use dialdesk_core::{Clock, DialDeskError, Lead, LeadFilter, LeadStatus, Result, ScheduledCall};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::countdown::{self, CountdownTracker};
use crate::escalation::{self, NotConnectedOutcome};
use crate::priority::{PriorityClassification, PriorityStatus, evaluate_with_window, next_pending_call};
use crate::repository::CallRepository;
use crate::retry::{RetryPolicy, RetryStats, retry_fixed};
use crate::worklist::sort_worklist_with_window;

/// One row of the worklist as shown to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct WorklistEntry {
    pub lead: Lead,
    pub priority: PriorityClassification,
    pub next_call: Option<ScheduledCall>,
    pub countdown: Option<String>,
    pub overdue: bool,
}

#[derive(Default)]
struct WorklistState {
    /// Leads in worklist order.
    leads: Vec<Lead>,
    overdue: HashSet<String>,
    countdown: CountdownTracker,
    /// Status set locally; wins over the store until the store agrees.
    local_status: HashMap<String, LeadStatus>,
}

impl WorklistState {
    fn lead(&self, id: &str) -> Option<&Lead> {
        self.leads.iter().find(|l| l.id == id)
    }

    fn set_status(&mut self, id: &str, status: LeadStatus) {
        if let Some(lead) = self.leads.iter_mut().find(|l| l.id == id) {
            lead.status = status;
        }
        self.local_status.insert(id.to_string(), status);
    }
}

/// Clears its flag on drop.
struct Running<'a>(&'a AtomicBool);

impl<'a> Running<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct WorklistEngine {
    leads: Arc<dyn LeadStore>,
    calls: CallRepository,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    filter: LeadFilter,
    state: Mutex<WorklistState>,
    active: AtomicBool,
    lead_refresh_running: AtomicBool,
    call_refresh_running: AtomicBool,
    lead_refresh_stats: RetryStats,
}

impl WorklistEngine {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        calls: Arc<dyn ScheduledCallStore>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        filter: LeadFilter,
    ) -> Self {
        Self {
            leads,
            calls: CallRepository::new(calls),
            sink,
            clock,
            config,
            filter,
            state: Mutex::new(WorklistState::default()),
            active: AtomicBool::new(true),
            lead_refresh_running: AtomicBool::new(false),
            call_refresh_running: AtomicBool::new(false),
            lead_refresh_stats: RetryStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Late store responses are ignored once the engine is deactivated.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn lead_refresh_stats(&self) -> &RetryStats {
        &self.lead_refresh_stats
    }

    /// Initial load: notification permission, leads, then their calls.
    pub async fn start(&self) -> Result<()> {
        match self.sink.request_permission().await {
            Ok(true) => tracing::debug!(sink = self.sink.name(), "notifications enabled"),
            Ok(false) => tracing::info!(sink = self.sink.name(), "🔕 Notifications not permitted"),
            Err(e) => tracing::warn!(sink = self.sink.name(), "⚠️ Notification permission check failed: {e}"),
        }
        let count = self.refresh_leads(false).await?;
        tracing::info!(
            "📋 Worklist loaded: {count} leads (leads: {}, calls: {})",
            self.leads.name(),
            self.calls.store_name()
        );
        Ok(())
    }

    /// Reload the lead list, then every lead's calls.
    ///
    /// A user-initiated refresh surfaces the error. A silent one retries
    /// with a fixed delay, then gives up quietly and keeps the current list.
    pub async fn refresh_leads(&self, silent: bool) -> Result<usize> {
        let listing = if silent {
            let Some(_running) = Running::acquire(&self.lead_refresh_running) else {
                tracing::debug!("lead refresh already running, skipped");
                return Ok(self.state.lock().await.leads.len());
            };
            let policy = RetryPolicy::fixed(
                self.config.lead_refresh_retries,
                Duration::from_millis(self.config.retry_delay_ms),
            );
            let (store, filter) = (&self.leads, &self.filter);
            match retry_fixed(policy, "lead refresh", &self.lead_refresh_stats, move || {
                store.list_leads(filter)
            })
            .await
            {
                Ok(leads) => leads,
                Err(e) => {
                    tracing::debug!("silent lead refresh abandoned: {e}");
                    return Ok(self.state.lock().await.leads.len());
                }
            }
        } else {
            self.leads.list_leads(&self.filter).await?
        };

        if !self.is_active() {
            return Ok(0);
        }

        let ids = {
            let mut state = self.state.lock().await;
            let mut leads = Vec::with_capacity(listing.len());
            for mut lead in listing {
                if let Some(local) = state.local_status.get(&lead.id).copied() {
                    if lead.status == local {
                        state.local_status.remove(&lead.id);
                    } else {
                        lead.status = local;
                    }
                }
                if self.filter.matches(&lead) {
                    leads.push(lead);
                }
            }
            let ids: HashSet<String> = leads.iter().map(|l| l.id.clone()).collect();
            state.local_status.retain(|id, _| ids.contains(id));
            state.overdue.retain(|id| ids.contains(id));
            state.leads = leads;
            state.leads.iter().map(|l| l.id.clone()).collect::<Vec<_>>()
        };

        self.calls.fetch_all(&ids).await;
        self.recompute().await;
        Ok(ids.len())
    }

    /// Re-poll every lead's calls. Returns the number of failed listings.
    pub async fn refresh_all_calls(&self) -> usize {
        let ids: Vec<String> = {
            let state = self.state.lock().await;
            state.leads.iter().map(|l| l.id.clone()).collect()
        };
        let failures = self.calls.fetch_all(&ids).await;
        if failures > 0 {
            tracing::debug!("call refresh: {failures}/{} listings failed", ids.len());
        }
        self.recompute().await;
        failures
    }

    pub async fn refresh_calls_for(&self, lead_id: &str) -> Result<Vec<ScheduledCall>> {
        let calls = self.calls.fetch_for_lead(lead_id).await?;
        self.recompute().await;
        Ok(calls)
    }

    /// Re-sort the worklist and refresh the overdue set.
    /// Returns the leads that became overdue in this pass.
    pub async fn recompute(&self) -> Vec<String> {
        if !self.is_active() {
            return Vec::new();
        }
        let calls = self.calls.snapshot().await;
        let now = self.clock.now();
        let window = self.config.soon_window_mins;

        let mut state = self.state.lock().await;
        state.leads = sort_worklist_with_window(&state.leads, &calls, now, window);

        let overdue: HashSet<String> = state
            .leads
            .iter()
            .filter(|lead| {
                let own = calls.get(&lead.id).map(Vec::as_slice).unwrap_or(&[]);
                evaluate_with_window(lead, own, now, window).status == PriorityStatus::Urgent
            })
            .map(|lead| lead.id.clone())
            .collect();

        let newly: Vec<String> = state
            .leads
            .iter()
            .filter(|l| overdue.contains(&l.id) && !state.overdue.contains(&l.id))
            .map(|l| l.id.clone())
            .collect();
        for id in &newly {
            if let Some(lead) = state.lead(id) {
                tracing::info!(lead = %id, "⏰ {} is now overdue", lead.name);
            }
        }
        state.overdue = overdue;
        newly
    }

    /// Countdown pass; shows any reminder that became due.
    pub async fn countdown_tick(&self) -> usize {
        if !self.is_active() {
            return 0;
        }
        let calls = self.calls.snapshot().await;
        let now = self.clock.now();
        let reminders = {
            let mut state = self.state.lock().await;
            let WorklistState {
                leads, countdown, ..
            } = &mut *state;
            countdown.tick(leads, &calls, now, self.config.reminder_window_mins)
        };
        if reminders.is_empty() {
            return 0;
        }
        countdown::deliver(self.sink.as_ref(), &reminders).await
    }

    async fn known_lead(&self, lead_id: &str) -> Result<Lead> {
        self.state
            .lock()
            .await
            .lead(lead_id)
            .cloned()
            .ok_or_else(|| DialDeskError::NotFound(format!("lead {lead_id}")))
    }

    /// Best-effort remote status write; the local status already changed.
    async fn push_status(&self, lead_id: &str, status: LeadStatus) {
        if let Err(e) = self.leads.update_lead_status(lead_id, status).await {
            tracing::warn!(lead = %lead_id, "⚠️ Status {status} kept locally, store write failed: {e}");
        }
    }

    pub async fn mark_connected(&self, lead_id: &str) -> Result<()> {
        self.known_lead(lead_id).await?;
        self.state
            .lock()
            .await
            .set_status(lead_id, LeadStatus::Connected);
        tracing::info!(lead = %lead_id, "📞 Call connected");
        self.push_status(lead_id, LeadStatus::Connected).await;
        Ok(())
    }

    /// Record a failed attempt and, if the operator agrees, book the
    /// follow-up call.
    pub async fn mark_not_connected(
        &self,
        lead_id: &str,
        prompt: &dyn OperatorPrompt,
    ) -> Result<NotConnectedOutcome> {
        let lead = self.known_lead(lead_id).await?;
        let question = format!(
            "Call to {} did not connect. Schedule a follow-up call in {} minutes?",
            lead.name, self.config.escalation_delay_mins
        );
        let confirmed = prompt.confirm(&question).await;

        self.state
            .lock()
            .await
            .set_status(lead_id, LeadStatus::NotConnected);

        if !confirmed {
            tracing::info!(lead = %lead_id, "📵 Not connected, follow-up declined");
            return Ok(NotConnectedOutcome::Declined);
        }

        self.push_status(lead_id, LeadStatus::NotConnected).await;
        let outcome = escalation::escalate_not_connected(
            &self.calls,
            lead_id,
            self.clock.now(),
            self.config.escalation_delay_mins,
        )
        .await;
        self.recompute().await;
        Ok(outcome)
    }

    pub async fn schedule_or_update(
        &self,
        lead_id: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<ScheduledCall> {
        self.known_lead(lead_id).await?;
        let call = escalation::schedule_or_update(&self.calls, lead_id, time, self.clock.now()).await?;
        if let Err(e) = self.calls.fetch_for_lead(lead_id).await {
            tracing::debug!(lead = %lead_id, "refetch after scheduling failed: {e}");
        }
        self.recompute().await;
        Ok(call)
    }

    /// Remove a scheduled call. The record is restored if the store refuses.
    pub async fn delete_scheduled_call(&self, call_id: &str) -> Result<ScheduledCall> {
        let result = self.calls.delete(call_id).await;
        self.recompute().await;
        let removed = result?;
        tracing::info!(call = %call_id, lead = %removed.lead_id, "🗑️ Scheduled call deleted");
        Ok(removed)
    }

    /// Close the lead; it leaves the active worklist.
    pub async fn complete_call(&self, lead_id: &str) -> Result<Lead> {
        let lead = self.leads.complete_call(lead_id).await?;
        {
            let mut state = self.state.lock().await;
            if self.filter.matches(&lead) {
                if let Some(slot) = state.leads.iter_mut().find(|l| l.id == lead_id) {
                    *slot = lead.clone();
                }
            } else {
                state.leads.retain(|l| l.id != lead_id);
                state.overdue.remove(lead_id);
            }
            state.local_status.remove(lead_id);
        }
        tracing::info!(lead = %lead_id, "✅ Call completed");
        self.recompute().await;
        Ok(lead)
    }

    /// Add a lead through the store and pick it up in the worklist.
    pub async fn add_lead(&self, name: &str, phone: &str, assigned_to: Option<String>) -> Result<Lead> {
        if name.trim().is_empty() || phone.trim().is_empty() {
            return Err(DialDeskError::Validation("lead needs a name and a phone number".into()));
        }
        let mut lead = Lead::new(name.trim(), phone.trim(), self.clock.now());
        lead.assigned_to = assigned_to;
        let lead = self.leads.create_lead(lead).await?;
        if self.filter.matches(&lead) {
            self.state.lock().await.leads.push(lead.clone());
            self.recompute().await;
        }
        tracing::info!(lead = %lead.id, "➕ Lead added: {}", lead.name);
        Ok(lead)
    }

    /// The worklist in order, with each lead's classification.
    pub async fn snapshot(&self) -> Vec<WorklistEntry> {
        let calls = self.calls.snapshot().await;
        let now = self.clock.now();
        let window = self.config.soon_window_mins;
        let state = self.state.lock().await;
        state
            .leads
            .iter()
            .map(|lead| {
                let own = calls.get(&lead.id).map(Vec::as_slice).unwrap_or(&[]);
                WorklistEntry {
                    lead: lead.clone(),
                    priority: evaluate_with_window(lead, own, now, window),
                    next_call: next_pending_call(own).cloned(),
                    countdown: state.countdown.countdown_for(&lead.id).map(str::to_string),
                    overdue: state.overdue.contains(&lead.id),
                }
            })
            .collect()
    }

    pub async fn priority_of(&self, lead_id: &str) -> Option<PriorityClassification> {
        let lead = self.state.lock().await.lead(lead_id).cloned()?;
        let calls = self.calls.calls_for(lead_id).await;
        Some(evaluate_with_window(
            &lead,
            &calls,
            self.clock.now(),
            self.config.soon_window_mins,
        ))
    }

    pub async fn countdown_of(&self, lead_id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .countdown
            .countdown_for(lead_id)
            .map(str::to_string)
    }

    pub async fn overdue_leads(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .leads
            .iter()
            .filter(|l| state.overdue.contains(&l.id))
            .map(|l| l.id.clone())
            .collect()
    }

    /// Background call poll; skipped while the previous one is running.
    pub async fn background_call_refresh(&self) {
        let Some(_running) = Running::acquire(&self.call_refresh_running) else {
            tracing::debug!("call refresh already running, skipped");
            return;
        };
        self.refresh_all_calls().await;
    }
}

/// Handle to the running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it. In-flight store requests are left
    /// to finish; the engine ignores what they return.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("⚠️ Scheduler task ended abnormally: {e}");
        }
    }
}

fn ticks_between(period_ms: u64, tick_ms: u64) -> u64 {
    (period_ms / tick_ms.max(1)).max(1)
}

/// Spawn the scheduler loop as a background tokio task.
pub fn spawn_scheduler(engine: Arc<WorklistEngine>) -> SchedulerHandle {
    let (tx, mut rx) = watch::channel(false);
    let config = engine.config().clone();
    let refresh_every = ticks_between(config.refresh_secs * 1000, config.tick_ms);
    let lead_refresh_every = ticks_between(config.lead_refresh_secs * 1000, config.tick_ms);

    let task = tokio::spawn(async move {
        tracing::info!(
            "⏰ Scheduler started (tick {}ms, calls every {}s, leads every {}s)",
            config.tick_ms,
            config.refresh_secs,
            config.lead_refresh_secs
        );

        let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = rx.changed() => {
                    if changed.is_err() || *rx.borrow() {
                        break;
                    }
                    continue;
                }
            }
            ticks += 1;

            engine.countdown_tick().await;

            if ticks % refresh_every == 0 {
                let engine = engine.clone();
                tokio::spawn(async move { engine.background_call_refresh().await });
            }

            if ticks % lead_refresh_every == 0 {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.refresh_leads(true).await {
                        tracing::debug!("silent lead refresh: {e}");
                    }
                });
            }
        }

        engine.deactivate();
        tracing::info!("⏰ Scheduler stopped after {ticks} ticks");
    });

    SchedulerHandle { shutdown: tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NotifyTarget;
    use crate::memory::MemoryStore;
    use crate::notify::NotifyRouter;
    use chrono::TimeZone;
    use dialdesk_core::traits::FixedAnswer;
    use dialdesk_core::{AUTO_SCHEDULE_TAG, CallOrigin, ManualClock};

    struct Fixture {
        store: Arc<MemoryStore>,
        router: Arc<NotifyRouter>,
        clock: Arc<ManualClock>,
        engine: WorklistEngine,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            retry_delay_ms: 1,
            ..SchedulerConfig::default()
        }
    }

    async fn fixture(names: &[&str]) -> Fixture {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        for (i, name) in names.iter().enumerate() {
            let mut lead = Lead::new(name, &format!("+1 555 01{i:02}"), t0());
            lead.id = format!("lead-{}", name.to_lowercase());
            store.create_lead(lead).await.unwrap();
        }
        let mut router = NotifyRouter::new(clock.clone());
        router.register("log", NotifyTarget::Log);
        let router = Arc::new(router);
        let engine = WorklistEngine::new(
            store.clone(),
            store.clone(),
            router.clone(),
            clock.clone(),
            test_config(),
            LeadFilter::default(),
        );
        engine.start().await.unwrap();
        Fixture {
            store,
            router,
            clock,
            engine,
        }
    }

    fn order(entries: &[WorklistEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.lead.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_start_loads_and_orders_worklist() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        for id in ["a", "b"] {
            let mut lead = Lead::new(id, "+1", t0());
            lead.id = id.into();
            store.create_lead(lead).await.unwrap();
        }
        store.insert_call(ScheduledCall::new(
            "a",
            t0() + chrono::Duration::hours(3),
            "",
            CallOrigin::Manual,
            t0(),
        ));
        let engine = WorklistEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(NotifyRouter::new(clock.clone())),
            clock,
            test_config(),
            LeadFilter::default(),
        );
        engine.start().await.unwrap();
        let entries = engine.snapshot().await;
        // no pending call ranks above a future call
        assert_eq!(order(&entries), vec!["b", "a"]);
        assert_eq!(entries[1].priority.text, "Scheduled: 12:00 UTC");
        assert!(entries[1].next_call.is_some());
    }

    #[tokio::test]
    async fn test_not_connected_confirmed_books_follow_up() {
        let f = fixture(&["Ada"]).await;
        let outcome = f
            .engine
            .mark_not_connected("lead-ada", &FixedAnswer(true))
            .await
            .unwrap();
        let call = outcome.call().cloned().unwrap();
        assert_eq!(call.scheduled_time, t0() + chrono::Duration::hours(2));
        assert_eq!(call.notes, AUTO_SCHEDULE_TAG);

        let entries = f.engine.snapshot().await;
        assert_eq!(entries[0].lead.status, LeadStatus::NotConnected);
        assert_eq!(entries[0].priority.status, PriorityStatus::Scheduled);
        assert!(entries[0].priority.text.ends_with("(Low Priority)"));
        assert_eq!(
            f.store.stored_lead("lead-ada").unwrap().status,
            LeadStatus::NotConnected
        );
    }

    #[tokio::test]
    async fn test_not_connected_declined_touches_nothing_remote() {
        let f = fixture(&["Ada"]).await;
        let outcome = f
            .engine
            .mark_not_connected("lead-ada", &FixedAnswer(false))
            .await
            .unwrap();
        assert_eq!(outcome, NotConnectedOutcome::Declined);
        assert!(f.store.stored_calls().is_empty());
        assert_eq!(f.store.stored_lead("lead-ada").unwrap().status, LeadStatus::New);
        let entries = f.engine.snapshot().await;
        assert_eq!(entries[0].lead.status, LeadStatus::NotConnected);
    }

    #[tokio::test]
    async fn test_not_connected_with_store_down_keeps_status() {
        let f = fixture(&["Ada"]).await;
        f.store.set_call_writes_failing(true);
        let outcome = f
            .engine
            .mark_not_connected("lead-ada", &FixedAnswer(true))
            .await
            .unwrap();
        assert!(matches!(outcome, NotConnectedOutcome::ScheduleFailed { .. }));
        let entries = f.engine.snapshot().await;
        assert_eq!(entries[0].lead.status, LeadStatus::NotConnected);
        assert!(entries[0].next_call.is_none());
    }

    #[tokio::test]
    async fn test_local_status_survives_refresh_until_store_agrees() {
        let f = fixture(&["Ada"]).await;
        f.store.set_lead_writes_failing(true);
        f.engine.mark_connected("lead-ada").await.unwrap();
        f.engine.refresh_leads(false).await.unwrap();
        assert_eq!(f.engine.snapshot().await[0].lead.status, LeadStatus::Connected);
        assert_eq!(f.store.stored_lead("lead-ada").unwrap().status, LeadStatus::New);
    }

    #[tokio::test]
    async fn test_schedule_without_time_is_rejected() {
        let f = fixture(&["Ada"]).await;
        let err = f.engine.schedule_or_update("lead-ada", None).await.unwrap_err();
        assert!(matches!(err, DialDeskError::Validation(_)));
        assert!(f.store.stored_calls().is_empty());
    }

    #[tokio::test]
    async fn test_schedule_for_unknown_lead() {
        let f = fixture(&["Ada"]).await;
        let err = f
            .engine
            .schedule_or_update("lead-nobody", Some(t0()))
            .await
            .unwrap_err();
        assert!(matches!(err, DialDeskError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_scheduling_reorders_worklist() {
        let f = fixture(&["Ada", "Bob"]).await;
        f.engine
            .schedule_or_update("lead-ada", Some(t0() + chrono::Duration::hours(1)))
            .await
            .unwrap();
        f.engine
            .schedule_or_update("lead-bob", Some(t0() + chrono::Duration::minutes(10)))
            .await
            .unwrap();
        assert_eq!(order(&f.engine.snapshot().await), vec!["lead-bob", "lead-ada"]);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_call() {
        let f = fixture(&["Ada"]).await;
        let call = f
            .engine
            .schedule_or_update("lead-ada", Some(t0() + chrono::Duration::hours(1)))
            .await
            .unwrap();
        f.store.set_call_writes_failing(true);
        assert!(f.engine.delete_scheduled_call(&call.id).await.is_err());
        let entries = f.engine.snapshot().await;
        assert_eq!(entries[0].next_call.as_ref().map(|c| c.id.as_str()), Some(call.id.as_str()));

        f.store.set_call_writes_failing(false);
        f.engine.delete_scheduled_call(&call.id).await.unwrap();
        assert!(f.engine.snapshot().await[0].next_call.is_none());
    }

    #[tokio::test]
    async fn test_complete_call_leaves_worklist() {
        let f = fixture(&["Ada", "Bob"]).await;
        let lead = f.engine.complete_call("lead-ada").await.unwrap();
        assert_eq!(lead.status, LeadStatus::CallCompleted);
        assert_eq!(order(&f.engine.snapshot().await), vec!["lead-bob"]);
        f.engine.refresh_leads(false).await.unwrap();
        assert_eq!(order(&f.engine.snapshot().await), vec!["lead-bob"]);
    }

    #[tokio::test]
    async fn test_silent_refresh_retries_then_succeeds() {
        let f = fixture(&["Ada"]).await;
        let before = f.store.lead_list_calls();
        f.store.fail_next_lead_lists(2);
        assert_eq!(f.engine.refresh_leads(true).await.unwrap(), 1);
        assert_eq!(f.store.lead_list_calls() - before, 3);
        assert_eq!(f.engine.lead_refresh_stats().retried(), 2);
    }

    #[tokio::test]
    async fn test_silent_refresh_gives_up_quietly() {
        let f = fixture(&["Ada"]).await;
        f.store.fail_next_lead_lists(3);
        assert_eq!(f.engine.refresh_leads(true).await.unwrap(), 1);
        assert_eq!(f.engine.lead_refresh_stats().abandoned(), 1);
        assert_eq!(f.engine.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_user_refresh_surfaces_error() {
        let f = fixture(&["Ada"]).await;
        f.store.fail_next_lead_lists(1);
        assert!(f.engine.refresh_leads(false).await.is_err());
    }

    #[tokio::test]
    async fn test_overdue_reported_once() {
        let f = fixture(&["Ada"]).await;
        f.engine
            .schedule_or_update("lead-ada", Some(t0() + chrono::Duration::minutes(5)))
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::minutes(6));
        assert_eq!(f.engine.recompute().await, vec!["lead-ada".to_string()]);
        assert!(f.engine.recompute().await.is_empty());
        assert_eq!(f.engine.overdue_leads().await, vec!["lead-ada".to_string()]);
        let p = f.engine.priority_of("lead-ada").await.unwrap();
        assert_eq!(p.status, PriorityStatus::Urgent);
        assert_eq!(p.text, "Overdue: 1 min ago");
    }

    #[tokio::test]
    async fn test_reminder_shown_once_through_sink() {
        let f = fixture(&["Ada"]).await;
        f.engine
            .mark_not_connected("lead-ada", &FixedAnswer(true))
            .await
            .unwrap();
        assert_eq!(f.engine.countdown_tick().await, 0);
        assert_eq!(f.engine.countdown_of("lead-ada").await.as_deref(), Some("2h 0m"));

        f.clock.advance(chrono::Duration::minutes(106));
        assert_eq!(f.engine.countdown_tick().await, 1);
        assert_eq!(f.engine.countdown_tick().await, 0);
        let history = f.router.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Call Ada soon");
    }

    #[tokio::test]
    async fn test_deactivated_engine_ignores_late_results() {
        let f = fixture(&["Ada"]).await;
        f.engine.deactivate();
        f.store
            .create_lead(Lead::new("Late", "+1 555 0999", t0()))
            .await
            .unwrap();
        assert_eq!(f.engine.refresh_leads(false).await.unwrap(), 0);
        assert_eq!(f.engine.snapshot().await.len(), 1);
        assert!(f.engine.recompute().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_lead_validates_input() {
        let f = fixture(&[]).await;
        assert!(matches!(
            f.engine.add_lead(" ", "+1", None).await,
            Err(DialDeskError::Validation(_))
        ));
        let lead = f.engine.add_lead("Grace", "+1 555 0142", None).await.unwrap();
        assert_eq!(order(&f.engine.snapshot().await), vec![lead.id.as_str()]);
    }

    #[tokio::test]
    async fn test_scheduler_loop_ticks_and_shuts_down() {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let mut lead = Lead::new("Ada", "+1 555 0100", t0());
        lead.id = "lead-ada".into();
        store.create_lead(lead).await.unwrap();
        store.insert_call(ScheduledCall::new(
            "lead-ada",
            t0() + chrono::Duration::minutes(90),
            AUTO_SCHEDULE_TAG,
            CallOrigin::Auto,
            t0(),
        ));

        let config = SchedulerConfig {
            tick_ms: 5,
            ..test_config()
        };
        let engine = Arc::new(WorklistEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(NotifyRouter::new(clock.clone())),
            clock,
            config,
            LeadFilter::default(),
        ));
        engine.start().await.unwrap();

        let handle = spawn_scheduler(engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.countdown_of("lead-ada").await.as_deref(), Some("1h 30m"));

        handle.shutdown().await;
        assert!(!engine.is_active());
    }

    #[test]
    fn test_ticks_between() {
        assert_eq!(ticks_between(10_000, 1000), 10);
        assert_eq!(ticks_between(120_000, 1000), 120);
        assert_eq!(ticks_between(500, 1000), 1);
        assert_eq!(ticks_between(1000, 0), 1000);
    }
}

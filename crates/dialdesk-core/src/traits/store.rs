//! Store traits: the engine only reads and writes through these.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CallOrigin, Lead, LeadFilter, LeadStatus, ScheduledCall};

/// Owner of lead records.
#[async_trait]
pub trait LeadStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    async fn create_lead(&self, lead: Lead) -> Result<Lead>;

    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<()>;

    /// Mark the lead's call completed; it leaves the active worklist.
    async fn complete_call(&self, id: &str) -> Result<Lead>;
}

/// Owner of scheduled-call records.
#[async_trait]
pub trait ScheduledCallStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<ScheduledCall>>;

    async fn create(
        &self,
        lead_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
    ) -> Result<ScheduledCall>;

    async fn update(&self, id: &str, time: DateTime<Utc>, notes: &str) -> Result<ScheduledCall>;

    async fn delete(&self, id: &str) -> Result<()>;
}

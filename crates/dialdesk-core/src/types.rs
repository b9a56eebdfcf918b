//! Lead and scheduled-call data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notes written on every call created by the auto-escalation trigger.
pub const AUTO_SCHEDULE_TAG: &str = "Auto-scheduled after call not connected";
/// Notes written when an operator moves an auto-generated call.
pub const AUTO_SCHEDULE_UPDATED_TAG: &str = "Auto-scheduled after call not connected (updated)";

/// Fixed status vocabulary for a lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Connected,
    NotConnected,
    CallCompleted,
    Qualified,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Connected => "connected",
            LeadStatus::NotConnected => "not_connected",
            LeadStatus::CallCompleted => "call_completed",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Lost => "lost",
        }
    }

    /// Leads in this status are no longer part of the active worklist.
    pub fn is_closed(&self) -> bool {
        matches!(self, LeadStatus::CallCompleted | LeadStatus::Lost)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = crate::error::DialDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "connected" => Ok(LeadStatus::Connected),
            "not_connected" => Ok(LeadStatus::NotConnected),
            "call_completed" => Ok(LeadStatus::CallCompleted),
            "qualified" => Ok(LeadStatus::Qualified),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(crate::error::DialDeskError::Validation(format!(
                "unknown lead status '{other}'"
            ))),
        }
    }
}

/// A prospective contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub status: LeadStatus,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl Lead {
    pub fn new(name: &str, phone: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("lead-{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            phone: phone.to_string(),
            status: LeadStatus::New,
            notes: String::new(),
            created_at: now,
            assigned_to: None,
        }
    }
}

/// Lifecycle of a scheduled call. Only `Pending` takes part in priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Completed,
    Cancelled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Completed => "completed",
            CallStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => CallStatus::Completed,
            // no-show is stored as cancelled
            "cancelled" | "no_show" => CallStatus::Cancelled,
            _ => CallStatus::Pending,
        }
    }
}

/// Who created a scheduled call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallOrigin {
    #[default]
    Manual,
    Auto,
}

impl CallOrigin {
    /// Recover the origin of a record that only carries notes.
    pub fn from_notes(notes: &str) -> Self {
        let notes = notes.trim();
        if notes == AUTO_SCHEDULE_TAG || notes == AUTO_SCHEDULE_UPDATED_TAG {
            CallOrigin::Auto
        } else {
            CallOrigin::Manual
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallOrigin::Manual => "manual",
            CallOrigin::Auto => "auto",
        }
    }
}

/// A call appointment tied to a lead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledCall {
    pub id: String,
    pub lead_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: CallStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub origin: CallOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledCall {
    pub fn new(
        lead_id: &str,
        scheduled_time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("call-{}", uuid::Uuid::new_v4().simple()),
            lead_id: lead_id.to_string(),
            scheduled_time,
            status: CallStatus::Pending,
            notes: notes.to_string(),
            origin,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == CallStatus::Pending
    }

    pub fn is_auto(&self) -> bool {
        self.origin == CallOrigin::Auto
    }
}

/// Selection passed to `LeadStore::list_leads`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadFilter {
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub include_completed: bool,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        if !self.include_completed && lead.status.is_closed() {
            return false;
        }
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        match &self.assigned_to {
            Some(who) => lead.assigned_to.as_deref() == Some(who.as_str()),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_from_notes() {
        assert_eq!(CallOrigin::from_notes(AUTO_SCHEDULE_TAG), CallOrigin::Auto);
        assert_eq!(
            CallOrigin::from_notes(AUTO_SCHEDULE_UPDATED_TAG),
            CallOrigin::Auto
        );
        assert_eq!(CallOrigin::from_notes("call about pricing"), CallOrigin::Manual);
        assert_eq!(CallOrigin::from_notes(""), CallOrigin::Manual);
    }

    #[test]
    fn test_lead_status_parse() {
        assert_eq!("not-connected".parse::<LeadStatus>().unwrap(), LeadStatus::NotConnected);
        assert_eq!("Connected".parse::<LeadStatus>().unwrap(), LeadStatus::Connected);
        assert!("bogus".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn test_filter_hides_completed_by_default() {
        let mut lead = Lead::new("Ada", "+1 555 0100", Utc::now());
        let filter = LeadFilter::default();
        assert!(filter.matches(&lead));
        lead.status = LeadStatus::CallCompleted;
        assert!(!filter.matches(&lead));
        let all = LeadFilter {
            include_completed: true,
            ..Default::default()
        };
        assert!(all.matches(&lead));
    }

    #[test]
    fn test_filter_by_assignee() {
        let mut lead = Lead::new("Grace", "+1 555 0101", Utc::now());
        lead.assigned_to = Some("op-1".into());
        let filter = LeadFilter {
            assigned_to: Some("op-2".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&lead));
    }
}

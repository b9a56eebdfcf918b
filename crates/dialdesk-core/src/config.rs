//! DialDesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DialDeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DialDeskConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub worklist: WorklistConfig,
}

impl DialDeskConfig {
    /// Load config from the default path (~/.dialdesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DialDeskError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| DialDeskError::Config(format!("Failed to parse config: {e}")))?;
        config.scheduler.validate()?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| DialDeskError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the DialDesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dialdesk")
    }
}

/// Timing knobs for the refresh scheduler and the priority rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Countdown cadence.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Scheduled-call re-poll and overdue detection.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Silent lead-list refresh.
    #[serde(default = "default_lead_refresh_secs")]
    pub lead_refresh_secs: u64,
    #[serde(default = "default_lead_refresh_retries")]
    pub lead_refresh_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How far out a not-connected follow-up lands.
    #[serde(default = "default_escalation_delay_mins")]
    pub escalation_delay_mins: i64,
    /// Calls due within this window are "soon".
    #[serde(default = "default_soon_window_mins")]
    pub soon_window_mins: i64,
    /// Reminder fires once the remaining time drops to this.
    #[serde(default = "default_reminder_window_mins")]
    pub reminder_window_mins: i64,
}

/// Upper bound for every minute-valued window: one week.
pub const MAX_WINDOW_MINS: i64 = 7 * 24 * 60;

fn default_tick_ms() -> u64 { 1000 }
fn default_refresh_secs() -> u64 { 10 }
fn default_lead_refresh_secs() -> u64 { 120 }
fn default_lead_refresh_retries() -> u32 { 2 }
fn default_retry_delay_ms() -> u64 { 2000 }
fn default_escalation_delay_mins() -> i64 { 120 }
fn default_soon_window_mins() -> i64 { 30 }
fn default_reminder_window_mins() -> i64 { 15 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            refresh_secs: default_refresh_secs(),
            lead_refresh_secs: default_lead_refresh_secs(),
            lead_refresh_retries: default_lead_refresh_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            escalation_delay_mins: default_escalation_delay_mins(),
            soon_window_mins: default_soon_window_mins(),
            reminder_window_mins: default_reminder_window_mins(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(DialDeskError::Config("scheduler.tick_ms must be > 0".into()));
        }
        // overdue detection must never lag the clock by more than 10s
        if self.refresh_secs == 0 || self.refresh_secs > 10 {
            return Err(DialDeskError::Config(
                "scheduler.refresh_secs must be between 1 and 10".into(),
            ));
        }
        if self.lead_refresh_secs == 0 {
            return Err(DialDeskError::Config(
                "scheduler.lead_refresh_secs must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("escalation_delay_mins", self.escalation_delay_mins),
            ("soon_window_mins", self.soon_window_mins),
            ("reminder_window_mins", self.reminder_window_mins),
        ] {
            if !(0..=MAX_WINDOW_MINS).contains(&value) {
                return Err(DialDeskError::Config(format!(
                    "scheduler.{name} must be between 0 and {MAX_WINDOW_MINS}"
                )));
            }
        }
        // the follow-up must be booked before its reminder window opens
        if self.escalation_delay_mins <= self.reminder_window_mins {
            return Err(DialDeskError::Config(
                "scheduler.escalation_delay_mins must be greater than reminder_window_mins".into(),
            ));
        }
        Ok(())
    }
}

/// Where the SQLite store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.dialdesk/dialdesk.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StoreConfig {
    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).to_string())
    }
}

/// HTTP gateway binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 3300 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Reminder delivery targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "bool_true")]
    pub log: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

fn bool_true() -> bool { true }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: true,
            webhook_url: None,
            discord_webhook_url: None,
        }
    }
}

/// Which leads make up this operator's worklist.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorklistConfig {
    #[serde(default)]
    pub assigned_to: Option<String>,
}

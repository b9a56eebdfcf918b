//! SQLite-backed lead and scheduled-call store.
//! One database file holds both tables; survives restarts.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dialdesk_core::traits::{LeadStore, ScheduledCallStore};
use dialdesk_core::{
    CallOrigin, CallStatus, Clock, DialDeskError, Lead, LeadFilter, LeadStatus, Result,
    ScheduledCall,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

fn db_err(e: rusqlite::Error) -> DialDeskError {
    DialDeskError::Store(format!("sqlite: {e}"))
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<Lead> {
    let status: String = row.get(3)?;
    Ok(Lead {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        status: status.parse().unwrap_or(LeadStatus::New),
        notes: row.get(4)?,
        created_at: parse_ts(row, 5)?,
        assigned_to: row.get(6)?,
    })
}

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledCall> {
    let status: String = row.get(3)?;
    let notes: String = row.get(4)?;
    let origin: Option<String> = row.get(5)?;
    // rows imported from note-only stores carry no origin
    let origin = match origin.as_deref() {
        Some("auto") => CallOrigin::Auto,
        Some("manual") => CallOrigin::Manual,
        _ => CallOrigin::from_notes(&notes),
    };
    Ok(ScheduledCall {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        scheduled_time: parse_ts(row, 2)?,
        status: CallStatus::parse(&status),
        notes,
        origin,
        created_at: parse_ts(row, 6)?,
        updated_at: parse_ts(row, 7)?,
    })
}

const CALL_COLUMNS: &str =
    "id, lead_id, scheduled_time, status, notes, origin, created_at, updated_at";

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn, clock)
    }

    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    fn migrate(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                notes TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                assigned_to TEXT
            );

            CREATE TABLE IF NOT EXISTS scheduled_calls (
                id TEXT PRIMARY KEY,
                lead_id TEXT NOT NULL,
                scheduled_time TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                notes TEXT NOT NULL DEFAULT '',
                origin TEXT,                    -- 'manual' | 'auto'; NULL for legacy rows
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_calls_lead ON scheduled_calls(lead_id, scheduled_time);
            ",
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DialDeskError::Store("sqlite connection lock poisoned".into()))
    }

    fn load_call(conn: &Connection, id: &str) -> Result<Option<ScheduledCall>> {
        conn.query_row(
            &format!("SELECT {CALL_COLUMNS} FROM scheduled_calls WHERE id = ?1"),
            params![id],
            call_from_row,
        )
        .optional()
        .map_err(db_err)
    }

    fn load_lead(conn: &Connection, id: &str) -> Result<Option<Lead>> {
        conn.query_row(
            "SELECT id, name, phone, status, notes, created_at, assigned_to FROM leads WHERE id = ?1",
            params![id],
            lead_from_row,
        )
        .optional()
        .map_err(db_err)
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, phone, status, notes, created_at, assigned_to
                 FROM leads ORDER BY created_at, id",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], lead_from_row).map_err(db_err)?;
        let mut leads = Vec::new();
        for lead in rows {
            let lead = lead.map_err(db_err)?;
            if filter.matches(&lead) {
                leads.push(lead);
            }
        }
        Ok(leads)
    }

    async fn create_lead(&self, lead: Lead) -> Result<Lead> {
        self.conn()?
            .execute(
                "INSERT INTO leads (id, name, phone, status, notes, created_at, assigned_to)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    lead.id,
                    lead.name,
                    lead.phone,
                    lead.status.as_str(),
                    lead.notes,
                    ts(lead.created_at),
                    lead.assigned_to,
                ],
            )
            .map_err(db_err)?;
        Ok(lead)
    }

    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE leads SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DialDeskError::NotFound(format!("lead {id}")));
        }
        Ok(())
    }

    async fn complete_call(&self, id: &str) -> Result<Lead> {
        let now = ts(self.clock.now());
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        let changed = tx
            .execute(
                "UPDATE leads SET status = ?1 WHERE id = ?2",
                params![LeadStatus::CallCompleted.as_str(), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DialDeskError::NotFound(format!("lead {id}")));
        }
        tx.execute(
            "UPDATE scheduled_calls SET status = 'completed', updated_at = ?1
             WHERE lead_id = ?2 AND status = 'pending'",
            params![now, id],
        )
        .map_err(db_err)?;
        let lead = Self::load_lead(&tx, id)?
            .ok_or_else(|| DialDeskError::NotFound(format!("lead {id}")))?;
        tx.commit().map_err(db_err)?;
        Ok(lead)
    }
}

#[async_trait]
impl ScheduledCallStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn list_by_lead(&self, lead_id: &str) -> Result<Vec<ScheduledCall>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CALL_COLUMNS} FROM scheduled_calls
                 WHERE lead_id = ?1 ORDER BY scheduled_time, created_at, id"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![lead_id], call_from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn create(
        &self,
        lead_id: &str,
        time: DateTime<Utc>,
        notes: &str,
        origin: CallOrigin,
    ) -> Result<ScheduledCall> {
        let call = ScheduledCall::new(lead_id, time, notes, origin, self.clock.now());
        self.conn()?
            .execute(
                "INSERT INTO scheduled_calls
                 (id, lead_id, scheduled_time, status, notes, origin, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    call.id,
                    call.lead_id,
                    ts(call.scheduled_time),
                    call.status.as_str(),
                    call.notes,
                    call.origin.as_str(),
                    ts(call.created_at),
                    ts(call.updated_at),
                ],
            )
            .map_err(db_err)?;
        Ok(call)
    }

    async fn update(&self, id: &str, time: DateTime<Utc>, notes: &str) -> Result<ScheduledCall> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE scheduled_calls SET scheduled_time = ?1, notes = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![ts(time), notes, ts(self.clock.now()), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DialDeskError::NotFound(format!("scheduled call {id}")));
        }
        Self::load_call(&conn, id)?
            .ok_or_else(|| DialDeskError::NotFound(format!("scheduled call {id}")))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let changed = self
            .conn()?
            .execute("DELETE FROM scheduled_calls WHERE id = ?1", params![id])
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DialDeskError::NotFound(format!("scheduled call {id}")));
        }
        Ok(())
    }
}

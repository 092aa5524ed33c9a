//! Audit log and automation run log

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, AuditEntry, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::{AutomationRun, PhaseOutcome, RunStatus};

fn row_to_run(row: &Row) -> rusqlite::Result<AutomationRun> {
    let status: String = row.get(2)?;
    let phases: String = row.get(3)?;
    let started_at: String = row.get(5)?;
    let finished_at: Option<String> = row.get(6)?;
    Ok(AutomationRun {
        id: row.get(0)?,
        trigger: row.get(1)?,
        status: status.parse().unwrap_or(RunStatus::Failed),
        // A run whose phase log cannot be read still lists
        phases: serde_json::from_str(&phases).unwrap_or_default(),
        error: row.get(4)?,
        started_at: parse_datetime(&started_at),
        finished_at: finished_at.as_deref().map(parse_datetime),
    })
}

impl Database {
    /// Log an audit entry
    pub fn log_audit(
        &self,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO audit_log (timestamp, actor, action, entity_type, entity_id, details)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![sql_timestamp(at), actor, action, entity_type, entity_id, details],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List audit log entries, newest first
    pub fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, timestamp, actor, action, entity_type, entity_id, details
            FROM audit_log
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                let ts: String = row.get(1)?;
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: parse_datetime(&ts),
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    entity_type: row.get(4)?,
                    entity_id: row.get(5)?,
                    details: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Open a run-log row in `running` state
    pub fn start_automation_run(&self, trigger: &str, now: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO automation_runs (triggered_by, status, started_at) VALUES (?, 'running', ?)",
            params![trigger, sql_timestamp(now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Record the terminal state of a run
    pub fn finish_automation_run(
        &self,
        id: i64,
        status: RunStatus,
        phases: &[PhaseOutcome],
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let phases = serde_json::to_string(phases)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE automation_runs SET status = ?, phases = ?, error = ?, finished_at = ?
            WHERE id = ?
            "#,
            params![status.as_str(), phases, error, sql_timestamp(now), id],
        )?;
        Ok(())
    }

    pub fn get_automation_run(&self, id: i64) -> Result<Option<AutomationRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                r#"
                SELECT id, triggered_by, status, phases, error, started_at, finished_at
                FROM automation_runs WHERE id = ?
                "#,
                params![id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent runs first
    pub fn list_automation_runs(&self, limit: i64) -> Result<Vec<AutomationRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, triggered_by, status, phases, error, started_at, finished_at
            FROM automation_runs
            ORDER BY started_at DESC, id DESC
            LIMIT ?
            "#,
        )?;
        let runs = stmt
            .query_map(params![limit], row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}

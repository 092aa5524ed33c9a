//! Dispute and legal deadline operations

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{format_date, parse_date, Database};
use crate::error::Result;
use crate::models::{Dispute, DisputeStatus, LegalDeadline};

fn row_to_dispute(row: &Row) -> rusqlite::Result<Dispute> {
    let status: String = row.get(3)?;
    let next_action_date: Option<String> = row.get(5)?;
    Ok(Dispute {
        id: row.get(0)?,
        obligation_id: row.get(1)?,
        title: row.get(2)?,
        status: status.parse().unwrap_or(DisputeStatus::Open),
        next_action: row.get(4)?,
        next_action_date: parse_date(next_action_date),
    })
}

impl Database {
    /// Open a dispute, optionally against an obligation
    pub fn insert_dispute(
        &self,
        obligation_id: Option<i64>,
        title: &str,
        next_action: Option<&str>,
        next_action_date: Option<NaiveDate>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO disputes (obligation_id, title, status, next_action, next_action_date)
            VALUES (?, ?, 'open', ?, ?)
            "#,
            params![
                obligation_id,
                title,
                next_action,
                next_action_date.map(format_date)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Open disputes, soonest next action first
    pub fn list_open_disputes(&self) -> Result<Vec<Dispute>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, obligation_id, title, status, next_action, next_action_date
            FROM disputes
            WHERE status = 'open'
            ORDER BY next_action_date IS NULL, next_action_date, id
            "#,
        )?;
        let disputes = stmt
            .query_map([], row_to_dispute)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(disputes)
    }

    pub fn resolve_dispute(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE disputes SET status = 'resolved' WHERE id = ? AND status = 'open'",
            params![id],
        )?;
        Ok(n > 0)
    }

    /// Track a legal deadline
    pub fn insert_legal_deadline(
        &self,
        title: &str,
        case_ref: Option<&str>,
        deadline_date: NaiveDate,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO legal_deadlines (title, case_ref, deadline_date) VALUES (?, ?, ?)",
            params![title, case_ref, format_date(deadline_date)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Incomplete legal deadlines, soonest first
    pub fn list_pending_legal_deadlines(&self) -> Result<Vec<LegalDeadline>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, case_ref, deadline_date, completed
            FROM legal_deadlines
            WHERE completed = 0
            ORDER BY deadline_date, id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                let date: Option<String> = row.get(3)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    parse_date(date),
                    row.get::<_, bool>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Rows with an unreadable date cannot be scheduled against
        Ok(rows
            .into_iter()
            .filter_map(|(id, title, case_ref, date, completed)| {
                Some(LegalDeadline {
                    id,
                    title,
                    case_ref,
                    deadline_date: date?,
                    completed,
                })
            })
            .collect())
    }

    pub fn complete_legal_deadline(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE legal_deadlines SET completed = 1 WHERE id = ?",
            params![id],
        )?;
        Ok(n > 0)
    }
}

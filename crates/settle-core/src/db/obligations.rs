//! Obligation operations

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, Row};

use super::{format_date, parse_date, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::{NewObligation, Obligation, ObligationCategory, ObligationStatus, Recurrence};
use crate::money::Money;

/// Rows per batched urgency update (each row binds two parameters)
const URGENCY_BATCH: usize = 200;

const OBLIGATION_COLUMNS: &str = "id, account_id, category, payee, amount_due, amount_minimum, \
     due_date, recurrence, recurrence_day, status, auto_pay, negotiable, late_fee, \
     grace_period_days, urgency_score, escalation_type, credit_impact_score, preferred_account_id";

fn row_to_obligation(row: &Row) -> rusqlite::Result<Obligation> {
    let category: String = row.get(2)?;
    let amount_due: Option<f64> = row.get(4)?;
    let amount_minimum: Option<f64> = row.get(5)?;
    let due_date: Option<String> = row.get(6)?;
    let recurrence: Option<String> = row.get(7)?;
    let recurrence_day: Option<i64> = row.get(8)?;
    let status: String = row.get(9)?;
    let late_fee: Option<f64> = row.get(12)?;
    let grace: Option<i64> = row.get(13)?;
    let urgency: Option<i64> = row.get(14)?;
    let credit_impact: Option<i64> = row.get(16)?;

    Ok(Obligation {
        id: row.get(0)?,
        account_id: row.get(1)?,
        category: category.parse().unwrap_or(ObligationCategory::Other),
        payee: row.get(3)?,
        amount_due: amount_due.map(Money::from_dollars),
        amount_minimum: amount_minimum.map(Money::from_dollars),
        due_date: parse_date(due_date),
        recurrence: recurrence
            .and_then(|r| r.parse().ok())
            .unwrap_or(Recurrence::OneTime),
        recurrence_day: recurrence_day
            .filter(|d| (1..=31).contains(d))
            .map(|d| d as u32),
        status: status.parse().unwrap_or(ObligationStatus::Pending),
        auto_pay: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
        negotiable: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
        late_fee: Money::from_dollars(late_fee.unwrap_or(0.0)),
        grace_period_days: grace.unwrap_or(0),
        urgency_score: urgency.unwrap_or(0).clamp(0, 100) as u8,
        escalation_type: row.get(15)?,
        credit_impact_score: credit_impact.unwrap_or(0),
        preferred_account_id: row.get(17)?,
    })
}

impl Database {
    /// Insert a new pending obligation
    pub fn insert_obligation(&self, ob: &NewObligation) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO obligations (
                account_id, category, payee, amount_due, amount_minimum, due_date,
                recurrence, recurrence_day, status, auto_pay, negotiable, late_fee,
                grace_period_days, escalation_type, credit_impact_score, preferred_account_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                ob.account_id,
                ob.category.as_str(),
                ob.payee,
                ob.amount_due.map(Money::to_dollars),
                ob.amount_minimum.map(Money::to_dollars),
                ob.due_date.map(format_date),
                ob.recurrence.as_str(),
                ob.recurrence_day,
                ob.auto_pay,
                ob.negotiable,
                ob.late_fee.to_dollars(),
                ob.grace_period_days,
                ob.escalation_type,
                ob.credit_impact_score,
                ob.preferred_account_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get an obligation by ID
    pub fn get_obligation(&self, id: i64) -> Result<Option<Obligation>> {
        let conn = self.conn()?;
        let ob = conn
            .query_row(
                &format!("SELECT {} FROM obligations WHERE id = ?", OBLIGATION_COLUMNS),
                params![id],
                row_to_obligation,
            )
            .ok();
        Ok(ob)
    }

    /// List obligations, optionally filtered by status
    pub fn list_obligations(&self, status: Option<ObligationStatus>) -> Result<Vec<Obligation>> {
        let conn = self.conn()?;
        let obligations = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM obligations WHERE status = ? ORDER BY due_date, id",
                    OBLIGATION_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_str()], row_to_obligation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM obligations ORDER BY due_date, id",
                    OBLIGATION_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_obligation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(obligations)
    }

    /// Pending and overdue obligations
    pub fn list_open_obligations(&self) -> Result<Vec<Obligation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM obligations WHERE status IN ('pending', 'overdue') ORDER BY due_date, id",
            OBLIGATION_COLUMNS
        ))?;
        let obligations = stmt
            .query_map([], row_to_obligation)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(obligations)
    }

    /// Write cached urgency scores in batches of CASE updates
    pub fn update_urgency_scores(&self, scores: &[(i64, u8)], now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let now = sql_timestamp(now);
        let mut updated = 0;

        for chunk in scores.chunks(URGENCY_BATCH) {
            let cases = "WHEN ? THEN ? ".repeat(chunk.len());
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "UPDATE obligations SET urgency_score = CASE id {}END, updated_at = ? WHERE id IN ({})",
                cases, placeholders
            );

            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 3 + 1);
            for (id, score) in chunk {
                values.push((*id).into());
                values.push(i64::from(*score).into());
            }
            values.push(now.clone().into());
            for (id, _) in chunk {
                values.push((*id).into());
            }

            updated += conn.execute(&sql, params_from_iter(values))?;
        }

        Ok(updated)
    }

    /// Flip pending obligations whose due date has passed to overdue in one statement
    pub fn mark_overdue(&self, today: NaiveDate, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"
            UPDATE obligations SET status = 'overdue', updated_at = ?
            WHERE status = 'pending'
              AND date(due_date) IS NOT NULL
              AND date(due_date) < ?
            "#,
            params![sql_timestamp(now), format_date(today)],
        )?;
        Ok(n)
    }

    /// Mark an obligation paid and zero its urgency
    pub fn mark_obligation_paid(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE obligations SET status = 'paid', urgency_score = 0, updated_at = ? WHERE id = ?",
            params![sql_timestamp(now), id],
        )?;
        Ok(n > 0)
    }

    /// Defer an open obligation. Returns false if it is not pending or overdue.
    pub fn defer_obligation(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"
            UPDATE obligations SET status = 'deferred', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'overdue')
            "#,
            params![sql_timestamp(now), id],
        )?;
        Ok(n > 0)
    }

    /// Mark an obligation disputed
    pub fn dispute_obligation(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"
            UPDATE obligations SET status = 'disputed', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'overdue')
            "#,
            params![sql_timestamp(now), id],
        )?;
        Ok(n > 0)
    }
}

//! Decision feedback and outcome operations
//!
//! Feedback rows are append-only: one decision per recommendation, enforced
//! by a unique index. Outcomes attach to a decision after the fact and do
//! not influence confidence.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::{Decision, DecisionCounts, DecisionFeedback, OutcomeStatus, RecStatus, RecType};

const FEEDBACK_COLUMNS: &str = "f.id, f.recommendation_id, f.rec_type, f.payee, f.decision, \
     f.confidence_at_decision, f.decided_at, \
     (SELECT o.outcome_status FROM decision_outcomes o WHERE o.feedback_id = f.id \
      ORDER BY o.recorded_at DESC, o.id DESC LIMIT 1)";

fn row_to_feedback(row: &Row) -> rusqlite::Result<DecisionFeedback> {
    let rec_type: String = row.get(2)?;
    let decision: String = row.get(4)?;
    let decided_at: String = row.get(6)?;
    let outcome: Option<String> = row.get(7)?;
    Ok(DecisionFeedback {
        id: row.get(0)?,
        recommendation_id: row.get(1)?,
        rec_type: rec_type.parse().unwrap_or(RecType::Warning),
        payee: row.get(3)?,
        decision: decision.parse().unwrap_or(Decision::Deferred),
        confidence_at_decision: row.get(5)?,
        outcome_status: outcome.and_then(|o| o.parse().ok()),
        decided_at: parse_datetime(&decided_at),
    })
}

impl Database {
    /// Close an active recommendation and append its decision in one transaction.
    ///
    /// Returns None when the recommendation is not active (already decided,
    /// expired or missing), leaving nothing written.
    pub fn record_decision(
        &self,
        recommendation_id: i64,
        decision: Decision,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<(i64, RecStatus)>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = sql_timestamp(now);
        let status = decision.resulting_status();

        let closed = tx.execute(
            r#"
            UPDATE recommendations SET status = ?, decided_at = ?
            WHERE id = ? AND status = 'active'
            "#,
            params![status.as_str(), now, recommendation_id],
        )?;
        if closed == 0 {
            return Ok(None);
        }

        tx.execute(
            r#"
            INSERT INTO decision_feedback (
                recommendation_id, rec_type, payee, decision, confidence_at_decision, decided_at
            )
            SELECT id, rec_type, payee, ?, ?, ? FROM recommendations WHERE id = ?
            "#,
            params![decision.as_str(), confidence, now, recommendation_id],
        )?;
        let feedback_id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some((feedback_id, status)))
    }

    /// Approved and rejected decisions for a type since `since`, optionally for one payee
    pub fn decision_counts(
        &self,
        rec_type: RecType,
        payee: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<DecisionCounts> {
        let conn = self.conn()?;
        let (approved, rejected): (i64, i64) = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN decision = 'approved' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN decision = 'rejected' THEN 1 ELSE 0 END), 0)
            FROM decision_feedback
            WHERE rec_type = ? AND decided_at >= ?
              AND (?3 IS NULL OR lower(payee) = lower(?3))
            "#,
            params![rec_type.as_str(), sql_timestamp(since), payee],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(DecisionCounts { approved, rejected })
    }

    /// Append an outcome to a decision. Returns None if the decision does not exist.
    pub fn insert_decision_outcome(
        &self,
        feedback_id: i64,
        outcome: OutcomeStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM decision_feedback WHERE id = ?",
                params![feedback_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }

        conn.execute(
            r#"
            INSERT INTO decision_outcomes (feedback_id, outcome_status, notes, recorded_at)
            VALUES (?, ?, ?, ?)
            "#,
            params![feedback_id, outcome.as_str(), notes, sql_timestamp(now)],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    /// Get a decision with its latest outcome
    pub fn get_decision_feedback(&self, id: i64) -> Result<Option<DecisionFeedback>> {
        let conn = self.conn()?;
        let fb = conn
            .query_row(
                &format!(
                    "SELECT {} FROM decision_feedback f WHERE f.id = ?",
                    FEEDBACK_COLUMNS
                ),
                params![id],
                row_to_feedback,
            )
            .optional()?;
        Ok(fb)
    }

    /// Most recent decisions first
    pub fn list_decision_feedback(&self, limit: i64) -> Result<Vec<DecisionFeedback>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM decision_feedback f ORDER BY f.decided_at DESC, f.id DESC LIMIT ?",
            FEEDBACK_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], row_to_feedback)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

//! Recommendation operations

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::clock::sql_timestamp;
use crate::config::DedupKey;
use crate::error::Result;
use crate::models::{NewRecommendation, RecStatus, RecType, Recommendation};
use crate::money::Money;

const RECOMMENDATION_COLUMNS: &str = "id, rec_type, priority, title, reasoning, action, \
     obligation_id, dispute_id, legal_deadline_id, payee, estimated_savings, confidence, \
     dedup_key, status, created_at";

fn row_to_recommendation(row: &Row) -> rusqlite::Result<Recommendation> {
    let rec_type: String = row.get(1)?;
    let priority: i64 = row.get(2)?;
    let savings: f64 = row.get(10)?;
    let status: String = row.get(13)?;
    let created_at: String = row.get(14)?;
    Ok(Recommendation {
        id: row.get(0)?,
        rec_type: rec_type.parse().unwrap_or(RecType::Warning),
        priority: priority.clamp(1, 255) as u8,
        title: row.get(3)?,
        reasoning: row.get(4)?,
        action: row.get(5)?,
        obligation_id: row.get(6)?,
        dispute_id: row.get(7)?,
        legal_deadline_id: row.get(8)?,
        payee: row.get(9)?,
        estimated_savings: Money::from_dollars(savings),
        confidence: row.get(11)?,
        dedup_key: row.get(12)?,
        status: status.parse().unwrap_or(RecStatus::Active),
        created_at: parse_datetime(&created_at),
    })
}

impl Database {
    /// Insert an active recommendation
    pub fn insert_recommendation(
        &self,
        rec: &NewRecommendation,
        dedup_key: &str,
        confidence: f64,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO recommendations (
                rec_type, priority, title, reasoning, action, obligation_id, dispute_id,
                legal_deadline_id, payee, estimated_savings, confidence, dedup_key, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?)
            "#,
            params![
                rec.rec_type.as_str(),
                rec.priority,
                rec.title,
                rec.reasoning,
                rec.action,
                rec.obligation_id,
                rec.dispute_id,
                rec.legal_deadline_id,
                rec.payee,
                rec.estimated_savings.to_dollars(),
                confidence,
                dedup_key,
                sql_timestamp(created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Keys of every active recommendation under the given dedup mode, in one query
    pub fn active_recommendation_keys(&self, mode: DedupKey) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let column = match mode {
            DedupKey::Title => "title",
            DedupKey::Content => "dedup_key",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recommendations WHERE status = 'active'",
            column
        ))?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    /// Expire active recommendations created before `cutoff`
    pub fn expire_recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE recommendations SET status = 'expired' WHERE status = 'active' AND created_at < ?",
            params![sql_timestamp(cutoff)],
        )?;
        Ok(n)
    }

    /// Get a recommendation by ID
    pub fn get_recommendation(&self, id: i64) -> Result<Option<Recommendation>> {
        let conn = self.conn()?;
        let rec = conn
            .query_row(
                &format!(
                    "SELECT {} FROM recommendations WHERE id = ?",
                    RECOMMENDATION_COLUMNS
                ),
                params![id],
                row_to_recommendation,
            )
            .ok();
        Ok(rec)
    }

    /// List recommendations by priority, optionally filtered by status
    pub fn list_recommendations(&self, status: Option<RecStatus>) -> Result<Vec<Recommendation>> {
        let conn = self.conn()?;
        let recs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM recommendations WHERE status = ? ORDER BY priority, created_at DESC, id",
                    RECOMMENDATION_COLUMNS
                ))?;
                let rows = stmt.query_map(params![status.as_str()], row_to_recommendation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM recommendations ORDER BY priority, created_at DESC, id",
                    RECOMMENDATION_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_recommendation)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(recs)
    }
}

//! Revenue source operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, parse_date, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::{NewRevenueSource, RevenueCadence, RevenueSource, VerifiedBy};
use crate::money::Money;

const REVENUE_COLUMNS: &str = "id, source, description, counterparty, account_id, amount, cadence, \
     confidence, verified_by, occurrences, next_expected_date, active";

fn row_to_revenue_source(row: &Row) -> rusqlite::Result<RevenueSource> {
    let amount: f64 = row.get(5)?;
    let cadence: String = row.get(6)?;
    let verified_by: String = row.get(8)?;
    let next_expected: Option<String> = row.get(10)?;
    Ok(RevenueSource {
        id: row.get(0)?,
        source: row.get(1)?,
        description: row.get(2)?,
        counterparty: row.get(3)?,
        account_id: row.get(4)?,
        amount: Money::from_dollars(amount),
        cadence: cadence.parse().unwrap_or(RevenueCadence::Irregular),
        confidence: row.get(7)?,
        verified_by: verified_by.parse().unwrap_or(VerifiedBy::Manual),
        occurrences: row.get(9)?,
        next_expected_date: parse_date(next_expected),
        active: row.get(11)?,
    })
}

impl Database {
    /// Find a revenue source by its upsert key
    pub fn find_revenue_source(
        &self,
        source: &str,
        counterparty: &str,
        account_id: Option<i64>,
    ) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                r#"
                SELECT id FROM revenue_sources
                WHERE source = ? AND counterparty = ? AND account_id IS ?
                "#,
                params![source, counterparty, account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Insert a revenue source
    pub fn insert_revenue_source(&self, rs: &NewRevenueSource, now: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn()?;
        let now = sql_timestamp(now);
        conn.execute(
            r#"
            INSERT INTO revenue_sources (
                source, description, counterparty, account_id, amount, cadence, confidence,
                verified_by, occurrences, next_expected_date, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                rs.source,
                rs.description,
                rs.counterparty,
                rs.account_id,
                rs.amount.to_dollars(),
                rs.cadence.as_str(),
                rs.confidence,
                rs.verified_by.as_str(),
                rs.occurrences,
                rs.next_expected_date.map(format_date),
                now,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Refresh the measured fields of an existing source.
    ///
    /// Leaves description, verification and the active flag alone.
    pub fn update_revenue_measurements(
        &self,
        id: i64,
        rs: &NewRevenueSource,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            r#"
            UPDATE revenue_sources
            SET amount = ?, cadence = ?, confidence = ?, occurrences = ?,
                next_expected_date = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                rs.amount.to_dollars(),
                rs.cadence.as_str(),
                rs.confidence,
                rs.occurrences,
                rs.next_expected_date.map(format_date),
                sql_timestamp(now),
                id,
            ],
        )?;
        Ok(n > 0)
    }

    /// List revenue sources, highest confidence first
    pub fn list_revenue_sources(&self, active_only: bool) -> Result<Vec<RevenueSource>> {
        let conn = self.conn()?;
        let sql = if active_only {
            format!(
                "SELECT {} FROM revenue_sources WHERE active = 1 ORDER BY confidence DESC, id",
                REVENUE_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM revenue_sources ORDER BY confidence DESC, id",
                REVENUE_COLUMNS
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let sources = stmt
            .query_map([], row_to_revenue_source)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Enable or disable a revenue source for planning
    pub fn set_revenue_source_active(&self, id: i64, active: bool) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE revenue_sources SET active = ? WHERE id = ?",
            params![active, id],
        )?;
        Ok(n > 0)
    }
}

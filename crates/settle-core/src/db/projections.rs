//! Cash-flow projection storage

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;

use super::{format_date, parse_date, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::ProjectionPoint;
use crate::money::Money;

impl Database {
    /// Replace the stored forecast.
    ///
    /// Purges points generated more than a day before `now`, then upserts the
    /// new points by date. Returns the number of points written.
    pub fn replace_projections(&self, points: &[ProjectionPoint], now: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let generated_at = sql_timestamp(now);

        let purged = tx.execute(
            "DELETE FROM projections WHERE generated_at < ?",
            params![sql_timestamp(now - Duration::days(1))],
        )?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO projections (
                    projection_date, day_index, inflow, outflow, balance, confidence, generated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(projection_date) DO UPDATE SET
                    day_index = excluded.day_index,
                    inflow = excluded.inflow,
                    outflow = excluded.outflow,
                    balance = excluded.balance,
                    confidence = excluded.confidence,
                    generated_at = excluded.generated_at
                "#,
            )?;
            for p in points {
                stmt.execute(params![
                    format_date(p.projection_date),
                    p.day_index,
                    p.inflow.to_dollars(),
                    p.outflow.to_dollars(),
                    p.balance.to_dollars(),
                    p.confidence,
                    generated_at,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(purged, written = points.len(), "Projections replaced");
        Ok(points.len())
    }

    /// Stored forecast points in date order
    pub fn list_projections(&self) -> Result<Vec<ProjectionPoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT projection_date, day_index, inflow, outflow, balance, confidence
            FROM projections
            ORDER BY projection_date
            "#,
        )?;
        let points = stmt
            .query_map([], |row| {
                let date: Option<String> = row.get(0)?;
                Ok((
                    parse_date(date),
                    row.get::<_, i64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(points
            .into_iter()
            .filter_map(|(date, day_index, inflow, outflow, balance, confidence)| {
                Some(ProjectionPoint {
                    projection_date: date?,
                    day_index,
                    inflow: Money::from_dollars(inflow),
                    outflow: Money::from_dollars(outflow),
                    balance: Money::from_dollars(balance),
                    confidence,
                })
            })
            .collect())
    }
}

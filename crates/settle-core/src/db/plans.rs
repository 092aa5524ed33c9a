//! Payment plan operations

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::info;

use super::{format_date, parse_date, parse_datetime, Database};
use crate::clock::sql_timestamp;
use crate::error::Result;
use crate::models::{ActivationOutcome, PaymentPlan, PlanSimulation, PlanStatus, Strategy};
use crate::money::Money;

const PLAN_COLUMNS: &str = "id, strategy, horizon_days, start_date, starting_balance, \
     ending_balance, lowest_balance, lowest_balance_date, total_inflows, total_outflows, \
     late_fees_avoided, late_fees_risked, schedule, warnings, revenue_summary, status, \
     created_at, activated_at";

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_plan(row: &Row) -> rusqlite::Result<PaymentPlan> {
    let strategy: String = row.get(1)?;
    let start_date: Option<String> = row.get(3)?;
    let lowest_date: Option<String> = row.get(7)?;
    let schedule: String = row.get(12)?;
    let warnings: String = row.get(13)?;
    let revenue_summary: String = row.get(14)?;
    let status: String = row.get(15)?;
    let created_at: String = row.get(16)?;
    let activated_at: Option<String> = row.get(17)?;

    let start_date = parse_date(start_date).unwrap_or(NaiveDate::MIN);
    let money = |idx: usize| -> rusqlite::Result<Money> { Ok(Money::from_dollars(row.get(idx)?)) };

    Ok(PaymentPlan {
        id: row.get(0)?,
        status: status.parse().unwrap_or(PlanStatus::Draft),
        created_at: parse_datetime(&created_at),
        activated_at: activated_at.as_deref().map(parse_datetime),
        simulation: PlanSimulation {
            strategy: strategy.parse().unwrap_or(Strategy::Optimal),
            horizon_days: row.get(2)?,
            start_date,
            starting_balance: money(4)?,
            ending_balance: money(5)?,
            lowest_balance: money(6)?,
            lowest_balance_date: parse_date(lowest_date).unwrap_or(start_date),
            total_inflows: money(8)?,
            total_outflows: money(9)?,
            late_fees_avoided: money(10)?,
            late_fees_risked: money(11)?,
            schedule: json_column(12, &schedule)?,
            warnings: json_column(13, &warnings)?,
            revenue_summary: json_column(14, &revenue_summary)?,
        },
    })
}

impl Database {
    /// Persist a simulation as a draft plan
    pub fn insert_payment_plan(&self, plan: &PlanSimulation, now: DateTime<Utc>) -> Result<i64> {
        let schedule = serde_json::to_string(&plan.schedule)?;
        let warnings = serde_json::to_string(&plan.warnings)?;
        let revenue_summary = serde_json::to_string(&plan.revenue_summary)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO payment_plans (
                strategy, horizon_days, start_date, starting_balance, ending_balance,
                lowest_balance, lowest_balance_date, total_inflows, total_outflows,
                late_fees_avoided, late_fees_risked, schedule, warnings, revenue_summary,
                status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'draft', ?)
            "#,
            params![
                plan.strategy.as_str(),
                plan.horizon_days,
                format_date(plan.start_date),
                plan.starting_balance.to_dollars(),
                plan.ending_balance.to_dollars(),
                plan.lowest_balance.to_dollars(),
                format_date(plan.lowest_balance_date),
                plan.total_inflows.to_dollars(),
                plan.total_outflows.to_dollars(),
                plan.late_fees_avoided.to_dollars(),
                plan.late_fees_risked.to_dollars(),
                schedule,
                warnings,
                revenue_summary,
                sql_timestamp(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Activate a draft plan, abandoning whichever plan is currently active.
    ///
    /// Runs as one `BEGIN IMMEDIATE` transaction so concurrent activations
    /// serialize on the write lock; the partial unique index on active
    /// status backs this up in storage.
    pub fn activate_payment_plan(&self, id: i64, now: DateTime<Utc>) -> Result<ActivationOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = sql_timestamp(now);

        let status: Option<String> = tx
            .query_row(
                "SELECT status FROM payment_plans WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match status.map(|s| s.parse::<PlanStatus>()) {
            None => return Ok(ActivationOutcome::NotFound),
            Some(Ok(PlanStatus::Active)) => return Ok(ActivationOutcome::AlreadyActive),
            Some(Ok(PlanStatus::Draft)) => {}
            // Abandoned plans cannot be reactivated
            Some(_) => return Ok(ActivationOutcome::Conflict),
        }

        let previous: Option<i64> = tx
            .query_row(
                "SELECT id FROM payment_plans WHERE status = 'active'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute(
            "UPDATE payment_plans SET status = 'abandoned', abandoned_at = ? WHERE status = 'active'",
            params![now],
        )?;
        let activated = tx.execute(
            "UPDATE payment_plans SET status = 'active', activated_at = ? WHERE id = ? AND status = 'draft'",
            params![now, id],
        )?;
        if activated == 0 {
            return Ok(ActivationOutcome::Conflict);
        }
        tx.commit()?;

        info!(plan_id = id, abandoned = ?previous, "Payment plan activated");
        Ok(ActivationOutcome::Activated {
            abandoned: previous,
        })
    }

    /// Get a plan by ID
    pub fn get_payment_plan(&self, id: i64) -> Result<Option<PaymentPlan>> {
        let conn = self.conn()?;
        let plan = conn
            .query_row(
                &format!("SELECT {} FROM payment_plans WHERE id = ?", PLAN_COLUMNS),
                params![id],
                row_to_plan,
            )
            .optional()?;
        Ok(plan)
    }

    /// The currently active plan, if any
    pub fn get_active_payment_plan(&self) -> Result<Option<PaymentPlan>> {
        let conn = self.conn()?;
        let plan = conn
            .query_row(
                &format!(
                    "SELECT {} FROM payment_plans WHERE status = 'active'",
                    PLAN_COLUMNS
                ),
                [],
                row_to_plan,
            )
            .optional()?;
        Ok(plan)
    }

    /// Most recent plans first
    pub fn list_payment_plans(&self, limit: i64) -> Result<Vec<PaymentPlan>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM payment_plans ORDER BY created_at DESC, id DESC LIMIT ?",
            PLAN_COLUMNS
        ))?;
        let plans = stmt
            .query_map(params![limit], row_to_plan)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(plans)
    }
}

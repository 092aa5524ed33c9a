//! 90-day cash-flow projection
//!
//! A passive forecast: it never decides what to pay. Starting from current
//! checking and savings balances, each day adds a flat share of trailing
//! inflow and subtracts every obligation that recurs on that date.
//! Non-recurring overdue obligations land on day 0.

use chrono::Duration;
use serde::Serialize;
use tracing::info;

use crate::clock::Clock;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Obligation, ProjectionPoint, Recurrence};
use crate::money::Money;
use crate::recurrence;

/// Forecast length in days
pub const HORIZON_DAYS: i64 = 90;

/// Trailing window for the inflow average
const INFLOW_WINDOW_DAYS: i64 = 90;

/// Results of a projection run
#[derive(Debug, Serialize)]
pub struct ProjectionResult {
    pub starting_balance: Money,
    pub ending_balance: Money,
    pub lowest_balance: Money,
    pub lowest_balance_date: chrono::NaiveDate,
    pub daily_inflow: Money,
    pub total_outflows: Money,
    /// The points that were persisted
    pub points: Vec<ProjectionPoint>,
}

/// Confidence decays with forecast distance
pub fn confidence_for_day(day_index: i64) -> f64 {
    if day_index < 30 {
        0.9
    } else if day_index < 60 {
        0.7
    } else {
        0.5
    }
}

/// Days that are written to storage
fn is_persisted(day_index: i64, outflow: Money) -> bool {
    day_index == 0 || day_index % 7 == 0 || !outflow.is_zero() || day_index == HORIZON_DAYS - 1
}

/// Cash-flow projector
pub struct CashFlowProjector<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
}

impl<'a> CashFlowProjector<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self { db, clock }
    }

    /// Build and persist the 90-day forecast
    pub fn generate_projections(&self) -> Result<ProjectionResult> {
        let today = self.clock.today();

        let starting_balance = self.db.cash_balance()?;
        let inflow_total: Money = self
            .db
            .list_inflows_between(today - Duration::days(INFLOW_WINDOW_DAYS), today)?
            .iter()
            .map(|tx| tx.amount)
            .sum();
        let daily_inflow = inflow_total.divide(INFLOW_WINDOW_DAYS);

        let obligations = self.db.list_open_obligations()?;
        let overdue_now: Money = obligations
            .iter()
            .filter(|ob| ob.recurrence == Recurrence::OneTime)
            .filter(|ob| ob.due_date.is_some_and(|d| d < today))
            .map(amount_of)
            .sum();

        let mut balance = starting_balance;
        let mut lowest_balance = starting_balance;
        let mut lowest_balance_date = today;
        let mut total_outflows = Money::ZERO;
        let mut points = Vec::new();

        for day_index in 0..HORIZON_DAYS {
            let date = today + Duration::days(day_index);

            let mut outflow: Money = obligations
                .iter()
                .filter(|ob| recurrence::occurs_on(ob, date))
                .map(amount_of)
                .sum();
            if day_index == 0 {
                outflow += overdue_now;
            }

            balance += daily_inflow;
            balance -= outflow;
            total_outflows += outflow;

            if balance < lowest_balance {
                lowest_balance = balance;
                lowest_balance_date = date;
            }

            if is_persisted(day_index, outflow) {
                points.push(ProjectionPoint {
                    projection_date: date,
                    day_index,
                    inflow: daily_inflow,
                    outflow,
                    balance,
                    confidence: confidence_for_day(day_index),
                });
            }
        }

        self.db.replace_projections(&points, self.clock.now())?;

        info!(
            points = points.len(),
            ending = %balance,
            lowest = %lowest_balance,
            "Cash-flow projection generated"
        );

        Ok(ProjectionResult {
            starting_balance,
            ending_balance: balance,
            lowest_balance,
            lowest_balance_date,
            daily_inflow,
            total_outflows,
            points,
        })
    }
}

fn amount_of(ob: &Obligation) -> Money {
    ob.amount_due.unwrap_or(Money::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_decay() {
        assert_eq!(confidence_for_day(0), 0.9);
        assert_eq!(confidence_for_day(29), 0.9);
        assert_eq!(confidence_for_day(30), 0.7);
        assert_eq!(confidence_for_day(60), 0.5);
    }

    #[test]
    fn test_persisted_days() {
        assert!(is_persisted(0, Money::ZERO));
        assert!(is_persisted(14, Money::ZERO));
        assert!(is_persisted(89, Money::ZERO));
        assert!(is_persisted(3, Money::from_cents(1)));
        assert!(!is_persisted(3, Money::ZERO));
    }
}

//! Test utilities for settle-core
//!
//! Seed helpers shared by unit tests, the integration suite and CLI tests.

use chrono::NaiveDate;

use crate::clock::FixedClock;
use crate::db::Database;
use crate::models::{
    AccountType, Direction, NewObligation, NewTransaction, Obligation, ObligationCategory,
    ObligationStatus, Recurrence,
};
use crate::money::Money;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// A clock frozen at noon on the given date
pub fn clock_on(y: i32, m: u32, d: u32) -> FixedClock {
    FixedClock::on(date(y, m, d))
}

/// An unsaved one-time $100 obligation in the `other` category
pub fn obligation(id: i64, due: NaiveDate) -> Obligation {
    Obligation {
        id,
        account_id: None,
        category: ObligationCategory::Other,
        payee: format!("Payee {}", id),
        amount_due: Some(Money::from_dollars(100.0)),
        amount_minimum: None,
        due_date: Some(due),
        recurrence: Recurrence::OneTime,
        recurrence_day: None,
        status: ObligationStatus::Pending,
        auto_pay: false,
        negotiable: false,
        late_fee: Money::ZERO,
        grace_period_days: 0,
        urgency_score: 0,
        escalation_type: None,
        credit_impact_score: 0,
        preferred_account_id: None,
    }
}

pub fn seed_account(db: &Database, name: &str, account_type: AccountType, dollars: f64) -> i64 {
    db.upsert_account(name, account_type, Money::from_dollars(dollars))
        .expect("seed account")
}

pub fn seed_obligation(
    db: &Database,
    payee: &str,
    category: ObligationCategory,
    dollars: f64,
    due: NaiveDate,
) -> i64 {
    db.insert_obligation(&NewObligation::new(
        payee,
        category,
        Money::from_dollars(dollars),
        due,
    ))
    .expect("seed obligation")
}

/// Insert an obligation built by the caller
pub fn seed_obligation_with(db: &Database, ob: NewObligation) -> i64 {
    db.insert_obligation(&ob).expect("seed obligation")
}

fn seed_transaction(
    db: &Database,
    account_id: i64,
    direction: Direction,
    counterparty: &str,
    dollars: f64,
    on: NaiveDate,
) -> i64 {
    db.insert_transaction(&NewTransaction {
        account_id,
        direction,
        amount: Money::from_dollars(dollars),
        counterparty: Some(counterparty.to_string()),
        description: counterparty.to_uppercase(),
        tx_date: on,
    })
    .expect("seed transaction")
}

pub fn seed_outflow(db: &Database, account_id: i64, counterparty: &str, dollars: f64, on: NaiveDate) -> i64 {
    seed_transaction(db, account_id, Direction::Outflow, counterparty, dollars, on)
}

pub fn seed_inflow(db: &Database, account_id: i64, counterparty: &str, dollars: f64, on: NaiveDate) -> i64 {
    seed_transaction(db, account_id, Direction::Inflow, counterparty, dollars, on)
}

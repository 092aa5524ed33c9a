//! Urgency scoring
//!
//! A pure, rule-based 0-100 score for how soon an obligation needs money.
//! The score is the sum of four terms, each readable on its own:
//!
//! | Term          | Range  | Driver                                       |
//! |---------------|--------|----------------------------------------------|
//! | Time pressure | 0..=50 | days until due date + grace period           |
//! | Category      | 5..=30 | fixed weight per obligation category         |
//! | Late fee      | 0..=15 | size of the late fee                         |
//! | Modifiers     | -75..0 | auto-pay, paid/disputed/deferred status      |
//!
//! The sum is clamped to 0..=100. Dirty inputs never fail: a missing due
//! date drops the time term, and a non-finite or negative fee or grace
//! period counts as zero.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::{Obligation, ObligationCategory, ObligationStatus};

/// Four-level label derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The attributes the scorer reads
#[derive(Debug, Clone)]
pub struct UrgencyInput {
    pub due_date: Option<NaiveDate>,
    pub category: ObligationCategory,
    pub status: ObligationStatus,
    pub auto_pay: bool,
    /// Dollars; may be dirty
    pub late_fee: f64,
    /// Days; may be dirty
    pub grace_period_days: f64,
}

impl UrgencyInput {
    pub fn from_obligation(ob: &Obligation) -> Self {
        Self {
            due_date: ob.due_date,
            category: ob.category,
            status: ob.status,
            auto_pay: ob.auto_pay,
            late_fee: ob.late_fee.to_dollars(),
            grace_period_days: ob.grace_period_days as f64,
        }
    }
}

/// Fixed weight per category
pub fn category_weight(category: ObligationCategory) -> i32 {
    match category {
        ObligationCategory::Legal => 30,
        ObligationCategory::FederalTax => 28,
        ObligationCategory::PropertyTax => 25,
        ObligationCategory::StateTax => 25,
        ObligationCategory::Mortgage => 25,
        ObligationCategory::Insurance => 18,
        ObligationCategory::Utility => 15,
        ObligationCategory::Loan => 15,
        ObligationCategory::Hoa => 12,
        ObligationCategory::CreditCard => 12,
        ObligationCategory::Medical => 10,
        ObligationCategory::Subscription => 5,
        ObligationCategory::Other => 5,
    }
}

/// Time-pressure term from days until the effective due date (negative = overdue)
fn time_pressure(days_until_due: i64) -> i32 {
    match days_until_due {
        d if d < -30 => 50,
        d if d < -7 => 45,
        d if d < 0 => 40,
        0 => 35,
        d if d <= 3 => 30,
        d if d <= 7 => 20,
        d if d <= 14 => 10,
        _ => 0,
    }
}

fn late_fee_bonus(late_fee: f64) -> i32 {
    if late_fee > 50.0 {
        15
    } else if late_fee > 25.0 {
        10
    } else if late_fee > 0.0 {
        5
    } else {
        0
    }
}

fn status_penalty(status: ObligationStatus) -> i32 {
    match status {
        ObligationStatus::Paid => 50,
        ObligationStatus::Deferred => 15,
        ObligationStatus::Disputed => 10,
        ObligationStatus::Pending | ObligationStatus::Overdue => 0,
    }
}

/// Non-finite and negative values count as zero
fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Score an obligation as of `today`
pub fn urgency_score(input: &UrgencyInput, today: NaiveDate) -> u8 {
    let mut score = 0;

    if let Some(due) = input.due_date {
        let grace_days = sanitize(input.grace_period_days).floor() as i64;
        // A grace period past the calendar range puts the due date out of reach
        let effective_due =
            Duration::try_days(grace_days).and_then(|g| due.checked_add_signed(g));
        if let Some(effective_due) = effective_due {
            score += time_pressure((effective_due - today).num_days());
        }
    }

    score += category_weight(input.category);
    score += late_fee_bonus(sanitize(input.late_fee));

    if input.auto_pay {
        score -= 25;
    }
    score -= status_penalty(input.status);

    score.clamp(0, 100) as u8
}

/// Map a score to its level
pub fn urgency_level(score: u8) -> UrgencyLevel {
    match score {
        70.. => UrgencyLevel::Critical,
        50..=69 => UrgencyLevel::High,
        30..=49 => UrgencyLevel::Medium,
        _ => UrgencyLevel::Low,
    }
}

/// Score and label in one call
pub fn score(input: &UrgencyInput, today: NaiveDate) -> (u8, UrgencyLevel) {
    let s = urgency_score(input, today);
    (s, urgency_level(s))
}

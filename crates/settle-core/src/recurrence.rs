//! Recurrence expansion for obligations
//!
//! An obligation's due date is the anchor of its series: nothing occurs
//! before it. Monthly series land on `recurrence_day` (or the anchor's day)
//! every month, quarterly every third month from the anchor month, annual in
//! the anchor month. Days past the end of a short month clamp to its last day.

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{Obligation, Recurrence};

/// Number of days in a month
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// `day` in the given month, clamped to the month's last day
pub fn clamp_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, days_in_month(year, month)))
}

/// Shift a date by whole months, clamping the day
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let total = date.year() * 12 + date.month0() as i32 + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    clamp_day(year, month, date.day()).unwrap_or(date)
}

/// Months between the anchor's month and the date's month
fn month_offset(anchor: NaiveDate, date: NaiveDate) -> i32 {
    (date.year() - anchor.year()) * 12 + date.month() as i32 - anchor.month() as i32
}

/// Whether the obligation falls due on `date`
pub fn occurs_on(ob: &Obligation, date: NaiveDate) -> bool {
    let anchor = match ob.due_date {
        Some(d) => d,
        None => return false,
    };
    if date < anchor {
        return false;
    }

    let step = match ob.recurrence {
        Recurrence::OneTime => return date == anchor,
        Recurrence::Monthly => 1,
        Recurrence::Quarterly => 3,
        Recurrence::Annual => 12,
    };

    if month_offset(anchor, date) % step != 0 {
        return false;
    }

    let day = ob.recurrence_day.unwrap_or_else(|| anchor.day());
    clamp_day(date.year(), date.month(), day) == Some(date)
}

/// Every date in `[from, to]` on which the obligation falls due
pub fn occurrences_between(ob: &Obligation, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut date = from;
    while date <= to {
        if occurs_on(ob, date) {
            dates.push(date);
        }
        date += Duration::days(1);
    }
    dates
}

/// First occurrence on or after `date`, searching at most two years ahead
pub fn next_on_or_after(ob: &Obligation, date: NaiveDate) -> Option<NaiveDate> {
    let limit = add_months(date, 24);
    let mut d = date;
    while d <= limit {
        if occurs_on(ob, d) {
            return Some(d);
        }
        d += Duration::days(1);
    }
    None
}

//! Engine commands: match, triage, project, revenue, run, schedule
//!
//! The scheduler runs the automation pass on a fixed interval, configured with
//! `--hours` or the `SETTLE_SCHEDULE_HOURS` environment variable.

use std::time::Duration;

use anyhow::{bail, Result};
use settle_core::db::Database;
use settle_core::models::{NewRevenueSource, RevenueCadence, RunStatus, VerifiedBy};
use settle_core::pipeline::run_pipeline;
use settle_core::{
    CashFlowProjector, Clock, Money, PolicyConfig, RevenueDiscovery, SystemClock,
    TransactionMatcher, TriageOrchestrator,
};
use tokio::time::interval;
use tracing::{error, info, warn};

use super::{parse_date, print_json, truncate};

/// Environment variable holding the scheduler interval in hours
pub const SCHEDULE_HOURS_ENV: &str = "SETTLE_SCHEDULE_HOURS";

pub fn cmd_match(db: &Database, clock: &dyn Clock, policy: &PolicyConfig, json: bool) -> Result<()> {
    let result =
        TransactionMatcher::with_config(db, clock, policy.matcher.clone()).match_transactions()?;
    if json {
        return print_json(&result);
    }

    println!();
    println!("🔗 Transaction Matching");
    println!("   ─────────────────────────────");
    println!("   Outflows scanned: {}", result.scanned);
    println!("   Matched: {}", result.matched);
    println!("   Marked paid: {}", result.paid);
    for m in &result.matches {
        println!(
            "   tx #{} → #{} {} {} ({:.0}%)",
            m.transaction_id,
            m.obligation_id,
            truncate(&m.payee, 24),
            m.amount,
            m.confidence * 100.0
        );
    }
    Ok(())
}

pub fn cmd_triage(db: &Database, clock: &dyn Clock, policy: &PolicyConfig, json: bool) -> Result<()> {
    let result = TriageOrchestrator::with_config(
        db,
        clock,
        policy.triage.clone(),
        policy.confidence.clone(),
    )
    .run_triage()?;
    if json {
        return print_json(&result);
    }

    println!();
    println!("🚑 Triage");
    println!("   ─────────────────────────────");
    println!("   Obligations scanned: {}", result.scanned);
    println!(
        "   Critical {} · High {} · Medium {} · Low {}",
        result.levels.critical, result.levels.high, result.levels.medium, result.levels.low
    );
    println!("   Newly overdue: {}", result.marked_overdue);
    println!(
        "   Cash {} − due in {} days {} = surplus {}",
        result.cash_balance,
        policy.triage.surplus_window_days,
        result.due_within_window,
        result.surplus
    );
    if result.expired > 0 {
        println!("   Expired recommendations: {}", result.expired);
    }

    if result.created.is_empty() {
        println!();
        println!("   No new recommendations ({} already active).", result.skipped_duplicates);
        return Ok(());
    }

    println!();
    println!("   New recommendations:");
    for rec in &result.created {
        println!(
            "   #{:<4} P{} {:<9} {} ({:.0}%)",
            rec.id,
            rec.priority,
            rec.rec_type.as_str(),
            rec.title,
            rec.confidence * 100.0
        );
    }
    println!();
    println!("   Decide with: settle recs decide <id> approved|rejected|deferred|modified");
    Ok(())
}

pub fn cmd_project(db: &Database, clock: &dyn Clock, json: bool) -> Result<()> {
    let result = CashFlowProjector::new(db, clock).generate_projections()?;
    if json {
        return print_json(&result);
    }

    println!();
    println!("📈 Cash-Flow Projection ({} days)", settle_core::projector::HORIZON_DAYS);
    println!("   ─────────────────────────────────────────────");
    println!("   Starting balance: {}", result.starting_balance);
    println!("   Daily inflow:     {}", result.daily_inflow);
    println!("   Total outflows:   {}", result.total_outflows);
    println!("   Ending balance:   {}", result.ending_balance);
    println!(
        "   Lowest balance:   {} on {}",
        result.lowest_balance, result.lowest_balance_date
    );
    println!();
    for p in &result.points {
        if p.outflow.is_zero() {
            continue;
        }
        println!(
            "   {} │ -{:>10} │ {:>11} │ {:.0}%",
            p.projection_date,
            p.outflow.to_string(),
            p.balance.to_string(),
            p.confidence * 100.0
        );
    }
    if result.lowest_balance.is_negative() {
        println!();
        println!("   ⚠️  Balance goes negative. Try: settle plan --compare");
    }
    Ok(())
}

// ========== Revenue ==========

pub fn cmd_revenue_discover(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    json: bool,
) -> Result<()> {
    let result = RevenueDiscovery::with_config(db, clock, policy.revenue.clone())
        .discover_revenue_sources()?;
    if json {
        return print_json(&result);
    }

    println!();
    println!("💵 Revenue Discovery");
    println!("   ─────────────────────────────");
    println!("   Inflows scanned: {}", result.scanned);
    println!("   Excluded (transfers, own accounts): {}", result.excluded);
    println!("   New sources: {} · Updated: {}", result.inserted, result.updated);
    for s in &result.sources {
        println!(
            "   #{:<4} {:<28} {:>11}/mo {:<9} {:.0}% next {}",
            s.revenue_source_id,
            truncate(&s.counterparty, 28),
            s.amount.to_string(),
            s.cadence.as_str(),
            s.confidence * 100.0,
            s.next_expected_date
        );
    }
    Ok(())
}

pub fn cmd_revenue_list(db: &Database, all: bool, json: bool) -> Result<()> {
    let sources = db.list_revenue_sources(!all)?;
    if json {
        return print_json(&sources);
    }
    if sources.is_empty() {
        println!("No revenue sources. Discover them with: settle revenue discover");
        return Ok(());
    }

    println!();
    println!("💵 Revenue Sources");
    println!("   ─────────────────────────────────────────────────────────────");
    for s in &sources {
        let next = s
            .next_expected_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   #{:<4} {:<28} {:>11} {:<9} {:>4.0}% {:<10} {}{}",
            s.id,
            truncate(&s.description, 28),
            s.amount.to_string(),
            s.cadence.as_str(),
            s.confidence * 100.0,
            next,
            s.source,
            if s.active { "" } else { " (inactive)" }
        );
    }
    Ok(())
}

pub fn cmd_revenue_add(
    db: &Database,
    clock: &dyn Clock,
    description: &str,
    amount: f64,
    cadence: &str,
    next: &str,
    account_id: Option<i64>,
) -> Result<()> {
    if amount <= 0.0 {
        bail!("Revenue amount must be positive");
    }
    let cadence: RevenueCadence = cadence.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let rs = NewRevenueSource {
        source: "manual".to_string(),
        description: description.to_string(),
        counterparty: description.trim().to_lowercase(),
        account_id,
        amount: Money::from_dollars(amount),
        cadence,
        confidence: 1.0,
        verified_by: VerifiedBy::Manual,
        occurrences: 0,
        next_expected_date: Some(parse_date(next)?),
    };
    let id = db.insert_revenue_source(&rs, clock.now())?;
    println!("✅ Revenue source #{} {} {} {}", id, description, rs.amount, cadence);
    Ok(())
}

pub fn cmd_revenue_deactivate(db: &Database, id: i64) -> Result<()> {
    if !db.set_revenue_source_active(id, false)? {
        bail!("Revenue source {} not found", id);
    }
    println!("✅ Revenue source #{} deactivated", id);
    Ok(())
}

// ========== Pipeline ==========

pub fn cmd_run(db: &Database, clock: &dyn Clock, policy: &PolicyConfig, json: bool) -> Result<()> {
    let result = run_pipeline(db, clock, policy, "manual");
    if json {
        return print_json(&result);
    }

    println!();
    match result.run_id {
        Some(id) => println!("⚙️  Automation run #{}", id),
        None => println!("⚙️  Automation run (not logged)"),
    }
    println!("   ─────────────────────────────────────────────");
    for p in &result.phases {
        if p.ok {
            println!(
                "   ✅ {:<8} {} ({} ms)",
                p.phase,
                p.summary.as_deref().unwrap_or_default(),
                p.duration_ms
            );
        } else {
            println!(
                "   ❌ {:<8} {}",
                p.phase,
                p.error.as_deref().unwrap_or("failed")
            );
        }
    }
    println!();
    println!("   Status: {}", result.status);

    if result.status == RunStatus::Failed {
        bail!("Every phase failed");
    }
    Ok(())
}

/// Interval from the flag, else the environment; None if unset or zero
pub fn schedule_hours(flag: Option<u64>) -> Option<u64> {
    let hours = flag.or_else(|| {
        std::env::var(SCHEDULE_HOURS_ENV)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    })?;
    if hours == 0 {
        warn!("{} is 0, scheduled runs disabled", SCHEDULE_HOURS_ENV);
        return None;
    }
    Some(hours)
}

/// Tick period for a schedule of `hours`
pub fn schedule_interval(hours: u64) -> Result<Duration> {
    match hours.checked_mul(3600) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("Schedule interval of {} hours is too large", hours),
    }
}

/// Run the pipeline every `hours` until interrupted
pub async fn cmd_schedule(db: Database, policy: PolicyConfig, hours: Option<u64>) -> Result<()> {
    let Some(hours) = schedule_hours(hours) else {
        bail!(
            "No schedule configured. Pass --hours or set {} (e.g. 24 for daily)",
            SCHEDULE_HOURS_ENV
        );
    };

    let period = schedule_interval(hours)?;

    info!(interval_hours = hours, "Starting pipeline scheduler");
    println!("⏱️  Running the automation pass every {} hour(s). Ctrl-C to stop.", hours);

    let clock = SystemClock;
    let mut ticker = interval(period);

    // Skip the first immediate tick; the first pass runs one interval from now
    ticker.tick().await;

    loop {
        ticker.tick().await;

        info!("Running scheduled pipeline pass...");
        let result = run_pipeline(&db, &clock, &policy, "schedule");
        match result.status {
            RunStatus::Completed => {
                info!(run_id = ?result.run_id, "Scheduled pass completed");
            }
            RunStatus::CompletedWithErrors => {
                warn!(
                    run_id = ?result.run_id,
                    failed = %result.failed_phases().join(","),
                    "Scheduled pass completed with errors"
                );
            }
            RunStatus::Failed | RunStatus::Running => {
                error!(run_id = ?result.run_id, "Scheduled pass failed");
            }
        }
    }
}

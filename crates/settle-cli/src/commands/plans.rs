//! Payment plan commands (simulate, compare, list, show, activate)

use anyhow::{bail, Context, Result};
use settle_core::db::Database;
use settle_core::models::{ActivationOutcome, PlanAction, PlanSimulation, Strategy, WarningSeverity};
use settle_core::planner::MAX_HORIZON_DAYS;
use settle_core::{Clock, Money, PaymentPlanner, PlanOptions, PolicyConfig};

use super::{print_json, truncate};

/// Parse `ID=DOLLARS`
fn parse_amount_override(s: &str) -> Result<(i64, Money)> {
    let (id, dollars) = s
        .split_once('=')
        .with_context(|| format!("Invalid amount override '{}' (use ID=DOLLARS)", s))?;
    let id: i64 = id
        .trim()
        .parse()
        .with_context(|| format!("Invalid obligation id in '{}'", s))?;
    let dollars: f64 = dollars
        .trim()
        .parse()
        .with_context(|| format!("Invalid amount in '{}'", s))?;
    if dollars < 0.0 {
        bail!("Amount override for {} cannot be negative", id);
    }
    Ok((id, Money::from_dollars(dollars)))
}

/// Build simulation options from CLI arguments
pub fn plan_options(
    strategy: &str,
    horizon: Option<i64>,
    defer: &[i64],
    pay_early: &[i64],
    amounts: &[String],
) -> Result<PlanOptions> {
    let strategy: Strategy = strategy.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    if let Some(h) = horizon {
        if !(1..=MAX_HORIZON_DAYS).contains(&h) {
            bail!("Horizon must be between 1 and {} days", MAX_HORIZON_DAYS);
        }
    }

    let mut options = PlanOptions::with_strategy(strategy);
    options.horizon_days = horizon;
    options.defer_ids = defer.iter().copied().collect();
    options.pay_early_ids = pay_early.iter().copied().collect();
    for s in amounts {
        let (id, amount) = parse_amount_override(s)?;
        options.custom_amounts.insert(id, amount);
    }
    Ok(options)
}

fn planner<'a>(db: &'a Database, clock: &'a dyn Clock, policy: &PolicyConfig) -> PaymentPlanner<'a> {
    PaymentPlanner::with_config(db, clock, policy.planner.clone(), policy.escalation.clone())
}

fn action_icon(action: PlanAction) -> &'static str {
    match action {
        PlanAction::PayFull => "✅",
        PlanAction::PayMinimum => "🔸",
        PlanAction::GraceDeferred => "⏳",
        PlanAction::Deferred => "⏸️ ",
        PlanAction::AtRisk => "❌",
    }
}

fn print_plan_summary(plan: &PlanSimulation) {
    println!(
        "   Strategy: {} · {} days from {}",
        plan.strategy, plan.horizon_days, plan.start_date
    );
    println!("   Starting balance: {}", plan.starting_balance);
    println!("   Inflows:          {}", plan.total_inflows);
    println!("   Outflows:         {}", plan.total_outflows);
    println!("   Ending balance:   {}", plan.ending_balance);
    println!(
        "   Lowest balance:   {} on {}",
        plan.lowest_balance, plan.lowest_balance_date
    );
    println!(
        "   Late fees avoided {} · at risk {}",
        plan.late_fees_avoided, plan.late_fees_risked
    );
}

fn print_plan(plan: &PlanSimulation) {
    print_plan_summary(plan);

    if !plan.revenue_summary.is_empty() {
        println!();
        println!("   Expected revenue:");
        for r in &plan.revenue_summary {
            println!(
                "   {:<28} {} × {} = {} ({:.0}%)",
                truncate(&r.description, 28),
                r.occurrences,
                r.amount_per_occurrence,
                r.total,
                r.confidence * 100.0
            );
        }
    }

    if !plan.schedule.is_empty() {
        println!();
        println!("   Schedule:");
        for e in &plan.schedule {
            println!(
                "   {} {} │ {:<24} │ {:<14} │ {:>11} │ → {}",
                action_icon(e.action),
                e.date,
                truncate(&e.payee, 24),
                e.action.as_str(),
                e.amount.to_string(),
                e.balance_after
            );
        }
    }

    if !plan.warnings.is_empty() {
        println!();
        println!("   Warnings:");
        for w in &plan.warnings {
            let icon = match w.severity {
                WarningSeverity::Critical => "🚨",
                WarningSeverity::Warning => "⚠️ ",
                WarningSeverity::Info => "ℹ️ ",
            };
            println!("   {} {} {}", icon, w.date, w.message);
        }
    }
}

pub fn cmd_plan(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    options: &PlanOptions,
    save: bool,
    json: bool,
) -> Result<()> {
    let planner = planner(db, clock, policy);
    let plan = planner.generate_payment_plan(options)?;
    let saved = if save {
        Some(planner.save_payment_plan(&plan)?)
    } else {
        None
    };

    if json {
        return print_json(&serde_json::json!({ "plan_id": saved, "plan": plan }));
    }

    println!();
    println!("🗓️  Payment Plan");
    println!("   ─────────────────────────────────────────────────────────────");
    print_plan(&plan);
    println!();
    match saved {
        Some(id) => println!("💾 Saved as draft plan #{}. Activate with: settle plans activate {}", id, id),
        None => println!("   (not saved; rerun with --save to keep it)"),
    }
    Ok(())
}

pub fn cmd_plan_compare(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    horizon: Option<i64>,
    json: bool,
) -> Result<()> {
    let planner = planner(db, clock, policy);
    let mut plans = Vec::with_capacity(Strategy::all().len());
    for strategy in Strategy::all() {
        let mut options = PlanOptions::with_strategy(*strategy);
        options.horizon_days = horizon;
        plans.push(planner.generate_payment_plan(&options)?);
    }

    if json {
        return print_json(&plans);
    }

    println!();
    println!("🗓️  Strategy Comparison");
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   {:<13} {:>12} {:>12} {:>11} {:>11} {:>8}",
        "strategy", "ending", "lowest", "fees risk", "outflows", "at risk"
    );
    for plan in &plans {
        let at_risk = plan
            .schedule
            .iter()
            .filter(|e| e.action == PlanAction::AtRisk)
            .count();
        println!(
            "   {:<13} {:>12} {:>12} {:>11} {:>11} {:>8}",
            plan.strategy.as_str(),
            plan.ending_balance.to_string(),
            plan.lowest_balance.to_string(),
            plan.late_fees_risked.to_string(),
            plan.total_outflows.to_string(),
            at_risk
        );
    }
    Ok(())
}

pub fn cmd_plans_list(db: &Database, limit: i64, json: bool) -> Result<()> {
    let plans = db.list_payment_plans(limit)?;
    if json {
        return print_json(&plans);
    }
    if plans.is_empty() {
        println!("No saved plans. Create one with: settle plan --save");
        return Ok(());
    }

    println!();
    println!("🗓️  Saved Plans");
    println!("   ─────────────────────────────────────────────────────────────");
    for p in &plans {
        println!(
            "   #{:<4} {:<9} {:<13} {} │ ending {:>11} │ {} entries",
            p.id,
            p.status.as_str(),
            p.simulation.strategy.as_str(),
            p.created_at.format("%Y-%m-%d"),
            p.simulation.ending_balance.to_string(),
            p.simulation.schedule.len()
        );
    }
    Ok(())
}

pub fn cmd_plans_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let Some(plan) = db.get_payment_plan(id)? else {
        bail!("Plan {} not found", id);
    };
    if json {
        return print_json(&plan);
    }

    println!();
    println!("🗓️  Plan #{} ({})", plan.id, plan.status);
    println!("   ─────────────────────────────────────────────────────────────");
    print_plan(&plan.simulation);
    Ok(())
}

pub fn cmd_plans_activate(db: &Database, clock: &dyn Clock, policy: &PolicyConfig, id: i64) -> Result<()> {
    match planner(db, clock, policy).activate_payment_plan(id)? {
        ActivationOutcome::Activated { abandoned } => {
            println!("✅ Plan #{} is now active", id);
            if let Some(old) = abandoned {
                println!("   Plan #{} abandoned", old);
            }
            Ok(())
        }
        ActivationOutcome::AlreadyActive => {
            println!("Plan #{} is already active", id);
            Ok(())
        }
        ActivationOutcome::NotFound => bail!("Plan {} not found", id),
        ActivationOutcome::Conflict => {
            bail!("Plan {} was abandoned and cannot be reactivated", id)
        }
    }
}

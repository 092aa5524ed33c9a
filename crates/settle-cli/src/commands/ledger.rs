//! Ledger commands: accounts, obligations, transactions, disputes, legal deadlines

use anyhow::{bail, Context, Result};
use settle_core::db::Database;
use settle_core::models::{
    AccountType, Direction, NewObligation, NewTransaction, ObligationCategory, ObligationStatus,
    Recurrence,
};
use settle_core::{Clock, Money};

use super::{parse_date, print_json, truncate};

// ========== Accounts ==========

pub fn cmd_accounts_list(db: &Database, json: bool) -> Result<()> {
    let accounts = db.list_accounts()?;
    if json {
        return print_json(&accounts);
    }

    if accounts.is_empty() {
        println!("No accounts found. Add one with:");
        println!("  settle accounts set Checking --balance 2500");
        return Ok(());
    }

    println!();
    println!("📁 Accounts");
    println!("   ─────────────────────────────");
    for account in &accounts {
        println!(
            "   #{:<3} {:<24} {:<9} {:>12}",
            account.id,
            truncate(&account.name, 24),
            account.account_type.as_str(),
            account.current_balance.to_string()
        );
    }
    println!();
    println!("   Cash on hand: {}", db.cash_balance()?);

    Ok(())
}

pub fn cmd_accounts_set(db: &Database, name: &str, account_type: &str, balance: f64) -> Result<()> {
    let account_type: AccountType = account_type.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let id = db.upsert_account(name, account_type, Money::from_dollars(balance))?;
    println!(
        "✅ Account #{} {} ({}) balance {}",
        id,
        name,
        account_type,
        Money::from_dollars(balance)
    );
    Ok(())
}

// ========== Obligations ==========

/// Arguments for `settle obligations add`
#[derive(Debug, Clone)]
pub struct ObligationArgs {
    pub payee: String,
    pub amount: f64,
    pub due: String,
    pub category: String,
    pub minimum: Option<f64>,
    pub recurrence: String,
    pub late_fee: f64,
    pub grace_days: i64,
    pub escalation: Option<String>,
    pub credit_impact: i64,
    pub negotiable: bool,
    pub auto_pay: bool,
}

impl ObligationArgs {
    fn to_new_obligation(&self) -> Result<NewObligation> {
        if self.payee.trim().is_empty() {
            bail!("Payee cannot be empty");
        }
        if self.amount < 0.0 {
            bail!("Amount cannot be negative");
        }

        let category: ObligationCategory =
            self.category.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let recurrence: Recurrence =
            self.recurrence.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let due = parse_date(&self.due)?;

        let mut ob = NewObligation::new(
            self.payee.trim(),
            category,
            Money::from_dollars(self.amount),
            due,
        );
        ob.amount_minimum = self.minimum.map(Money::from_dollars);
        ob.recurrence = recurrence;
        ob.late_fee = Money::from_dollars(self.late_fee.max(0.0));
        ob.grace_period_days = self.grace_days.max(0);
        ob.escalation_type = self
            .escalation
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase);
        ob.credit_impact_score = self.credit_impact.clamp(0, 100);
        ob.negotiable = self.negotiable;
        ob.auto_pay = self.auto_pay;
        Ok(ob)
    }
}

pub fn cmd_obligations_list(db: &Database, status: Option<&str>, json: bool) -> Result<()> {
    let obligations = match status {
        Some(s) => {
            let status: ObligationStatus = s.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            db.list_obligations(Some(status))?
        }
        None => db.list_open_obligations()?,
    };

    if json {
        return print_json(&obligations);
    }

    if obligations.is_empty() {
        println!("No obligations found.");
        return Ok(());
    }

    println!();
    println!("🧾 Obligations");
    println!("   ─────────────────────────────────────────────────────────────");
    for ob in &obligations {
        let due = ob
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "no date".to_string());
        let amount = ob
            .amount_due
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "   #{:<4} {} │ {:>11} │ {:>3} │ {:<8} │ {:<13} │ {}",
            ob.id,
            due,
            amount,
            ob.urgency_score,
            ob.status.as_str(),
            ob.category.as_str(),
            truncate(&ob.payee, 30)
        );
    }

    Ok(())
}

pub fn cmd_obligations_add(db: &Database, args: &ObligationArgs) -> Result<()> {
    let ob = args.to_new_obligation()?;
    let id = db.insert_obligation(&ob)?;
    println!(
        "✅ Obligation #{} {} {} due {}",
        id, ob.payee, Money::from_dollars(args.amount), args.due
    );
    Ok(())
}

fn change_status(
    db: &Database,
    clock: &dyn Clock,
    id: i64,
    action: &str,
    apply: impl FnOnce() -> settle_core::Result<bool>,
) -> Result<()> {
    if db.get_obligation(id)?.is_none() {
        bail!("Obligation {} not found", id);
    }
    if !apply()? {
        bail!("Obligation {} cannot be {} from its current status", id, action);
    }
    db.log_audit("user", &format!("obligation_{}", action), Some("obligation"), Some(id), None, clock.now())?;
    println!("✅ Obligation #{} {}", id, action);
    Ok(())
}

pub fn cmd_obligations_defer(db: &Database, clock: &dyn Clock, id: i64) -> Result<()> {
    change_status(db, clock, id, "deferred", || db.defer_obligation(id, clock.now()))
}

pub fn cmd_obligations_pay(db: &Database, clock: &dyn Clock, id: i64) -> Result<()> {
    change_status(db, clock, id, "paid", || db.mark_obligation_paid(id, clock.now()))
}

pub fn cmd_obligations_dispute(db: &Database, clock: &dyn Clock, id: i64) -> Result<()> {
    change_status(db, clock, id, "disputed", || db.dispute_obligation(id, clock.now()))
}

// ========== Transactions ==========

pub fn cmd_transaction_add(
    db: &Database,
    account_id: i64,
    direction: &str,
    amount: f64,
    date: &str,
    counterparty: Option<&str>,
    description: &str,
) -> Result<()> {
    if db.get_account(account_id)?.is_none() {
        bail!("Account {} not found", account_id);
    }
    let direction: Direction = direction.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let tx = NewTransaction {
        account_id,
        direction,
        amount: Money::from_dollars(amount),
        counterparty: counterparty.map(str::to_string),
        description: description.to_string(),
        tx_date: parse_date(date)?,
    };
    let id = db
        .insert_transaction(&tx)
        .context("Failed to record transaction")?;
    println!("✅ Transaction #{} {} {} on {}", id, direction, tx.amount, tx.tx_date);
    Ok(())
}

// ========== Disputes ==========

pub fn cmd_disputes_list(db: &Database, json: bool) -> Result<()> {
    let disputes = db.list_open_disputes()?;
    if json {
        return print_json(&disputes);
    }
    if disputes.is_empty() {
        println!("No open disputes.");
        return Ok(());
    }

    println!();
    println!("⚖️  Open Disputes");
    println!("   ─────────────────────────────────────────────────────────────");
    for d in &disputes {
        let next = match (&d.next_action, d.next_action_date) {
            (Some(a), Some(date)) => format!("{} by {}", a, date),
            (Some(a), None) => a.clone(),
            _ => "-".to_string(),
        };
        println!("   #{:<4} {:<32} │ {}", d.id, truncate(&d.title, 32), next);
    }
    Ok(())
}

pub fn cmd_disputes_add(
    db: &Database,
    title: &str,
    obligation_id: Option<i64>,
    next_action: Option<&str>,
    by: Option<&str>,
) -> Result<()> {
    if let Some(ob_id) = obligation_id {
        if db.get_obligation(ob_id)?.is_none() {
            bail!("Obligation {} not found", ob_id);
        }
    }
    let by = by.map(parse_date).transpose()?;
    let id = db.insert_dispute(obligation_id, title, next_action, by)?;
    println!("✅ Dispute #{} opened", id);
    Ok(())
}

pub fn cmd_disputes_resolve(db: &Database, id: i64) -> Result<()> {
    if !db.resolve_dispute(id)? {
        bail!("Dispute {} not found or already resolved", id);
    }
    println!("✅ Dispute #{} resolved", id);
    Ok(())
}

// ========== Legal deadlines ==========

pub fn cmd_deadlines_list(db: &Database, json: bool) -> Result<()> {
    let deadlines = db.list_pending_legal_deadlines()?;
    if json {
        return print_json(&deadlines);
    }
    if deadlines.is_empty() {
        println!("No pending legal deadlines.");
        return Ok(());
    }

    println!();
    println!("📅 Legal Deadlines");
    println!("   ─────────────────────────────────────────────────────────────");
    for d in &deadlines {
        println!(
            "   #{:<4} {} │ {:<32} │ {}",
            d.id,
            d.deadline_date,
            truncate(&d.title, 32),
            d.case_ref.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub fn cmd_deadlines_add(db: &Database, title: &str, date: &str, case_ref: Option<&str>) -> Result<()> {
    let id = db.insert_legal_deadline(title, case_ref, parse_date(date)?)?;
    println!("✅ Legal deadline #{} added", id);
    Ok(())
}

pub fn cmd_deadlines_complete(db: &Database, id: i64) -> Result<()> {
    if !db.complete_legal_deadline(id)? {
        bail!("Legal deadline {} not found or already complete", id);
    }
    println!("✅ Legal deadline #{} complete", id);
    Ok(())
}

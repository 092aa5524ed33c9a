//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_policy` - Resolve the decision policy
//! - `cmd_init` - Initialize the database
//! - `cmd_status` - Database and engine status
//! - `cmd_audit` - Recent audit entries and automation runs

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use settle_core::db::{Database, DB_KEY_ENV};
use settle_core::models::RecStatus;
use settle_core::PolicyConfig;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the decision policy (explicit file > data-dir override > built-in)
pub fn load_policy(config: Option<&Path>) -> Result<PolicyConfig> {
    PolicyConfig::load(config).context("Failed to load policy config")
}

/// Parse a YYYY-MM-DD argument
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}' (use YYYY-MM-DD)", s))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let _db = open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add an account:     settle accounts set Checking --balance 2500");
    println!("  2. Add an obligation:  settle obligations add \"Electric Co\" -a 120 -d 2025-07-01 -c utility");
    println!("  3. Triage:             settle triage");

    Ok(())
}

pub fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 Settle Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = std::fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
        println!();
        return Ok(());
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    match open_db(db_path, no_encrypt) {
        Ok(db) => print_engine_summary(&db)?,
        Err(e) => {
            println!();
            println!("   ❌ Error opening database: {}", e);
            if !no_encrypt && !has_key {
                println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
            } else if has_key {
                println!("      (Check if {} is correct)", DB_KEY_ENV);
            }
        }
    }

    println!();
    Ok(())
}

/// Counts and the last automation run
pub fn print_engine_summary(db: &Database) -> Result<()> {
    let open = db.list_open_obligations()?;
    let active_recs = db.list_recommendations(Some(RecStatus::Active))?;

    println!();
    println!("   Cash on hand: {}", db.cash_balance()?);
    println!("   Open obligations: {}", open.len());
    println!("   Active recommendations: {}", active_recs.len());
    match db.get_active_payment_plan()? {
        Some(plan) => println!(
            "   Active plan: #{} ({}, ending {})",
            plan.id, plan.simulation.strategy, plan.simulation.ending_balance
        ),
        None => println!("   Active plan: none"),
    }
    if let Some(run) = db.list_automation_runs(1)?.into_iter().next() {
        println!(
            "   Last run: {} ({}, {})",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status,
            run.trigger
        );
    }
    Ok(())
}

pub fn cmd_audit(db: &Database, limit: i64, json: bool) -> Result<()> {
    let entries = db.list_audit_log(limit)?;
    let runs = db.list_automation_runs(limit)?;

    if json {
        return print_json(&serde_json::json!({ "audit": entries, "runs": runs }));
    }

    println!();
    println!("📜 Audit Log");
    println!("   ─────────────────────────────────────────────────────────────");
    if entries.is_empty() {
        println!("   (empty)");
    }
    for e in &entries {
        let target = match (&e.entity_type, e.entity_id) {
            (Some(t), Some(id)) => format!("{} #{}", t, id),
            (Some(t), None) => t.clone(),
            _ => String::new(),
        };
        println!(
            "   {} │ {:<9} │ {:<24} │ {}",
            e.timestamp.format("%Y-%m-%d %H:%M"),
            e.actor,
            e.action,
            target
        );
    }

    println!();
    println!("⚙️  Automation Runs");
    println!("   ─────────────────────────────────────────────────────────────");
    if runs.is_empty() {
        println!("   (none)");
    }
    for run in &runs {
        let failed: Vec<&str> = run
            .phases
            .iter()
            .filter(|p| !p.ok)
            .map(|p| p.phase.as_str())
            .collect();
        println!(
            "   #{:<4} {} │ {:<21} │ {}{}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.status.as_str(),
            run.trigger,
            if failed.is_empty() {
                String::new()
            } else {
                format!(" (failed: {})", failed.join(", "))
            }
        );
    }

    Ok(())
}

//! Recommendation commands (list, decide, outcome) and confidence

use anyhow::{bail, Result};
use settle_core::db::Database;
use settle_core::models::{Decision, DecisionResult, OutcomeStatus, RecStatus};
use settle_core::{Clock, ConfidenceLearner, PolicyConfig};

use super::{print_json, truncate};

pub fn cmd_recs_list(db: &Database, status: &str, json: bool) -> Result<()> {
    let status: RecStatus = status.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let recs = db.list_recommendations(Some(status))?;
    if json {
        return print_json(&recs);
    }
    if recs.is_empty() {
        println!("No {} recommendations.", status);
        return Ok(());
    }

    println!();
    println!("💡 Recommendations ({})", status);
    println!("   ─────────────────────────────────────────────────────────────");
    for r in &recs {
        println!(
            "   #{:<4} P{} {:<9} {:<44} {:>4.0}%",
            r.id,
            r.priority,
            r.rec_type.as_str(),
            truncate(&r.title, 44),
            r.confidence * 100.0
        );
        if !r.reasoning.is_empty() {
            println!("         {}", truncate(&r.reasoning, 70));
        }
    }
    Ok(())
}

pub fn cmd_recs_decide(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    id: i64,
    decision: &str,
    json: bool,
) -> Result<()> {
    let decision: Decision = decision.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let learner = ConfidenceLearner::with_config(db, clock, policy.confidence.clone());

    match learner.decide_recommendation(id, decision)? {
        DecisionResult::Recorded {
            feedback_id,
            confidence,
            status,
        } => {
            if json {
                return print_json(&serde_json::json!({
                    "feedback_id": feedback_id,
                    "confidence": confidence,
                    "status": status,
                }));
            }
            println!(
                "✅ Recommendation #{} {} (confidence {:.0}%), now {}",
                id,
                decision,
                confidence * 100.0,
                status
            );
            println!(
                "   Record the result later with: settle recs outcome {} succeeded|partial|failed",
                feedback_id
            );
            Ok(())
        }
        DecisionResult::NotFound => bail!("Recommendation {} not found", id),
        DecisionResult::Conflict => {
            bail!("Recommendation {} is no longer active", id)
        }
    }
}

pub fn cmd_recs_outcome(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    feedback_id: i64,
    outcome: &str,
    notes: Option<&str>,
) -> Result<()> {
    let outcome: OutcomeStatus = outcome.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let learner = ConfidenceLearner::with_config(db, clock, policy.confidence.clone());
    match learner.record_outcome(feedback_id, outcome, notes)? {
        Some(_) => {
            println!("✅ Outcome '{}' recorded for decision #{}", outcome, feedback_id);
            Ok(())
        }
        None => bail!("Decision {} not found", feedback_id),
    }
}

pub fn cmd_confidence(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    payee: Option<&str>,
    json: bool,
) -> Result<()> {
    let learner = ConfidenceLearner::with_config(db, clock, policy.confidence.clone());
    let rows = match payee {
        Some(p) => settle_core::models::RecType::all()
            .iter()
            .map(|t| Ok((*t, learner.compute_confidence(*t, Some(p))?)))
            .collect::<settle_core::Result<Vec<_>>>()?,
        None => learner.all_confidences()?,
    };

    if json {
        let map: serde_json::Map<String, serde_json::Value> = rows
            .iter()
            .map(|(t, c)| (t.as_str().to_string(), serde_json::json!(c)))
            .collect();
        return print_json(&map);
    }

    println!();
    match payee {
        Some(p) => println!("🎯 Decision Confidence for {}", p),
        None => println!("🎯 Decision Confidence"),
    }
    println!("   ─────────────────────────────");
    for (rec_type, confidence) in &rows {
        let base = learner.base_confidence(*rec_type);
        let marker = if (confidence - base).abs() < 1e-9 {
            String::new()
        } else {
            format!(" (base {:.0}%)", base * 100.0)
        };
        println!(
            "   {:<9} {:>4.0}%{}",
            rec_type.as_str(),
            confidence * 100.0,
            marker
        );
    }
    Ok(())
}

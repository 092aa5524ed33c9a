//! One automated pass over the whole engine
//!
//! Phases run strictly in order: match → triage → project → revenue → plan.
//! Each phase is isolated: a failure is logged and recorded, and the next
//! phase still runs. Nothing is rolled back across phases. The pass is
//! tracked in `automation_runs`; failing to write that log never fails the
//! pass itself.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::PolicyConfig;
use crate::db::Database;
use crate::error::Result;
use crate::matcher::TransactionMatcher;
use crate::models::{PhaseOutcome, RunStatus, Strategy};
use crate::planner::{PaymentPlanner, PlanOptions};
use crate::projector::CashFlowProjector;
use crate::revenue::RevenueDiscovery;
use crate::triage::TriageOrchestrator;

/// Phase names in execution order
pub const PHASES: [&str; 5] = ["match", "triage", "project", "revenue", "plan"];

/// Results of a pipeline pass
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// None if the run log could not be opened
    pub run_id: Option<i64>,
    pub status: RunStatus,
    pub phases: Vec<PhaseOutcome>,
}

impl PipelineResult {
    pub fn failed_phases(&self) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|p| !p.ok)
            .map(|p| p.phase.as_str())
            .collect()
    }
}

fn run_phase(name: &str, f: impl FnOnce() -> Result<String>) -> PhaseOutcome {
    let started = Instant::now();
    let outcome = f();
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(summary) => {
            info!(phase = name, duration_ms, summary = %summary, "Phase complete");
            PhaseOutcome {
                phase: name.to_string(),
                ok: true,
                summary: Some(summary),
                error: None,
                duration_ms,
            }
        }
        Err(e) => {
            error!(phase = name, duration_ms, error = %e, "Phase failed");
            PhaseOutcome {
                phase: name.to_string(),
                ok: false,
                summary: None,
                error: Some(e.to_string()),
                duration_ms,
            }
        }
    }
}

/// Terminal status for a set of phase outcomes
pub fn run_status(phases: &[PhaseOutcome]) -> RunStatus {
    let failed = phases.iter().filter(|p| !p.ok).count();
    if failed == 0 {
        RunStatus::Completed
    } else if failed == phases.len() {
        RunStatus::Failed
    } else {
        RunStatus::CompletedWithErrors
    }
}

/// Run every phase once
pub fn run_pipeline(
    db: &Database,
    clock: &dyn Clock,
    policy: &PolicyConfig,
    trigger: &str,
) -> PipelineResult {
    info!(trigger, "Starting pipeline run");

    let run_id = match db.start_automation_run(trigger, clock.now()) {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(error = %e, "Failed to open run log; continuing without it");
            None
        }
    };

    let mut phases = Vec::with_capacity(PHASES.len());

    phases.push(run_phase("match", || {
        let r = TransactionMatcher::with_config(db, clock, policy.matcher.clone())
            .match_transactions()?;
        Ok(format!("{} matched of {} scanned, {} paid", r.matched, r.scanned, r.paid))
    }));

    phases.push(run_phase("triage", || {
        let r = TriageOrchestrator::with_config(
            db,
            clock,
            policy.triage.clone(),
            policy.confidence.clone(),
        )
        .run_triage()?;
        Ok(format!(
            "{} scanned, {} overdue, {} recommendations, surplus {}",
            r.scanned,
            r.marked_overdue,
            r.created.len(),
            r.surplus
        ))
    }));

    phases.push(run_phase("project", || {
        let r = CashFlowProjector::new(db, clock).generate_projections()?;
        Ok(format!(
            "{} points, lowest {} on {}",
            r.points.len(),
            r.lowest_balance,
            r.lowest_balance_date
        ))
    }));

    phases.push(run_phase("revenue", || {
        let r = RevenueDiscovery::with_config(db, clock, policy.revenue.clone())
            .discover_revenue_sources()?;
        Ok(format!(
            "{} sources ({} new) from {} inflows",
            r.sources.len(),
            r.inserted,
            r.scanned
        ))
    }));

    phases.push(run_phase("plan", || {
        let planner = PaymentPlanner::with_config(
            db,
            clock,
            policy.planner.clone(),
            policy.escalation.clone(),
        );
        let plan = planner.generate_payment_plan(&PlanOptions::with_strategy(Strategy::Optimal))?;
        let id = planner.save_payment_plan(&plan)?;
        Ok(format!(
            "draft plan {} with {} entries, {} warnings",
            id,
            plan.schedule.len(),
            plan.warnings.len()
        ))
    }));

    let status = run_status(&phases);
    let result = PipelineResult {
        run_id,
        status,
        phases,
    };

    if let Some(id) = run_id {
        let failed = result.failed_phases();
        let error = if failed.is_empty() {
            None
        } else {
            Some(format!("failed phases: {}", failed.join(", ")))
        };
        if let Err(e) =
            db.finish_automation_run(id, status, &result.phases, error.as_deref(), clock.now())
        {
            warn!(run_id = id, error = %e, "Failed to record run status");
        }
    }

    info!(
        run_id = ?run_id,
        status = status.as_str(),
        "Pipeline run finished"
    );
    result
}

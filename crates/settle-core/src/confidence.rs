//! Decision-confidence learning
//!
//! Each recommendation type starts from a fixed base confidence. Once enough
//! approve/reject decisions have accumulated in the window, the observed
//! acceptance rate is blended in, then refined per payee when that payee has
//! its own history.

use chrono::Duration;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ConfidencePolicy;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Decision, DecisionCounts, DecisionResult, OutcomeStatus, RecStatus, RecType};

/// Fallback for types missing from the base table
pub const DEFAULT_BASE_CONFIDENCE: f64 = 0.50;

pub const MIN_CONFIDENCE: f64 = 0.10;
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Blend base confidence with decision history
pub fn blend_confidence(
    base: f64,
    type_counts: DecisionCounts,
    payee_counts: Option<DecisionCounts>,
    policy: &ConfidencePolicy,
) -> f64 {
    if type_counts.total() < policy.min_decisions {
        return base;
    }
    let Some(type_rate) = type_counts.acceptance_rate() else {
        return base;
    };

    let mut confidence = 0.5 * base + 0.5 * type_rate;

    if let Some(payee) = payee_counts.filter(|c| c.total() >= policy.min_payee_decisions) {
        if let Some(payee_rate) = payee.acceptance_rate() {
            confidence = 0.7 * confidence + 0.3 * payee_rate;
        }
    }

    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Confidence learner
pub struct ConfidenceLearner<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: ConfidencePolicy,
}

impl<'a> ConfidenceLearner<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self::with_config(db, clock, ConfidencePolicy::default())
    }

    pub fn with_config(db: &'a Database, clock: &'a dyn Clock, config: ConfidencePolicy) -> Self {
        Self { db, clock, config }
    }

    pub fn base_confidence(&self, rec_type: RecType) -> f64 {
        self.config
            .base
            .get(&rec_type)
            .copied()
            .unwrap_or(DEFAULT_BASE_CONFIDENCE)
    }

    /// Current confidence for a recommendation type, optionally for one payee
    pub fn compute_confidence(&self, rec_type: RecType, payee: Option<&str>) -> Result<f64> {
        let base = self.base_confidence(rec_type);
        let since = self.clock.now() - Duration::days(self.config.window_days);

        let type_counts = self.db.decision_counts(rec_type, None, since)?;
        if type_counts.total() < self.config.min_decisions {
            return Ok(base);
        }

        let payee_counts = match payee.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Some(self.db.decision_counts(rec_type, Some(p), since)?),
            None => None,
        };

        let confidence = blend_confidence(base, type_counts, payee_counts, &self.config);
        debug!(
            rec_type = rec_type.as_str(),
            payee = payee.unwrap_or_default(),
            decisions = type_counts.total(),
            confidence,
            "Computed confidence"
        );
        Ok(confidence)
    }

    /// Type-level confidence for every recommendation type
    pub fn all_confidences(&self) -> Result<Vec<(RecType, f64)>> {
        RecType::all()
            .iter()
            .map(|t| Ok((*t, self.compute_confidence(*t, None)?)))
            .collect()
    }

    /// Record a decision on an active recommendation
    pub fn decide_recommendation(&self, id: i64, decision: Decision) -> Result<DecisionResult> {
        let Some(rec) = self.db.get_recommendation(id)? else {
            return Ok(DecisionResult::NotFound);
        };
        if rec.status != RecStatus::Active {
            return Ok(DecisionResult::Conflict);
        }

        let confidence = self.compute_confidence(rec.rec_type, rec.payee.as_deref())?;
        let now = self.clock.now();

        let Some((feedback_id, status)) = self.db.record_decision(id, decision, confidence, now)?
        else {
            // Lost a race with another decision or an expiry
            return Ok(DecisionResult::Conflict);
        };

        let details = serde_json::json!({
            "decision": decision.as_str(),
            "feedback_id": feedback_id,
            "confidence": confidence,
        })
        .to_string();
        self.db.log_audit(
            "user",
            "recommendation_decided",
            Some("recommendation"),
            Some(id),
            Some(&details),
            now,
        )?;

        info!(
            recommendation_id = id,
            decision = decision.as_str(),
            status = status.as_str(),
            "Recorded decision"
        );
        Ok(DecisionResult::Recorded {
            feedback_id,
            confidence,
            status,
        })
    }

    /// Attach an outcome to a past decision. None if the decision does not exist.
    pub fn record_outcome(
        &self,
        feedback_id: i64,
        outcome: OutcomeStatus,
        notes: Option<&str>,
    ) -> Result<Option<i64>> {
        let id = self
            .db
            .insert_decision_outcome(feedback_id, outcome, notes, self.clock.now())?;
        if id.is_some() {
            info!(feedback_id, outcome = outcome.as_str(), "Recorded outcome");
        }
        Ok(id)
    }
}

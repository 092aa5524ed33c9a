//! Triage: rescore, flag overdue, recommend
//!
//! One pass over everything open:
//! 1. Recompute urgency for every pending/overdue obligation (one batched write)
//! 2. Flip pending obligations past their due date to overdue (one statement)
//! 3. Measure the 30-day surplus: cash on hand minus what falls due
//! 4. Expire stale active recommendations
//! 5. Run the rule ladder over obligations, disputes and legal deadlines and
//!    insert whatever is not already active
//!
//! Re-running without new data inserts nothing.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{ConfidencePolicy, DedupKey, TriagePolicy};
use crate::confidence::ConfidenceLearner;
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    Dispute, LegalDeadline, NewRecommendation, Obligation, ObligationCategory, RecType,
};
use crate::money::Money;
use crate::urgency::{self, UrgencyInput, UrgencyLevel};

pub const SHORTFALL_TITLE: &str = "Projected cash shortfall in the next 30 days";

/// Count of obligations per urgency level
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct LevelCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl LevelCounts {
    fn add(&mut self, level: UrgencyLevel) {
        match level {
            UrgencyLevel::Critical => self.critical += 1,
            UrgencyLevel::High => self.high += 1,
            UrgencyLevel::Medium => self.medium += 1,
            UrgencyLevel::Low => self.low += 1,
        }
    }
}

/// A recommendation inserted by this pass
#[derive(Debug, Clone, Serialize)]
pub struct CreatedRecommendation {
    pub id: i64,
    pub rec_type: RecType,
    pub priority: u8,
    pub title: String,
    pub confidence: f64,
}

/// Results of a triage pass
#[derive(Debug, Default, Serialize)]
pub struct TriageResult {
    pub scanned: usize,
    pub rescored: usize,
    pub marked_overdue: usize,
    pub expired: usize,
    pub cash_balance: Money,
    pub due_within_window: Money,
    pub surplus: Money,
    pub levels: LevelCounts,
    pub skipped_duplicates: usize,
    pub created: Vec<CreatedRecommendation>,
}

/// Stable content key: rec_type | target | action
pub fn content_key(rec: &NewRecommendation) -> String {
    let target = if let Some(id) = rec.obligation_id {
        format!("obligation:{}", id)
    } else if let Some(id) = rec.dispute_id {
        format!("dispute:{}", id)
    } else if let Some(id) = rec.legal_deadline_id {
        format!("legal_deadline:{}", id)
    } else {
        "-".to_string()
    };

    let mut hasher = Sha256::new();
    hasher.update(rec.rec_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(target.as_bytes());
    hasher.update(b"|");
    hasher.update(rec.action.as_bytes());
    hex::encode(hasher.finalize())
}

fn recommendation(
    rec_type: RecType,
    priority: u8,
    action: &str,
    title: String,
    reasoning: String,
) -> NewRecommendation {
    NewRecommendation {
        rec_type,
        priority,
        title,
        reasoning,
        action: action.to_string(),
        obligation_id: None,
        dispute_id: None,
        legal_deadline_id: None,
        payee: None,
        estimated_savings: Money::ZERO,
    }
}

fn due_phrase(ob: &Obligation) -> String {
    match ob.due_date {
        Some(d) => format!("due {}", d),
        None => "no due date".to_string(),
    }
}

/// Recommendations for one obligation. Rules are independent; any number may fire.
pub fn obligation_rules(
    ob: &Obligation,
    score: u8,
    level: UrgencyLevel,
    surplus: Money,
    policy: &TriagePolicy,
) -> Vec<NewRecommendation> {
    let amount = ob.amount_due.unwrap_or(Money::ZERO);
    let mut recs = Vec::new();

    let mut push = |mut rec: NewRecommendation| {
        rec.obligation_id = Some(ob.id);
        rec.payee = Some(ob.payee.clone());
        recs.push(rec);
    };

    if level == UrgencyLevel::Critical && !ob.auto_pay {
        push(recommendation(
            RecType::Payment,
            1,
            "pay_now",
            format!("Pay {} now", ob.payee),
            format!(
                "Urgency {}/100, {} {}, late fee {}",
                score,
                amount,
                due_phrase(ob),
                ob.late_fee
            ),
        ));
    }

    if level == UrgencyLevel::High && ob.negotiable && amount > policy.negotiate_min_amount {
        let savings = amount.scale(policy.negotiate_savings_rate);
        let mut rec = recommendation(
            RecType::Negotiate,
            2,
            "negotiate",
            format!("Negotiate with {}", ob.payee),
            format!(
                "{} {} is negotiable; a reduction could save about {}",
                amount,
                due_phrase(ob),
                savings
            ),
        );
        rec.estimated_savings = savings;
        push(rec);
    }

    if surplus.is_negative()
        && level == UrgencyLevel::Medium
        && !ob.auto_pay
        && !matches!(
            ob.category,
            ObligationCategory::Mortgage | ObligationCategory::Legal
        )
    {
        push(recommendation(
            RecType::Defer,
            3,
            "defer",
            format!("Consider deferring {}", ob.payee),
            format!(
                "Cash is {} short over the next 30 days; {} {} can wait",
                -surplus,
                amount,
                due_phrase(ob)
            ),
        ));
    }

    if ob.category == ObligationCategory::CreditCard && surplus < policy.minimum_payment_surplus {
        if let Some(min) = ob.minimum_option() {
            push(recommendation(
                RecType::Strategy,
                3,
                "pay_minimum",
                format!("Pay minimum on {}", ob.payee),
                format!(
                    "30-day surplus is {}; paying {} instead of {} keeps cash available",
                    surplus, min, amount
                ),
            ));
        }
    }

    recs
}

/// Follow-up for an open dispute with a next action
pub fn dispute_rule(dispute: &Dispute) -> Option<NewRecommendation> {
    let next_action = dispute
        .next_action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())?;

    let when = dispute
        .next_action_date
        .map(|d| format!(" by {}", d))
        .unwrap_or_default();
    let mut rec = recommendation(
        RecType::Dispute,
        2,
        "dispute_follow_up",
        format!("Follow up on dispute: {}", dispute.title),
        format!("Next action{}: {}", when, next_action),
    );
    rec.dispute_id = Some(dispute.id);
    rec.obligation_id = dispute.obligation_id;
    Some(rec)
}

/// Reminder for a legal deadline inside the window, including missed ones
pub fn legal_deadline_rule(
    deadline: &LegalDeadline,
    today: NaiveDate,
    policy: &TriagePolicy,
) -> Option<NewRecommendation> {
    let days = (deadline.deadline_date - today).num_days();
    if days > policy.legal_window_days {
        return None;
    }

    let priority = if days <= policy.legal_urgent_days { 1 } else { 2 };
    let reasoning = if days < 0 {
        format!("Deadline passed {} days ago ({})", -days, deadline.deadline_date)
    } else {
        format!("Due in {} days ({})", days, deadline.deadline_date)
    };
    let reasoning = match &deadline.case_ref {
        Some(case) => format!("{}; case {}", reasoning, case),
        None => reasoning,
    };

    let mut rec = recommendation(
        RecType::Legal,
        priority,
        "legal_deadline",
        format!("Legal deadline: {}", deadline.title),
        reasoning,
    );
    rec.legal_deadline_id = Some(deadline.id);
    Some(rec)
}

/// Triage orchestrator
pub struct TriageOrchestrator<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: TriagePolicy,
    confidence: ConfidencePolicy,
}

impl<'a> TriageOrchestrator<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self::with_config(db, clock, TriagePolicy::default(), ConfidencePolicy::default())
    }

    pub fn with_config(
        db: &'a Database,
        clock: &'a dyn Clock,
        config: TriagePolicy,
        confidence: ConfidencePolicy,
    ) -> Self {
        Self {
            db,
            clock,
            config,
            confidence,
        }
    }

    pub fn run_triage(&self) -> Result<TriageResult> {
        let today = self.clock.today();
        let now = self.clock.now();

        let obligations = self.db.list_open_obligations()?;
        let mut result = TriageResult {
            scanned: obligations.len(),
            ..Default::default()
        };

        let scored: Vec<(&Obligation, u8, UrgencyLevel)> = obligations
            .iter()
            .map(|ob| {
                let (score, level) = urgency::score(&UrgencyInput::from_obligation(ob), today);
                (ob, score, level)
            })
            .collect();
        for (_, _, level) in &scored {
            result.levels.add(*level);
        }

        let updates: Vec<(i64, u8)> = scored.iter().map(|(ob, s, _)| (ob.id, *s)).collect();
        result.rescored = self.db.update_urgency_scores(&updates, now)?;
        result.marked_overdue = self.db.mark_overdue(today, now)?;

        let window_end = today + Duration::days(self.config.surplus_window_days);
        result.cash_balance = self.db.cash_balance()?;
        result.due_within_window = obligations
            .iter()
            .filter(|ob| ob.due_date.is_some_and(|d| d <= window_end))
            .filter_map(|ob| ob.amount_due)
            .sum();
        result.surplus = result.cash_balance - result.due_within_window;

        let cutoff = now - Duration::days(self.config.recommendation_ttl_days);
        result.expired = self.db.expire_recommendations_before(cutoff)?;

        let mut candidates = Vec::new();
        for (ob, score, level) in &scored {
            candidates.extend(obligation_rules(ob, *score, *level, result.surplus, &self.config));
        }
        candidates.extend(self.db.list_open_disputes()?.iter().filter_map(dispute_rule));
        candidates.extend(
            self.db
                .list_pending_legal_deadlines()?
                .iter()
                .filter_map(|d| legal_deadline_rule(d, today, &self.config)),
        );
        if result.surplus.is_negative() {
            candidates.push(recommendation(
                RecType::Warning,
                1,
                "cash_shortfall",
                SHORTFALL_TITLE.to_string(),
                format!(
                    "Cash on hand {} against {} due within {} days",
                    result.cash_balance, result.due_within_window, self.config.surplus_window_days
                ),
            ));
        }

        let mut active: HashSet<String> = self.db.active_recommendation_keys(self.config.dedup_key)?;
        let learner = ConfidenceLearner::with_config(self.db, self.clock, self.confidence.clone());

        for rec in candidates {
            let key = content_key(&rec);
            let compared = match self.config.dedup_key {
                DedupKey::Title => rec.title.clone(),
                DedupKey::Content => key.clone(),
            };
            if !active.insert(compared) {
                result.skipped_duplicates += 1;
                continue;
            }

            let confidence = learner.compute_confidence(rec.rec_type, rec.payee.as_deref())?;
            let id = self.db.insert_recommendation(&rec, &key, confidence, now)?;
            debug!(
                recommendation_id = id,
                rec_type = rec.rec_type.as_str(),
                priority = rec.priority,
                title = %rec.title,
                "Created recommendation"
            );
            result.created.push(CreatedRecommendation {
                id,
                rec_type: rec.rec_type,
                priority: rec.priority,
                title: rec.title,
                confidence,
            });
        }

        info!(
            scanned = result.scanned,
            overdue = result.marked_overdue,
            expired = result.expired,
            surplus = %result.surplus,
            created = result.created.len(),
            skipped = result.skipped_duplicates,
            "Triage complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, obligation};

    fn today() -> NaiveDate {
        date(2025, 6, 1)
    }

    fn policy() -> TriagePolicy {
        TriagePolicy::default()
    }

    fn actions(recs: &[NewRecommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.action.as_str()).collect()
    }

    #[test]
    fn test_critical_pays_now_unless_autopay() {
        let mut ob = obligation(1, today());
        let recs = obligation_rules(&ob, 80, UrgencyLevel::Critical, Money::ZERO, &policy());
        assert_eq!(actions(&recs), vec!["pay_now"]);
        assert_eq!(recs[0].priority, 1);
        assert_eq!(recs[0].obligation_id, Some(1));

        ob.auto_pay = true;
        assert!(obligation_rules(&ob, 80, UrgencyLevel::Critical, Money::ZERO, &policy()).is_empty());
    }

    #[test]
    fn test_negotiate_threshold_and_savings() {
        let mut ob = obligation(1, today());
        ob.negotiable = true;
        ob.amount_due = Some(Money::from_dollars(1000.0));
        let recs = obligation_rules(&ob, 55, UrgencyLevel::High, Money::ZERO, &policy());
        assert_eq!(actions(&recs), vec!["negotiate"]);
        assert_eq!(recs[0].estimated_savings, Money::from_dollars(150.0));

        ob.amount_due = Some(Money::from_dollars(100.0));
        assert!(obligation_rules(&ob, 55, UrgencyLevel::High, Money::ZERO, &policy()).is_empty());
    }

    #[test]
    fn test_defer_needs_shortfall_and_excludes_mortgage() {
        let mut ob = obligation(1, today());
        let short = Money::from_dollars(-10.0);
        assert_eq!(
            actions(&obligation_rules(&ob, 35, UrgencyLevel::Medium, short, &policy())),
            vec!["defer"]
        );
        assert!(obligation_rules(&ob, 35, UrgencyLevel::Medium, Money::ZERO, &policy()).is_empty());

        ob.category = ObligationCategory::Mortgage;
        assert!(obligation_rules(&ob, 35, UrgencyLevel::Medium, short, &policy()).is_empty());
    }

    #[test]
    fn test_credit_card_minimum() {
        let mut ob = obligation(1, today());
        ob.category = ObligationCategory::CreditCard;
        ob.amount_minimum = Some(Money::from_dollars(25.0));

        let recs = obligation_rules(&ob, 10, UrgencyLevel::Low, Money::from_dollars(200.0), &policy());
        assert_eq!(actions(&recs), vec!["pay_minimum"]);
        assert_eq!(recs[0].rec_type, RecType::Strategy);

        assert!(
            obligation_rules(&ob, 10, UrgencyLevel::Low, Money::from_dollars(600.0), &policy())
                .is_empty()
        );
    }

    #[test]
    fn test_rules_stack() {
        let mut ob = obligation(1, today());
        ob.category = ObligationCategory::CreditCard;
        ob.amount_minimum = Some(Money::from_dollars(25.0));
        let recs = obligation_rules(&ob, 75, UrgencyLevel::Critical, Money::ZERO, &policy());
        assert_eq!(actions(&recs), vec!["pay_now", "pay_minimum"]);
    }

    #[test]
    fn test_legal_deadline_window() {
        let deadline = |days: i64| LegalDeadline {
            id: 7,
            title: "Answer complaint".into(),
            case_ref: Some("CV-1".into()),
            deadline_date: today() + Duration::days(days),
            completed: false,
        };
        assert_eq!(legal_deadline_rule(&deadline(2), today(), &policy()).map(|r| r.priority), Some(1));
        assert_eq!(legal_deadline_rule(&deadline(10), today(), &policy()).map(|r| r.priority), Some(2));
        assert_eq!(legal_deadline_rule(&deadline(-4), today(), &policy()).map(|r| r.priority), Some(1));
        assert!(legal_deadline_rule(&deadline(15), today(), &policy()).is_none());
    }

    #[test]
    fn test_dispute_needs_next_action() {
        let mut dispute = Dispute {
            id: 3,
            obligation_id: Some(1),
            title: "Double charge".into(),
            status: crate::models::DisputeStatus::Open,
            next_action: None,
            next_action_date: None,
        };
        assert!(dispute_rule(&dispute).is_none());

        dispute.next_action = Some("Call billing".into());
        let rec = dispute_rule(&dispute).unwrap();
        assert_eq!(rec.dispute_id, Some(3));
        assert_eq!(rec.priority, 2);
    }

    #[test]
    fn test_content_key_is_stable_and_targeted() {
        let ob = obligation(1, today());
        let a = obligation_rules(&ob, 80, UrgencyLevel::Critical, Money::ZERO, &policy());
        let b = obligation_rules(&ob, 90, UrgencyLevel::Critical, Money::ZERO, &policy());
        assert_eq!(content_key(&a[0]), content_key(&b[0]));
        assert_eq!(content_key(&a[0]).len(), 64);

        let other = obligation(2, today());
        let c = obligation_rules(&other, 80, UrgencyLevel::Critical, Money::ZERO, &policy());
        assert_ne!(content_key(&a[0]), content_key(&c[0]));
    }
}

//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::config::{DedupKey, EscalationPolicy, PlannerPolicy};
    use crate::money::Money;
    use crate::planner::{simulate, PlanInputs, PlanOptions};
    use crate::test_utils::{
        clock_on, date, seed_account, seed_inflow, seed_obligation, seed_obligation_with,
        seed_outflow,
    };
    use chrono::Duration;

    fn rec(title: &str, obligation_id: Option<i64>) -> NewRecommendation {
        NewRecommendation {
            rec_type: RecType::Payment,
            priority: 1,
            title: title.to_string(),
            reasoning: "test".to_string(),
            action: "pay_now".to_string(),
            obligation_id,
            dispute_id: None,
            legal_deadline_id: None,
            payee: Some("Comcast".to_string()),
            estimated_savings: Money::ZERO,
        }
    }

    fn empty_plan(clock: &FixedClock) -> PlanSimulation {
        simulate(
            &PlanInputs::default(),
            &PlanOptions::default(),
            &EscalationPolicy::default(),
            &PlannerPolicy::default(),
            clock.today(),
        )
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_accounts().unwrap().is_empty());
        assert!(db.list_open_obligations().unwrap().is_empty());
    }

    #[test]
    fn test_account_upsert_and_cash_balance() {
        let db = Database::in_memory().unwrap();

        let id = seed_account(&db, "Checking", AccountType::Checking, 1200.0);
        seed_account(&db, "Savings", AccountType::Savings, 300.5);
        seed_account(&db, "Visa", AccountType::Credit, -900.0);

        // Upsert by name updates the balance in place
        let id2 = seed_account(&db, "Checking", AccountType::Checking, 1000.0);
        assert_eq!(id, id2);
        assert_eq!(db.list_accounts().unwrap().len(), 3);

        assert_eq!(db.cash_balance().unwrap(), Money::from_dollars(1300.5));
    }

    #[test]
    fn test_obligation_round_trip() {
        let db = Database::in_memory().unwrap();

        let mut new = NewObligation::new(
            "County Tax",
            ObligationCategory::PropertyTax,
            Money::from_dollars(2400.0),
            date(2025, 4, 10),
        );
        new.recurrence = Recurrence::Quarterly;
        new.late_fee = Money::from_dollars(50.0);
        new.escalation_type = Some("legal".into());
        let id = seed_obligation_with(&db, new);

        let ob = db.get_obligation(id).unwrap().unwrap();
        assert_eq!(ob.payee, "County Tax");
        assert_eq!(ob.category, ObligationCategory::PropertyTax);
        assert_eq!(ob.recurrence, Recurrence::Quarterly);
        assert_eq!(ob.amount_due, Some(Money::from_dollars(2400.0)));
        assert_eq!(ob.status, ObligationStatus::Pending);
        assert_eq!(ob.escalation_type.as_deref(), Some("legal"));
    }

    #[test]
    fn test_dirty_obligation_rows_read_safely() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        conn.execute(
            "INSERT INTO obligations (payee, category, due_date, recurrence, late_fee) \
             VALUES ('Mystery', 'bogus', 'not-a-date', 'fortnightly', NULL)",
            [],
        )
        .unwrap();

        let obs = db.list_open_obligations().unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].category, ObligationCategory::Other);
        assert_eq!(obs[0].due_date, None);
        assert_eq!(obs[0].recurrence, Recurrence::OneTime);
        assert_eq!(obs[0].late_fee, Money::ZERO);
        assert_eq!(obs[0].amount_due, None);
    }

    #[test]
    fn test_batched_urgency_update_crosses_chunks() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        let scores: Vec<(i64, u8)> = (0..250)
            .map(|i| {
                let id = seed_obligation(
                    &db,
                    &format!("Payee {}", i),
                    ObligationCategory::Other,
                    10.0,
                    date(2025, 7, 1),
                );
                (id, (i % 100) as u8)
            })
            .collect();

        assert_eq!(db.update_urgency_scores(&scores, clock.now()).unwrap(), 250);
        let last = db.get_obligation(scores[249].0).unwrap().unwrap();
        assert_eq!(last.urgency_score, 49);
    }

    #[test]
    fn test_mark_overdue_only_flips_past_due_pending() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        let past = seed_obligation(&db, "Late", ObligationCategory::Utility, 50.0, date(2025, 5, 20));
        let future = seed_obligation(&db, "Soon", ObligationCategory::Utility, 50.0, date(2025, 6, 5));
        let deferred =
            seed_obligation(&db, "Parked", ObligationCategory::Utility, 50.0, date(2025, 5, 1));
        assert!(db.defer_obligation(deferred, clock.now()).unwrap());

        assert_eq!(db.mark_overdue(clock.today(), clock.now()).unwrap(), 1);
        assert_eq!(
            db.get_obligation(past).unwrap().unwrap().status,
            ObligationStatus::Overdue
        );
        assert_eq!(
            db.get_obligation(future).unwrap().unwrap().status,
            ObligationStatus::Pending
        );
        assert_eq!(
            db.get_obligation(deferred).unwrap().unwrap().status,
            ObligationStatus::Deferred
        );

        // Second pass is a no-op
        assert_eq!(db.mark_overdue(clock.today(), clock.now()).unwrap(), 0);
    }

    #[test]
    fn test_status_transitions() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let id = seed_obligation(&db, "Gym", ObligationCategory::Subscription, 40.0, date(2025, 6, 3));

        assert!(db.mark_obligation_paid(id, clock.now()).unwrap());
        let ob = db.get_obligation(id).unwrap().unwrap();
        assert_eq!(ob.status, ObligationStatus::Paid);
        assert_eq!(ob.urgency_score, 0);

        // Paid obligations cannot be deferred or disputed
        assert!(!db.defer_obligation(id, clock.now()).unwrap());
        assert!(!db.dispute_obligation(id, clock.now()).unwrap());
        assert!(db.list_open_obligations().unwrap().is_empty());
    }

    #[test]
    fn test_negative_transaction_rejected() {
        let db = Database::in_memory().unwrap();
        let account = seed_account(&db, "Checking", AccountType::Checking, 0.0);

        let result = db.insert_transaction(&NewTransaction {
            account_id: account,
            direction: Direction::Outflow,
            amount: Money::from_dollars(-5.0),
            counterparty: None,
            description: "BAD".into(),
            tx_date: date(2025, 6, 1),
        });
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_unlinked_outflows_window_and_order() {
        let db = Database::in_memory().unwrap();
        let account = seed_account(&db, "Checking", AccountType::Checking, 0.0);

        let old = seed_outflow(&db, account, "Old", 10.0, date(2025, 4, 1));
        let a = seed_outflow(&db, account, "A", 10.0, date(2025, 5, 20));
        let b = seed_outflow(&db, account, "B", 10.0, date(2025, 5, 28));
        seed_inflow(&db, account, "Employer", 100.0, date(2025, 5, 25));

        let txs = db.list_unlinked_outflows(date(2025, 5, 1), 10).unwrap();
        let ids: Vec<i64> = txs.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert!(!ids.contains(&old));

        let ob = seed_obligation(&db, "B", ObligationCategory::Other, 10.0, date(2025, 5, 28));
        assert!(db.link_transaction(b, ob).unwrap());
        // Links are never reassigned
        assert!(!db.link_transaction(b, ob).unwrap());
        assert_eq!(db.list_unlinked_outflows(date(2025, 5, 1), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_revenue_source_upsert_key() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        let mut new = NewRevenueSource {
            source: "manual".into(),
            description: "Consulting".into(),
            counterparty: "acme".into(),
            account_id: None,
            amount: Money::from_dollars(3000.0),
            cadence: RevenueCadence::Monthly,
            confidence: 0.9,
            verified_by: VerifiedBy::Manual,
            occurrences: 0,
            next_expected_date: Some(date(2025, 6, 15)),
        };
        let id = db.insert_revenue_source(&new, clock.now()).unwrap();

        // NULL account ids still match
        assert_eq!(db.find_revenue_source("manual", "acme", None).unwrap(), Some(id));
        assert_eq!(db.find_revenue_source("discovery", "acme", None).unwrap(), None);

        new.amount = Money::from_dollars(3500.0);
        assert!(db.update_revenue_measurements(id, &new, clock.now()).unwrap());
        let sources = db.list_revenue_sources(true).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].amount, Money::from_dollars(3500.0));

        assert!(db.set_revenue_source_active(id, false).unwrap());
        assert!(db.list_revenue_sources(true).unwrap().is_empty());
        assert_eq!(db.list_revenue_sources(false).unwrap().len(), 1);
    }

    #[test]
    fn test_recommendation_keys_and_expiry() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        db.insert_recommendation(&rec("Pay Comcast now", Some(1)), "key-1", 0.7, clock.now() - Duration::days(10))
            .unwrap();
        db.insert_recommendation(&rec("Pay Verizon now", Some(2)), "key-2", 0.7, clock.now())
            .unwrap();

        let titles = db.active_recommendation_keys(DedupKey::Title).unwrap();
        assert!(titles.contains("Pay Comcast now"));
        let keys = db.active_recommendation_keys(DedupKey::Content).unwrap();
        assert!(keys.contains("key-2"));

        assert_eq!(db.expire_recommendations_before(clock.now() - Duration::days(7)).unwrap(), 1);
        let active = db.list_recommendations(Some(RecStatus::Active)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Pay Verizon now");
        assert_eq!(db.list_recommendations(Some(RecStatus::Expired)).unwrap().len(), 1);
    }

    #[test]
    fn test_record_decision_once() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let id = db
            .insert_recommendation(&rec("Pay Comcast now", None), "k", 0.7, clock.now())
            .unwrap();

        let (feedback_id, status) = db
            .record_decision(id, Decision::Rejected, 0.7, clock.now())
            .unwrap()
            .unwrap();
        assert_eq!(status, RecStatus::Dismissed);

        // Already decided
        assert!(db
            .record_decision(id, Decision::Approved, 0.7, clock.now())
            .unwrap()
            .is_none());

        let fb = db.get_decision_feedback(feedback_id).unwrap().unwrap();
        assert_eq!(fb.decision, Decision::Rejected);
        assert_eq!(fb.payee.as_deref(), Some("Comcast"));
        assert_eq!(fb.outcome_status, None);

        db.insert_decision_outcome(feedback_id, OutcomeStatus::Failed, Some("bounced"), clock.now())
            .unwrap()
            .unwrap();
        let fb = db.get_decision_feedback(feedback_id).unwrap().unwrap();
        assert_eq!(fb.outcome_status, Some(OutcomeStatus::Failed));

        assert!(db
            .insert_decision_outcome(999, OutcomeStatus::Succeeded, None, clock.now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decision_counts_window_and_payee() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        for (i, decision) in [Decision::Approved, Decision::Approved, Decision::Rejected, Decision::Deferred]
            .into_iter()
            .enumerate()
        {
            let id = db
                .insert_recommendation(&rec(&format!("r{}", i), None), "k", 0.7, clock.now())
                .unwrap();
            db.record_decision(id, decision, 0.7, clock.now()).unwrap();
        }

        let since = clock.now() - Duration::days(90);
        let counts = db.decision_counts(RecType::Payment, None, since).unwrap();
        assert_eq!(counts, DecisionCounts { approved: 2, rejected: 1 });

        let payee = db.decision_counts(RecType::Payment, Some("COMCAST"), since).unwrap();
        assert_eq!(payee.total(), 3);

        let other = db.decision_counts(RecType::Legal, None, since).unwrap();
        assert_eq!(other.total(), 0);

        let later = db
            .decision_counts(RecType::Payment, None, clock.now() + Duration::days(1))
            .unwrap();
        assert_eq!(later.total(), 0);
    }

    #[test]
    fn test_plan_activation_single_active() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let plan = empty_plan(&clock);

        let a = db.insert_payment_plan(&plan, clock.now()).unwrap();
        let b = db.insert_payment_plan(&plan, clock.now()).unwrap();

        assert_eq!(
            db.activate_payment_plan(999, clock.now()).unwrap(),
            ActivationOutcome::NotFound
        );
        assert_eq!(
            db.activate_payment_plan(a, clock.now()).unwrap(),
            ActivationOutcome::Activated { abandoned: None }
        );
        assert_eq!(
            db.activate_payment_plan(a, clock.now()).unwrap(),
            ActivationOutcome::AlreadyActive
        );
        assert_eq!(
            db.activate_payment_plan(b, clock.now()).unwrap(),
            ActivationOutcome::Activated { abandoned: Some(a) }
        );
        // Abandoned plans stay abandoned
        assert_eq!(
            db.activate_payment_plan(a, clock.now()).unwrap(),
            ActivationOutcome::Conflict
        );

        let active = db.get_active_payment_plan().unwrap().unwrap();
        assert_eq!(active.id, b);
        assert_eq!(db.get_payment_plan(a).unwrap().unwrap().status, PlanStatus::Abandoned);
    }

    #[test]
    fn test_second_active_plan_rejected_by_index() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let plan = empty_plan(&clock);
        let a = db.insert_payment_plan(&plan, clock.now()).unwrap();
        let b = db.insert_payment_plan(&plan, clock.now()).unwrap();

        let conn = db.conn().unwrap();
        conn.execute("UPDATE payment_plans SET status = 'active' WHERE id = ?", [a])
            .unwrap();
        assert!(conn
            .execute("UPDATE payment_plans SET status = 'active' WHERE id = ?", [b])
            .is_err());
    }

    #[test]
    fn test_plan_json_round_trip() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let mut plan = empty_plan(&clock);
        plan.warnings.push(PlanWarning {
            date: clock.today(),
            obligation_id: Some(4),
            severity: WarningSeverity::Critical,
            message: "short".into(),
        });

        let id = db.insert_payment_plan(&plan, clock.now()).unwrap();
        let stored = db.get_payment_plan(id).unwrap().unwrap();
        assert_eq!(stored.status, PlanStatus::Draft);
        assert_eq!(stored.simulation.strategy, Strategy::Optimal);
        assert_eq!(stored.simulation.warnings.len(), 1);
        assert_eq!(stored.simulation.warnings[0].severity, WarningSeverity::Critical);
    }

    #[test]
    fn test_projection_replace() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);
        let point = |day: i64, balance: f64| ProjectionPoint {
            projection_date: clock.today() + Duration::days(day),
            day_index: day,
            inflow: Money::ZERO,
            outflow: Money::ZERO,
            balance: Money::from_dollars(balance),
            confidence: 0.9,
        };

        db.replace_projections(&[point(0, 100.0), point(7, 90.0)], clock.now())
            .unwrap();
        db.replace_projections(&[point(0, 200.0)], clock.now()).unwrap();

        let points = db.list_projections().unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].balance, Money::from_dollars(200.0));

        // A regeneration two days later purges the older rows
        let later = FixedClock::on(clock.today() + Duration::days(2));
        db.replace_projections(&[point(2, 50.0)], later.now()).unwrap();
        assert_eq!(db.list_projections().unwrap().len(), 1);
    }

    #[test]
    fn test_disputes_and_deadlines() {
        let db = Database::in_memory().unwrap();

        let d = db
            .insert_dispute(None, "Double charge", Some("Call billing"), Some(date(2025, 6, 3)))
            .unwrap();
        assert_eq!(db.list_open_disputes().unwrap().len(), 1);
        assert!(db.resolve_dispute(d).unwrap());
        assert!(db.list_open_disputes().unwrap().is_empty());

        let late = db.insert_legal_deadline("Reply", None, date(2025, 6, 20)).unwrap();
        let soon = db.insert_legal_deadline("File", Some("CV-9"), date(2025, 6, 2)).unwrap();
        let ids: Vec<i64> = db
            .list_pending_legal_deadlines()
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![soon, late]);

        assert!(db.complete_legal_deadline(soon).unwrap());
        assert_eq!(db.list_pending_legal_deadlines().unwrap().len(), 1);
    }

    #[test]
    fn test_audit_and_run_log() {
        let db = Database::in_memory().unwrap();
        let clock = clock_on(2025, 6, 1);

        db.log_audit("matcher", "transaction_matched", Some("obligation"), Some(3), None, clock.now())
            .unwrap();
        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor, "matcher");
        assert_eq!(entries[0].timestamp, clock.now());

        let run = db.start_automation_run("manual", clock.now()).unwrap();
        let stored = db.get_automation_run(run).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert!(stored.phases.is_empty());

        let phases = vec![PhaseOutcome {
            phase: "match".into(),
            ok: true,
            summary: Some("0 matched".into()),
            error: None,
            duration_ms: 3,
        }];
        db.finish_automation_run(run, RunStatus::Completed, &phases, None, clock.now())
            .unwrap();
        let stored = db.get_automation_run(run).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored.phases.len(), 1);
        assert_eq!(db.list_automation_runs(5).unwrap().len(), 1);
    }
}

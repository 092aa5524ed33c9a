//! Integration tests for settle-core
//!
//! These tests exercise the engine end to end against a scratch database:
//! reconcile → triage → project → discover revenue → plan → decide.

use chrono::{Duration, NaiveDate};
use settle_core::{
    config::{DedupKey, PolicyConfig, TriagePolicy},
    confidence::ConfidenceLearner,
    db::Database,
    matcher::TransactionMatcher,
    models::{
        AccountType, ActivationOutcome, Decision, DecisionResult, Direction, NewObligation, NewTransaction,
        ObligationCategory, ObligationStatus, OutcomeStatus, PlanAction, RecStatus, RecType,
        Recurrence, RevenueCadence, Strategy,
    },
    planner::{PaymentPlanner, PlanOptions},
    projector::CashFlowProjector,
    revenue::RevenueDiscovery,
    triage::{TriageOrchestrator, SHORTFALL_TITLE},
    Clock, FixedClock, Money,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
}

fn clock() -> FixedClock {
    FixedClock::on(d(2025, 6, 1))
}

fn account(db: &Database, name: &str, account_type: AccountType, dollars: f64) -> i64 {
    db.upsert_account(name, account_type, Money::from_dollars(dollars))
        .expect("Failed to create account")
}

fn obligation(db: &Database, payee: &str, category: ObligationCategory, dollars: f64, due: NaiveDate) -> i64 {
    db.insert_obligation(&NewObligation::new(
        payee,
        category,
        Money::from_dollars(dollars),
        due,
    ))
    .expect("Failed to create obligation")
}

fn transaction(
    db: &Database,
    account_id: i64,
    direction: Direction,
    counterparty: &str,
    dollars: f64,
    on: NaiveDate,
) -> i64 {
    db.insert_transaction(&NewTransaction {
        account_id,
        direction,
        amount: Money::from_dollars(dollars),
        counterparty: Some(counterparty.to_string()),
        description: counterparty.to_uppercase(),
        tx_date: on,
    })
    .expect("Failed to create transaction")
}

// =============================================================================
// Matcher
// =============================================================================

#[test]
fn test_matcher_links_and_pays() {
    let db = Database::in_memory().expect("Failed to create database");
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 2000.0);

    let comcast = obligation(&db, "Comcast", ObligationCategory::Utility, 89.99, d(2025, 5, 28));
    let pge = obligation(&db, "Pacific Gas Electric", ObligationCategory::Utility, 140.0, d(2025, 5, 25));
    let untouched = obligation(&db, "State Farm", ObligationCategory::Insurance, 220.0, d(2025, 6, 15));

    let tx1 = transaction(&db, checking, Direction::Outflow, "Comcast Cable", 89.99, d(2025, 5, 27));
    transaction(&db, checking, Direction::Outflow, "PACIFIC GAS ELEC", 138.0, d(2025, 5, 24));
    transaction(&db, checking, Direction::Outflow, "Trader Joes", 89.99, d(2025, 5, 27));

    let result = TransactionMatcher::new(&db, &clock)
        .match_transactions()
        .expect("Matching failed");

    assert_eq!(result.scanned, 3);
    assert_eq!(result.matched, 2);
    assert_eq!(result.paid, 2);

    let ob = db.get_obligation(comcast).unwrap().unwrap();
    assert_eq!(ob.status, ObligationStatus::Paid);
    assert_eq!(ob.urgency_score, 0);
    assert_eq!(db.get_transaction(tx1).unwrap().unwrap().obligation_id, Some(comcast));
    assert_eq!(db.get_obligation(pge).unwrap().unwrap().status, ObligationStatus::Paid);
    assert_eq!(
        db.get_obligation(untouched).unwrap().unwrap().status,
        ObligationStatus::Pending
    );

    let audit = db.list_audit_log(10).unwrap();
    assert_eq!(
        audit.iter().filter(|e| e.action == "transaction_matched").count(),
        2
    );
}

#[test]
fn test_matcher_is_idempotent() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 2000.0);
    obligation(&db, "Comcast", ObligationCategory::Utility, 89.99, d(2025, 5, 28));
    transaction(&db, checking, Direction::Outflow, "Comcast", 89.99, d(2025, 5, 28));

    let matcher = TransactionMatcher::new(&db, &clock);
    assert_eq!(matcher.match_transactions().unwrap().matched, 1);

    let second = matcher.match_transactions().unwrap();
    assert_eq!(second.matched, 0);
    assert_eq!(second.scanned, 0);
}

#[test]
fn test_matcher_claims_each_obligation_once() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 2000.0);
    obligation(&db, "Netflix", ObligationCategory::Subscription, 15.49, d(2025, 5, 20));

    // Two identical candidate payments
    transaction(&db, checking, Direction::Outflow, "Netflix", 15.49, d(2025, 5, 20));
    transaction(&db, checking, Direction::Outflow, "Netflix", 15.49, d(2025, 5, 21));

    let result = TransactionMatcher::new(&db, &clock).match_transactions().unwrap();
    assert_eq!(result.matched, 1);

    let mut ids: Vec<i64> = result.matches.iter().map(|m| m.obligation_id).collect();
    ids.dedup();
    assert_eq!(ids.len(), result.matches.len());
}

#[test]
fn test_matcher_ignores_old_and_inflows() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 2000.0);
    obligation(&db, "Comcast", ObligationCategory::Utility, 89.99, d(2025, 3, 28));
    transaction(&db, checking, Direction::Outflow, "Comcast", 89.99, d(2025, 3, 28));
    transaction(&db, checking, Direction::Inflow, "Comcast", 89.99, d(2025, 5, 28));

    let result = TransactionMatcher::new(&db, &clock).match_transactions().unwrap();
    assert_eq!(result.scanned, 0);
    assert_eq!(result.matched, 0);
}

// =============================================================================
// Triage
// =============================================================================

#[test]
fn test_triage_scores_marks_and_recommends() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    account(&db, "Checking", AccountType::Checking, 100.0);

    // 60 days overdue legal bill with a fee: critical
    let mut legal = NewObligation::new(
        "Court Clerk",
        ObligationCategory::Legal,
        Money::from_dollars(400.0),
        clock.today() - Duration::days(60),
    );
    legal.late_fee = Money::from_dollars(100.0);
    let legal = db.insert_obligation(&legal).unwrap();

    obligation(&db, "Electric Co", ObligationCategory::Utility, 120.0, clock.today() + Duration::days(30));

    let result = TriageOrchestrator::new(&db, &clock).run_triage().unwrap();

    assert_eq!(result.scanned, 2);
    assert_eq!(result.marked_overdue, 1);
    assert!(result.surplus.is_negative());

    let ob = db.get_obligation(legal).unwrap().unwrap();
    assert_eq!(ob.status, ObligationStatus::Overdue);
    assert_eq!(ob.urgency_score, 95);

    let titles: Vec<&str> = result.created.iter().map(|r| r.title.as_str()).collect();
    assert!(titles.contains(&"Pay Court Clerk now"));
    assert!(titles.contains(&SHORTFALL_TITLE));

    // Emission confidence is the base confidence without history
    let pay = result
        .created
        .iter()
        .find(|r| r.rec_type == RecType::Payment)
        .unwrap();
    assert_eq!(pay.confidence, 0.70);
}

#[test]
fn test_triage_rerun_creates_nothing() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    account(&db, "Checking", AccountType::Checking, 50.0);
    obligation(&db, "Landlord", ObligationCategory::Mortgage, 1500.0, clock.today() + Duration::days(1));

    let triage = TriageOrchestrator::new(&db, &clock);
    let first = triage.run_triage().unwrap();
    assert!(!first.created.is_empty());

    let second = triage.run_triage().unwrap();
    assert!(second.created.is_empty());
    assert_eq!(second.skipped_duplicates, first.created.len());
    assert_eq!(
        db.list_recommendations(Some(RecStatus::Active)).unwrap().len(),
        first.created.len()
    );
}

#[test]
fn test_triage_content_dedup_and_expiry() {
    let db = Database::in_memory().unwrap();
    let start = clock();
    account(&db, "Checking", AccountType::Checking, 50.0);
    obligation(&db, "Landlord", ObligationCategory::Mortgage, 1500.0, start.today() + Duration::days(1));

    let policy = TriagePolicy {
        dedup_key: DedupKey::Content,
        ..Default::default()
    };
    let config = PolicyConfig::default();

    let first = TriageOrchestrator::with_config(&db, &start, policy.clone(), config.confidence.clone())
        .run_triage()
        .unwrap();
    assert!(!first.created.is_empty());

    // Eight days later the old recommendations expire and are re-issued
    let later = FixedClock::on(start.today() + Duration::days(8));
    let second = TriageOrchestrator::with_config(&db, &later, policy, config.confidence)
        .run_triage()
        .unwrap();
    assert_eq!(second.expired, first.created.len());
    assert!(!second.created.is_empty());
}

#[test]
fn test_triage_disputes_and_legal_deadlines() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    account(&db, "Checking", AccountType::Checking, 10_000.0);

    db.insert_dispute(None, "Duplicate charge", Some("Send statement"), None)
        .unwrap();
    db.insert_dispute(None, "Waiting", None, None).unwrap();
    db.insert_legal_deadline("Answer complaint", Some("CV-12"), clock.today() + Duration::days(2))
        .unwrap();
    db.insert_legal_deadline("Discovery", None, clock.today() + Duration::days(40))
        .unwrap();

    let result = TriageOrchestrator::new(&db, &clock).run_triage().unwrap();
    let by_type = |t: RecType| result.created.iter().filter(|r| r.rec_type == t).count();
    assert_eq!(by_type(RecType::Dispute), 1);
    assert_eq!(by_type(RecType::Legal), 1);
    assert_eq!(by_type(RecType::Warning), 0);

    let legal = result
        .created
        .iter()
        .find(|r| r.rec_type == RecType::Legal)
        .unwrap();
    assert_eq!(legal.priority, 1);
}

// =============================================================================
// Projection
// =============================================================================

#[test]
fn test_projection_balances_and_persistence() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 1000.0);
    account(&db, "Savings", AccountType::Savings, 500.0);
    account(&db, "Visa", AccountType::Credit, -2000.0);

    // 900 of inflow in the trailing 90 days: 10 per day
    transaction(&db, checking, Direction::Inflow, "Employer", 900.0, clock.today() - Duration::days(20));

    let mut rent = NewObligation::new(
        "Landlord",
        ObligationCategory::Mortgage,
        Money::from_dollars(600.0),
        d(2025, 6, 5),
    );
    rent.recurrence = Recurrence::Monthly;
    db.insert_obligation(&rent).unwrap();
    obligation(&db, "Old Bill", ObligationCategory::Other, 50.0, d(2025, 5, 1));

    let result = CashFlowProjector::new(&db, &clock).generate_projections().unwrap();

    assert_eq!(result.starting_balance, Money::from_dollars(1500.0));
    assert_eq!(result.daily_inflow, Money::from_dollars(10.0));
    // Overdue one-time bill lands on day 0, rent three times in the horizon
    assert_eq!(result.total_outflows, Money::from_dollars(1850.0));
    assert_eq!(
        result.ending_balance,
        Money::from_dollars(1500.0 + 900.0 - 1850.0)
    );

    let stored = db.list_projections().unwrap();
    assert_eq!(stored.len(), result.points.len());
    assert_eq!(stored[0].day_index, 0);
    assert_eq!(stored[0].outflow, Money::from_dollars(50.0));
    assert_eq!(stored.last().unwrap().day_index, 89);

    // Regenerating replaces rather than appends
    CashFlowProjector::new(&db, &clock).generate_projections().unwrap();
    assert_eq!(db.list_projections().unwrap().len(), stored.len());
}

#[test]
fn test_projection_without_data_is_zero() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let result = CashFlowProjector::new(&db, &clock).generate_projections().unwrap();
    assert_eq!(result.starting_balance, Money::ZERO);
    assert_eq!(result.daily_inflow, Money::ZERO);
    assert_eq!(result.ending_balance, Money::ZERO);
}

// =============================================================================
// Revenue discovery
// =============================================================================

#[test]
fn test_revenue_discovery_and_upsert() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Main Checking", AccountType::Checking, 0.0);

    for month in 1..=5 {
        transaction(&db, checking, Direction::Inflow, "Airbnb Payments", 1200.0, d(2025, month, 10));
        transaction(&db, checking, Direction::Inflow, "Online Transfer from Savings", 500.0, d(2025, month, 12));
    }
    // Two months of an unknown, varying payer
    transaction(&db, checking, Direction::Inflow, "J Doe", 100.0, d(2025, 3, 3));
    transaction(&db, checking, Direction::Inflow, "J Doe", 400.0, d(2025, 4, 3));
    // One-off
    transaction(&db, checking, Direction::Inflow, "Tax Refund", 900.0, d(2025, 4, 20));

    let discovery = RevenueDiscovery::new(&db, &clock);
    let result = discovery.discover_revenue_sources().unwrap();

    assert_eq!(result.excluded, 5);
    assert_eq!(result.inserted, 2);

    let airbnb = result
        .sources
        .iter()
        .find(|s| s.counterparty == "airbnb payments")
        .unwrap();
    assert_eq!(airbnb.amount, Money::from_dollars(1200.0));
    assert_eq!(airbnb.cadence, RevenueCadence::Monthly);
    assert_eq!(airbnb.confidence, 0.95);
    assert_eq!(airbnb.next_expected_date, d(2025, 6, 10));

    let doe = result
        .sources
        .iter()
        .find(|s| s.counterparty == "j doe")
        .unwrap();
    assert_eq!(doe.cadence, RevenueCadence::Irregular);
    assert!(doe.confidence > 0.0 && doe.confidence <= 0.45);
    // Rolled forward past today
    assert!(doe.next_expected_date >= clock.today());

    // Second pass updates instead of inserting
    let again = discovery.discover_revenue_sources().unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.updated, 2);
    assert_eq!(db.list_revenue_sources(false).unwrap().len(), 2);
}

// =============================================================================
// Payment plans
// =============================================================================

#[test]
fn test_plan_generation_save_and_activate() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    let checking = account(&db, "Checking", AccountType::Checking, 800.0);
    obligation(&db, "Electric Co", ObligationCategory::Utility, 150.0, d(2025, 6, 10));
    obligation(&db, "Hospital", ObligationCategory::Medical, 2000.0, d(2025, 6, 12));

    let rs = settle_core::models::NewRevenueSource {
        source: "manual".into(),
        description: "Salary".into(),
        counterparty: "employer".into(),
        account_id: Some(checking),
        amount: Money::from_dollars(1000.0),
        cadence: RevenueCadence::Biweekly,
        confidence: 0.95,
        verified_by: settle_core::models::VerifiedBy::Manual,
        occurrences: 0,
        next_expected_date: Some(d(2025, 6, 6)),
    };
    db.insert_revenue_source(&rs, clock.now()).unwrap();

    let planner = PaymentPlanner::new(&db, &clock);
    let plan = planner
        .generate_payment_plan(&PlanOptions::with_strategy(Strategy::Optimal))
        .unwrap();

    assert_eq!(plan.starting_balance, Money::from_dollars(800.0));
    // Biweekly from June 6 within 90 days: 7 paychecks
    assert_eq!(plan.total_inflows, Money::from_dollars(7000.0));
    assert_eq!(
        plan.ending_balance,
        plan.starting_balance + plan.total_inflows - plan.total_outflows
    );
    let hospital = plan.schedule.iter().find(|e| e.payee == "Hospital").unwrap();
    assert_eq!(hospital.action, PlanAction::AtRisk);
    assert!(plan.schedule.iter().all(|e| e.account_id == Some(checking)));

    let id = planner.save_payment_plan(&plan).unwrap();
    assert_eq!(
        planner.activate_payment_plan(id).unwrap(),
        ActivationOutcome::Activated { abandoned: None }
    );
    assert_eq!(db.get_active_payment_plan().unwrap().unwrap().id, id);
    assert!(db
        .list_audit_log(10)
        .unwrap()
        .iter()
        .any(|e| e.action == "plan_activated"));
}

#[test]
fn test_plan_strategy_ordering_with_grace() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    account(&db, "Checking", AccountType::Checking, 700.0);

    let mut big = NewObligation::new(
        "Contractor",
        ObligationCategory::Other,
        Money::from_dollars(1200.0),
        d(2025, 6, 5),
    );
    big.grace_period_days = 120;
    big.late_fee = Money::from_dollars(60.0);
    db.insert_obligation(&big).unwrap();

    let planner = PaymentPlanner::new(&db, &clock);
    let conservative = planner
        .generate_payment_plan(&PlanOptions::with_strategy(Strategy::Conservative))
        .unwrap();
    let aggressive = planner
        .generate_payment_plan(&PlanOptions::with_strategy(Strategy::Aggressive))
        .unwrap();

    assert!(aggressive.ending_balance >= conservative.ending_balance);
    assert_eq!(conservative.schedule[0].action, PlanAction::AtRisk);
    assert_eq!(conservative.late_fees_risked, Money::from_dollars(60.0));

    // The grace deadline falls past the horizon, so the fee is never risked
    assert_eq!(aggressive.schedule.len(), 1);
    assert_eq!(aggressive.schedule[0].action, PlanAction::GraceDeferred);
    assert_eq!(aggressive.late_fees_risked, Money::ZERO);
}

// =============================================================================
// Decisions and confidence
// =============================================================================

#[test]
fn test_decisions_feed_confidence() {
    let db = Database::in_memory().unwrap();
    let clock = clock();
    account(&db, "Checking", AccountType::Checking, 10.0);

    let learner = ConfidenceLearner::new(&db, &clock);
    assert_eq!(learner.compute_confidence(RecType::Payment, None).unwrap(), 0.70);

    // Six critical obligations -> six "pay now" recommendations
    for i in 0..6 {
        let mut ob = NewObligation::new(
            &format!("Creditor {}", i),
            ObligationCategory::Legal,
            Money::from_dollars(100.0),
            clock.today() - Duration::days(40),
        );
        ob.late_fee = Money::from_dollars(60.0);
        db.insert_obligation(&ob).unwrap();
    }
    TriageOrchestrator::new(&db, &clock).run_triage().unwrap();

    let payments: Vec<i64> = db
        .list_recommendations(Some(RecStatus::Active))
        .unwrap()
        .into_iter()
        .filter(|r| r.rec_type == RecType::Payment)
        .map(|r| r.id)
        .collect();
    assert_eq!(payments.len(), 6);

    let mut feedback = Vec::new();
    for id in &payments[..5] {
        match learner.decide_recommendation(*id, Decision::Approved).unwrap() {
            DecisionResult::Recorded { feedback_id, status, .. } => {
                assert_eq!(status, RecStatus::Completed);
                feedback.push(feedback_id);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // Five approvals: 0.5 * 0.70 + 0.5 * 1.0
    let c = learner.compute_confidence(RecType::Payment, None).unwrap();
    assert!((c - 0.85).abs() < 1e-9);
    // Untouched types keep their base
    assert_eq!(learner.compute_confidence(RecType::Negotiate, None).unwrap(), 0.55);

    assert_eq!(
        learner.decide_recommendation(payments[0], Decision::Rejected).unwrap(),
        DecisionResult::Conflict
    );
    assert_eq!(
        learner.decide_recommendation(9999, Decision::Approved).unwrap(),
        DecisionResult::NotFound
    );

    assert!(learner
        .record_outcome(feedback[0], OutcomeStatus::Succeeded, Some("paid on time"))
        .unwrap()
        .is_some());
    assert!(learner
        .record_outcome(9999, OutcomeStatus::Failed, None)
        .unwrap()
        .is_none());
    // Outcomes do not move confidence
    let after = learner.compute_confidence(RecType::Payment, None).unwrap();
    assert_eq!(after, c);
}

#[test]
fn test_policy_file_drives_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.toml");
    std::fs::write(
        &path,
        r#"
[planner]
horizon_days = 30

[confidence.base]
payment = 0.9
"#,
    )
    .unwrap();

    let policy = PolicyConfig::load(Some(path.as_path())).unwrap();
    let db = Database::in_memory().unwrap();
    let clock = clock();

    let learner = ConfidenceLearner::with_config(&db, &clock, policy.confidence.clone());
    assert_eq!(learner.compute_confidence(RecType::Payment, None).unwrap(), 0.9);

    let plan = PaymentPlanner::with_config(&db, &clock, policy.planner.clone(), policy.escalation.clone())
        .generate_payment_plan(&PlanOptions::default())
        .unwrap();
    assert_eq!(plan.horizon_days, 30);
}

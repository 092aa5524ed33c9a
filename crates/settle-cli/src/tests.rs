//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use settle_core::db::Database;
use settle_core::models::{
    AccountType, ObligationCategory, ObligationStatus, PlanStatus, RecStatus, RunStatus, Strategy,
};
use settle_core::test_utils::{clock_on, date, seed_account, seed_obligation, seed_outflow};
use settle_core::{FixedClock, Money, PolicyConfig};

use crate::commands::{self, truncate, ObligationArgs};

fn setup() -> (Database, FixedClock) {
    (Database::in_memory().unwrap(), clock_on(2025, 6, 1))
}

fn obligation_args(payee: &str, amount: f64, due: &str, category: &str) -> ObligationArgs {
    ObligationArgs {
        payee: payee.to_string(),
        amount,
        due: due.to_string(),
        category: category.to_string(),
        minimum: None,
        recurrence: "none".to_string(),
        late_fee: 0.0,
        grace_days: 0,
        escalation: None,
        credit_impact: 0,
        negotiable: false,
        auto_pay: false,
    }
}

// ========== Helpers ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("exactly10!", 10), "exactly10!");
    assert_eq!(truncate("this is too long", 10), "this is...");
    assert_eq!(truncate("café au lait", 6), "caf...");
}

#[test]
fn test_parse_date() {
    assert_eq!(commands::parse_date("2025-06-01").unwrap(), date(2025, 6, 1));
    assert!(commands::parse_date("06/01/2025").is_err());
    assert!(commands::parse_date("2025-02-30").is_err());
}

#[test]
fn test_plan_options() {
    let options = commands::plan_options(
        "Aggressive",
        Some(60),
        &[3, 4],
        &[5],
        &["7=125.50".to_string()],
    )
    .unwrap();
    assert_eq!(options.strategy, Strategy::Aggressive);
    assert_eq!(options.horizon_days, Some(60));
    assert!(options.defer_ids.contains(&3) && options.defer_ids.contains(&4));
    assert!(options.pay_early_ids.contains(&5));
    assert_eq!(options.custom_amounts.get(&7), Some(&Money::from_cents(12550)));
}

#[test]
fn test_plan_options_rejects_bad_input() {
    assert!(commands::plan_options("reckless", None, &[], &[], &[]).is_err());
    assert!(commands::plan_options("optimal", Some(0), &[], &[], &[]).is_err());
    assert!(commands::plan_options("optimal", Some(100_000_000), &[], &[], &[]).is_err());
    assert!(commands::plan_options("optimal", Some(3650), &[], &[], &[]).is_ok());
    assert!(commands::plan_options("optimal", None, &[], &[], &["7".to_string()]).is_err());
    assert!(commands::plan_options("optimal", None, &[], &[], &["x=1".to_string()]).is_err());
    assert!(commands::plan_options("optimal", None, &[], &[], &["7=-5".to_string()]).is_err());
}

#[test]
fn test_load_policy() {
    assert!(commands::load_policy(None).is_ok());

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(commands::load_policy(Some(missing.as_path())).is_err());

    let path = dir.path().join("policy.toml");
    std::fs::write(&path, "[triage]\ndedup_key = \"content\"\n").unwrap();
    let policy = commands::load_policy(Some(path.as_path())).unwrap();
    assert_eq!(policy.triage.dedup_key, settle_core::DedupKey::Content);

    std::fs::write(&path, "[triage]\ndedup_key = \"nonsense\"\n").unwrap();
    assert!(commands::load_policy(Some(path.as_path())).is_err());
}

#[test]
fn test_schedule_hours_from_flag() {
    assert_eq!(commands::schedule_hours(Some(24)), Some(24));
    assert_eq!(commands::schedule_hours(Some(0)), None);
}

#[test]
fn test_schedule_interval_bounds() {
    assert_eq!(
        commands::schedule_interval(24).unwrap(),
        std::time::Duration::from_secs(86_400)
    );
    assert!(commands::schedule_interval(u64::MAX).is_err());
    assert!(commands::schedule_interval(u64::MAX / 3600 + 1).is_err());
}

// ========== Accounts and Obligations ==========

#[test]
fn test_cmd_accounts_set_and_list() {
    let (db, _) = setup();
    commands::cmd_accounts_set(&db, "Checking", "checking", 1200.0).unwrap();
    commands::cmd_accounts_set(&db, "Checking", "checking", 800.0).unwrap();
    commands::cmd_accounts_set(&db, "Visa", "credit", -300.0).unwrap();

    let accounts = db.list_accounts().unwrap();
    assert_eq!(accounts.len(), 2);
    assert_eq!(db.cash_balance().unwrap(), Money::from_dollars(800.0));

    assert!(commands::cmd_accounts_list(&db, false).is_ok());
    assert!(commands::cmd_accounts_list(&db, true).is_ok());
    assert!(commands::cmd_accounts_set(&db, "Piggy", "jar", 1.0).is_err());
}

#[test]
fn test_cmd_obligations_add() {
    let (db, _) = setup();
    let mut args = obligation_args("  Visa  ", 1500.0, "2025-06-20", "credit_card");
    args.minimum = Some(35.0);
    args.recurrence = "monthly".to_string();
    args.late_fee = 40.0;
    args.grace_days = 10;
    args.escalation = Some("Collections".to_string());
    args.credit_impact = 150;
    args.negotiable = true;
    commands::cmd_obligations_add(&db, &args).unwrap();

    let obligations = db.list_open_obligations().unwrap();
    assert_eq!(obligations.len(), 1);
    let ob = &obligations[0];
    assert_eq!(ob.payee, "Visa");
    assert_eq!(ob.category, ObligationCategory::CreditCard);
    assert_eq!(ob.amount_minimum, Some(Money::from_dollars(35.0)));
    assert_eq!(ob.late_fee, Money::from_dollars(40.0));
    assert_eq!(ob.grace_period_days, 10);
    assert_eq!(ob.escalation_type.as_deref(), Some("collections"));
    assert_eq!(ob.credit_impact_score, 100);
    assert!(ob.negotiable);

    assert!(commands::cmd_obligations_list(&db, None, false).is_ok());
    assert!(commands::cmd_obligations_list(&db, Some("pending"), true).is_ok());
    assert!(commands::cmd_obligations_list(&db, Some("lost"), false).is_err());
}

#[test]
fn test_cmd_obligations_add_rejects_bad_input() {
    let (db, _) = setup();
    let bad_category = obligation_args("Visa", 10.0, "2025-06-20", "gambling");
    assert!(commands::cmd_obligations_add(&db, &bad_category).is_err());

    let bad_date = obligation_args("Visa", 10.0, "June 20", "other");
    assert!(commands::cmd_obligations_add(&db, &bad_date).is_err());

    let blank = obligation_args("   ", 10.0, "2025-06-20", "other");
    assert!(commands::cmd_obligations_add(&db, &blank).is_err());

    let negative = obligation_args("Visa", -10.0, "2025-06-20", "other");
    assert!(commands::cmd_obligations_add(&db, &negative).is_err());

    assert!(db.list_obligations(None).unwrap().is_empty());
}

#[test]
fn test_cmd_obligations_status_changes() {
    let (db, clock) = setup();
    let a = seed_obligation(&db, "Gym", ObligationCategory::Subscription, 40.0, date(2025, 6, 5));
    let b = seed_obligation(&db, "Clinic", ObligationCategory::Medical, 300.0, date(2025, 6, 9));

    commands::cmd_obligations_defer(&db, &clock, a).unwrap();
    assert_eq!(db.get_obligation(a).unwrap().unwrap().status, ObligationStatus::Deferred);
    // Deferred obligations cannot be deferred again
    assert!(commands::cmd_obligations_defer(&db, &clock, a).is_err());

    commands::cmd_obligations_dispute(&db, &clock, b).unwrap();
    commands::cmd_obligations_pay(&db, &clock, b).unwrap();
    let paid = db.get_obligation(b).unwrap().unwrap();
    assert_eq!(paid.status, ObligationStatus::Paid);
    assert_eq!(paid.urgency_score, 0);

    assert!(commands::cmd_obligations_pay(&db, &clock, 999).is_err());

    let actions: Vec<String> = db
        .list_audit_log(10)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert!(actions.contains(&"obligation_deferred".to_string()));
    assert!(actions.contains(&"obligation_paid".to_string()));
}

#[test]
fn test_cmd_transaction_add() {
    let (db, _) = setup();
    let checking = seed_account(&db, "Checking", AccountType::Checking, 100.0);

    commands::cmd_transaction_add(&db, checking, "outflow", 42.0, "2025-05-30", Some("Comcast"), "")
        .unwrap();
    assert_eq!(db.list_transactions(10).unwrap().len(), 1);

    assert!(commands::cmd_transaction_add(&db, 999, "outflow", 1.0, "2025-05-30", None, "").is_err());
    assert!(commands::cmd_transaction_add(&db, checking, "sideways", 1.0, "2025-05-30", None, "").is_err());
    assert!(commands::cmd_transaction_add(&db, checking, "inflow", -1.0, "2025-05-30", None, "").is_err());
}

// ========== Engine ==========

#[test]
fn test_cmd_match_marks_paid() {
    let (db, clock) = setup();
    let policy = PolicyConfig::default();
    let checking = seed_account(&db, "Checking", AccountType::Checking, 1000.0);
    let ob = seed_obligation(&db, "Comcast", ObligationCategory::Utility, 89.99, date(2025, 5, 28));
    seed_outflow(&db, checking, "COMCAST CABLE", 89.99, date(2025, 5, 27));

    commands::cmd_match(&db, &clock, &policy, false).unwrap();
    assert_eq!(db.get_obligation(ob).unwrap().unwrap().status, ObligationStatus::Paid);
}

#[test]
fn test_cmd_triage_decide_and_outcome() {
    let (db, clock) = setup();
    let policy = PolicyConfig::default();
    seed_account(&db, "Checking", AccountType::Checking, 50.0);
    seed_obligation(&db, "Landlord", ObligationCategory::Mortgage, 1500.0, date(2025, 6, 2));

    commands::cmd_triage(&db, &clock, &policy, false).unwrap();
    let active = db.list_recommendations(Some(RecStatus::Active)).unwrap();
    assert!(!active.is_empty());
    let id = active[0].id;

    // Rerun is a no-op
    commands::cmd_triage(&db, &clock, &policy, true).unwrap();
    assert_eq!(
        db.list_recommendations(Some(RecStatus::Active)).unwrap().len(),
        active.len()
    );

    assert!(commands::cmd_recs_list(&db, "active", false).is_ok());
    assert!(commands::cmd_recs_decide(&db, &clock, &policy, id, "maybe", false).is_err());
    commands::cmd_recs_decide(&db, &clock, &policy, id, "rejected", false).unwrap();
    assert_eq!(
        db.get_recommendation(id).unwrap().unwrap().status,
        RecStatus::Dismissed
    );
    // Second decision conflicts
    assert!(commands::cmd_recs_decide(&db, &clock, &policy, id, "approved", false).is_err());
    assert!(commands::cmd_recs_decide(&db, &clock, &policy, 999, "approved", false).is_err());

    let feedback = db.list_decision_feedback(10).unwrap();
    assert_eq!(feedback.len(), 1);
    commands::cmd_recs_outcome(&db, &clock, &policy, feedback[0].id, "succeeded", Some("done"))
        .unwrap();
    assert!(commands::cmd_recs_outcome(&db, &clock, &policy, 999, "failed", None).is_err());
    assert!(commands::cmd_recs_outcome(&db, &clock, &policy, feedback[0].id, "meh", None).is_err());

    assert!(commands::cmd_confidence(&db, &clock, &policy, None, false).is_ok());
    assert!(commands::cmd_confidence(&db, &clock, &policy, Some("Landlord"), true).is_ok());
}

#[test]
fn test_cmd_project_persists() {
    let (db, clock) = setup();
    seed_account(&db, "Checking", AccountType::Checking, 500.0);
    seed_obligation(&db, "Electric Co", ObligationCategory::Utility, 120.0, date(2025, 6, 10));

    commands::cmd_project(&db, &clock, false).unwrap();
    let points = db.list_projections().unwrap();
    assert!(points.iter().any(|p| p.projection_date == date(2025, 6, 10)));
}

#[test]
fn test_cmd_revenue_add_list_deactivate() {
    let (db, clock) = setup();
    let checking = seed_account(&db, "Checking", AccountType::Checking, 0.0);
    commands::cmd_revenue_add(&db, &clock, "Salary", 2000.0, "biweekly", "2025-06-06", Some(checking))
        .unwrap();
    assert!(commands::cmd_revenue_add(&db, &clock, "Gift", 0.0, "monthly", "2025-06-06", None).is_err());
    assert!(commands::cmd_revenue_add(&db, &clock, "Gift", 5.0, "hourly", "2025-06-06", None).is_err());

    let sources = db.list_revenue_sources(true).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].source, "manual");
    assert!(commands::cmd_revenue_list(&db, false, false).is_ok());

    commands::cmd_revenue_deactivate(&db, sources[0].id).unwrap();
    assert!(db.list_revenue_sources(true).unwrap().is_empty());
    assert_eq!(db.list_revenue_sources(false).unwrap().len(), 1);
    assert!(commands::cmd_revenue_deactivate(&db, 999).is_err());

    let policy = PolicyConfig::default();
    assert!(commands::cmd_revenue_discover(&db, &clock, &policy, false).is_ok());
}

// ========== Plans ==========

#[test]
fn test_cmd_plan_save_and_activate() {
    let (db, clock) = setup();
    let policy = PolicyConfig::default();
    seed_account(&db, "Checking", AccountType::Checking, 1000.0);
    seed_obligation(&db, "Electric Co", ObligationCategory::Utility, 120.0, date(2025, 6, 10));

    let options = commands::plan_options("optimal", None, &[], &[], &[]).unwrap();
    commands::cmd_plan(&db, &clock, &policy, &options, false, false).unwrap();
    assert!(db.list_payment_plans(10).unwrap().is_empty());

    commands::cmd_plan(&db, &clock, &policy, &options, true, false).unwrap();
    commands::cmd_plan(&db, &clock, &policy, &options, true, true).unwrap();
    let plans = db.list_payment_plans(10).unwrap();
    assert_eq!(plans.len(), 2);
    assert!(plans.iter().all(|p| p.status == PlanStatus::Draft));

    let (first, second) = (plans[1].id.min(plans[0].id), plans[1].id.max(plans[0].id));
    commands::cmd_plans_activate(&db, &clock, &policy, first).unwrap();
    commands::cmd_plans_activate(&db, &clock, &policy, first).unwrap();
    commands::cmd_plans_activate(&db, &clock, &policy, second).unwrap();

    assert_eq!(db.get_active_payment_plan().unwrap().unwrap().id, second);
    assert_eq!(
        db.get_payment_plan(first).unwrap().unwrap().status,
        PlanStatus::Abandoned
    );
    // Abandoned plans stay abandoned
    assert!(commands::cmd_plans_activate(&db, &clock, &policy, first).is_err());
    assert!(commands::cmd_plans_activate(&db, &clock, &policy, 999).is_err());

    assert!(commands::cmd_plans_list(&db, 10, false).is_ok());
    assert!(commands::cmd_plans_show(&db, second, false).is_ok());
    assert!(commands::cmd_plans_show(&db, 999, false).is_err());
    assert!(commands::cmd_plan_compare(&db, &clock, &policy, Some(30), false).is_ok());
}

// ========== Disputes and Deadlines ==========

#[test]
fn test_cmd_disputes_and_deadlines() {
    let (db, _) = setup();
    let ob = seed_obligation(&db, "Hospital", ObligationCategory::Medical, 900.0, date(2025, 6, 30));

    commands::cmd_disputes_add(&db, "Double billed", Some(ob), Some("Call billing"), Some("2025-06-05"))
        .unwrap();
    assert!(commands::cmd_disputes_add(&db, "Ghost", Some(999), None, None).is_err());
    let disputes = db.list_open_disputes().unwrap();
    assert_eq!(disputes.len(), 1);
    assert_eq!(disputes[0].next_action_date, Some(date(2025, 6, 5)));

    commands::cmd_disputes_resolve(&db, disputes[0].id).unwrap();
    assert!(commands::cmd_disputes_resolve(&db, disputes[0].id).is_err());

    commands::cmd_deadlines_add(&db, "File answer", "2025-06-12", Some("CV-42")).unwrap();
    let deadlines = db.list_pending_legal_deadlines().unwrap();
    assert_eq!(deadlines.len(), 1);
    commands::cmd_deadlines_complete(&db, deadlines[0].id).unwrap();
    assert!(db.list_pending_legal_deadlines().unwrap().is_empty());
    assert!(commands::cmd_deadlines_add(&db, "Bad", "soon", None).is_err());
}

// ========== Pipeline ==========

#[test]
fn test_cmd_run_records_run() {
    let (db, clock) = setup();
    let policy = PolicyConfig::default();
    seed_account(&db, "Checking", AccountType::Checking, 2000.0);
    seed_obligation(&db, "Electric Co", ObligationCategory::Utility, 120.0, date(2025, 6, 10));

    commands::cmd_run(&db, &clock, &policy, false).unwrap();
    let runs = db.list_automation_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].trigger, "manual");

    assert!(commands::cmd_audit(&db, 10, false).is_ok());
    assert!(commands::cmd_audit(&db, 10, true).is_ok());
    assert!(commands::print_engine_summary(&db).is_ok());
}

#[test]
fn test_cmd_run_partial_failure_still_succeeds() {
    let (db, clock) = setup();
    let policy = PolicyConfig::default();
    seed_account(&db, "Checking", AccountType::Checking, 500.0);
    db.conn()
        .unwrap()
        .execute("DROP TABLE revenue_sources", rusqlite::params![])
        .unwrap();

    // Revenue and plan fail without revenue_sources; the rest still run
    commands::cmd_run(&db, &clock, &policy, false).unwrap();
    let run = &db.list_automation_runs(1).unwrap()[0];
    assert_eq!(run.status, RunStatus::CompletedWithErrors);
    assert!(run.phases.iter().any(|p| p.phase == "triage" && p.ok));
    assert!(run.phases.iter().any(|p| p.phase == "revenue" && !p.ok));
}

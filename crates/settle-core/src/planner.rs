//! Payment-plan simulation
//!
//! Unlike the projector, the planner decides. Day by day over the horizon it
//! posts expected revenue, then walks the obligations due that day in
//! descending effective priority (urgency x escalation multiplier) and picks
//! one action for each:
//!
//! 1. pay in full when the balance covers it (conservative pays the minimum
//!    instead when a full payment would leave less than the buffer)
//! 2. pay the minimum when only that is affordable (optimal credits the late
//!    fee as avoided)
//! 3. under aggressive, push once to the end of the grace period and
//!    re-evaluate there
//! 4. otherwise flag at risk: nothing paid, late fee counted as risked
//!
//! The simulation itself is a pure function over loaded inputs
//! ([`simulate`]); [`PaymentPlanner`] loads them and persists results.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{EscalationPolicy, PlannerPolicy};
use crate::db::Database;
use crate::error::Result;
use crate::models::{
    Account, AccountType, ActivationOutcome, Obligation, PlanAction, PlanSimulation, PlanWarning,
    RevenueCadence, RevenueSource, RevenueSummaryItem, ScheduleEntry, Strategy, WarningSeverity,
};
use crate::money::Money;
use crate::recurrence::{self, add_months};
use crate::urgency::{urgency_score, UrgencyInput};

/// Escalation types whose at-risk warnings are critical
const SEVERE_ESCALATIONS: &[&str] = &["collections", "legal"];

/// Longest simulation the planner will run (ten years)
pub const MAX_HORIZON_DAYS: i64 = 3650;

/// Caller-controlled plan parameters
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub strategy: Strategy,
    /// None uses the configured default
    pub horizon_days: Option<i64>,
    /// Obligations the user chose to defer
    pub defer_ids: HashSet<i64>,
    /// Obligations whose first payment moves to day 0
    pub pay_early_ids: HashSet<i64>,
    /// Per-obligation payment amounts replacing the amount due
    pub custom_amounts: HashMap<i64, Money>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Optimal,
            horizon_days: None,
            defer_ids: HashSet::new(),
            pay_early_ids: HashSet::new(),
            custom_amounts: HashMap::new(),
        }
    }
}

impl PlanOptions {
    pub fn with_strategy(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }
}

/// Everything the simulation reads
#[derive(Debug, Clone, Default)]
pub struct PlanInputs {
    pub accounts: Vec<Account>,
    /// Open obligations only
    pub obligations: Vec<Obligation>,
    /// Active revenue sources only
    pub revenue: Vec<RevenueSource>,
}

/// Effective priority of an obligation
pub fn effective_priority(urgency: u8, ob: &Obligation, escalation: &EscalationPolicy) -> f64 {
    f64::from(urgency)
        * escalation.multiplier(ob.escalation_type.as_deref(), ob.credit_impact_score)
}

/// One obligation payment waiting to be evaluated on a given day
#[derive(Debug, Clone)]
struct DueItem {
    idx: usize,
    priority: f64,
    grace_used: bool,
}

/// Dates a revenue source is expected to pay within `[start, end]`.
///
/// Past anchors roll forward by the cadence; irregular sources with a past
/// (or missing) date contribute nothing.
fn revenue_dates(rs: &RevenueSource, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let Some(anchor) = rs.next_expected_date else {
        return Vec::new();
    };

    let step = |n: i32| -> NaiveDate {
        match rs.cadence {
            RevenueCadence::Weekly => anchor + Duration::weeks(i64::from(n)),
            RevenueCadence::Biweekly => anchor + Duration::weeks(2 * i64::from(n)),
            RevenueCadence::Monthly => add_months(anchor, n),
            RevenueCadence::Quarterly => add_months(anchor, 3 * n),
            RevenueCadence::Annual => add_months(anchor, 12 * n),
            RevenueCadence::Irregular => anchor,
        }
    };

    if rs.cadence == RevenueCadence::Irregular {
        return if anchor >= start && anchor <= end {
            vec![anchor]
        } else {
            Vec::new()
        };
    }

    let mut dates = Vec::new();
    let mut n = 0;
    loop {
        let d = step(n);
        if d > end {
            break;
        }
        if d >= start {
            dates.push(d);
        }
        n += 1;
    }
    dates
}

/// Account a payment comes out of: the obligation's preferred account if it
/// exists, else the largest checking account
fn default_account(accounts: &[Account]) -> Option<i64> {
    accounts
        .iter()
        .filter(|a| a.account_type == AccountType::Checking)
        .max_by(|a, b| a.current_balance.cmp(&b.current_balance).then(b.id.cmp(&a.id)))
        .or_else(|| {
            accounts
                .iter()
                .filter(|a| a.account_type.is_cash())
                .max_by(|a, b| a.current_balance.cmp(&b.current_balance).then(b.id.cmp(&a.id)))
        })
        .map(|a| a.id)
}

/// Run one strategy over the inputs
pub fn simulate(
    inputs: &PlanInputs,
    options: &PlanOptions,
    escalation: &EscalationPolicy,
    planner: &PlannerPolicy,
    today: NaiveDate,
) -> PlanSimulation {
    let horizon = options
        .horizon_days
        .unwrap_or(planner.horizon_days)
        .clamp(1, MAX_HORIZON_DAYS);
    let end = today + Duration::days(horizon - 1);
    let strategy = options.strategy;

    let starting_balance: Money = inputs
        .accounts
        .iter()
        .filter(|a| a.account_type.is_cash())
        .map(|a| a.current_balance)
        .sum();
    let fallback_account = default_account(&inputs.accounts);
    let account_ids: HashSet<i64> = inputs.accounts.iter().map(|a| a.id).collect();

    // Revenue by date
    let mut revenue_by_date: BTreeMap<NaiveDate, Money> = BTreeMap::new();
    let mut revenue_summary = Vec::new();
    for rs in &inputs.revenue {
        let dates = revenue_dates(rs, today, end);
        if dates.is_empty() {
            continue;
        }
        for d in &dates {
            *revenue_by_date.entry(*d).or_default() += rs.amount;
        }
        revenue_summary.push(RevenueSummaryItem {
            revenue_source_id: rs.id,
            description: rs.description.clone(),
            cadence: rs.cadence,
            confidence: rs.confidence,
            amount_per_occurrence: rs.amount,
            occurrences: dates.len(),
            total: Money::from_cents(rs.amount.cents() * dates.len() as i64),
        });
    }

    // Obligation payments by date
    let mut agenda: BTreeMap<NaiveDate, Vec<DueItem>> = BTreeMap::new();
    for (idx, ob) in inputs.obligations.iter().enumerate() {
        let amount = options
            .custom_amounts
            .get(&ob.id)
            .copied()
            .or(ob.amount_due)
            .unwrap_or(Money::ZERO);
        if !amount.is_positive() {
            continue;
        }

        let urgency = urgency_score(&UrgencyInput::from_obligation(ob), today);
        let item = DueItem {
            idx,
            priority: effective_priority(urgency, ob, escalation),
            grace_used: false,
        };

        let mut dates = recurrence::occurrences_between(ob, today, end);
        if ob.due_date.is_some_and(|d| d < today) {
            // Anything overdue is due now
            dates.insert(0, today);
        }
        if options.pay_early_ids.contains(&ob.id) {
            if let Some(first) = dates.first_mut() {
                *first = today;
            }
        }
        for d in dates {
            agenda.entry(d).or_default().push(item.clone());
        }
    }

    let mut balance = starting_balance;
    let mut lowest_balance = starting_balance;
    let mut lowest_balance_date = today;
    let mut total_inflows = Money::ZERO;
    let mut total_outflows = Money::ZERO;
    let mut late_fees_avoided = Money::ZERO;
    let mut late_fees_risked = Money::ZERO;
    let mut schedule = Vec::new();
    let mut warnings = Vec::new();

    for day in 0..horizon {
        let date = today + Duration::days(day);

        let revenue_today = revenue_by_date.get(&date).copied().unwrap_or(Money::ZERO);
        balance += revenue_today;
        total_inflows += revenue_today;
        let mut unrecorded_revenue = revenue_today;

        let mut due = agenda.remove(&date).unwrap_or_default();
        due.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then(inputs.obligations[a.idx].id.cmp(&inputs.obligations[b.idx].id))
        });

        for item in due {
            let ob = &inputs.obligations[item.idx];
            let full = options
                .custom_amounts
                .get(&ob.id)
                .copied()
                .or(ob.amount_due)
                .unwrap_or(Money::ZERO);
            let minimum = ob.minimum_option().filter(|m| *m < full);

            let (action, pay) = if options.defer_ids.contains(&ob.id) {
                (PlanAction::Deferred, Money::ZERO)
            } else if balance >= full {
                match minimum {
                    Some(min)
                        if strategy == Strategy::Conservative
                            && balance - full < planner.conservative_buffer =>
                    {
                        (PlanAction::PayMinimum, min)
                    }
                    _ => (PlanAction::PayFull, full),
                }
            } else if let Some(min) = minimum.filter(|m| balance >= *m) {
                if strategy == Strategy::Optimal {
                    late_fees_avoided += ob.late_fee;
                }
                (PlanAction::PayMinimum, min)
            } else if strategy == Strategy::Aggressive
                && ob.grace_period_days > 0
                && !item.grace_used
            {
                (PlanAction::GraceDeferred, Money::ZERO)
            } else {
                late_fees_risked += ob.late_fee;
                (PlanAction::AtRisk, Money::ZERO)
            };

            let balance_before = balance - unrecorded_revenue;
            balance -= pay;
            total_outflows += pay;

            match action {
                PlanAction::GraceDeferred => {
                    let deadline = Duration::try_days(ob.grace_period_days)
                        .and_then(|g| date.checked_add_signed(g));
                    let message = match deadline {
                        Some(d) => format!("{} deferred into grace period; pay by {}", ob.payee, d),
                        None => format!("{} deferred into grace period", ob.payee),
                    };
                    warnings.push(PlanWarning {
                        date,
                        obligation_id: Some(ob.id),
                        severity: WarningSeverity::Warning,
                        message,
                    });
                    // Deadlines past the horizon (or the calendar) drop out of the plan
                    if let Some(deadline) = deadline.filter(|d| *d <= end) {
                        agenda.entry(deadline).or_default().push(DueItem {
                            grace_used: true,
                            ..item.clone()
                        });
                    }
                }
                PlanAction::AtRisk => {
                    let severe = ob
                        .escalation_type
                        .as_deref()
                        .is_some_and(|e| SEVERE_ESCALATIONS.contains(&e.to_lowercase().as_str()));
                    warnings.push(PlanWarning {
                        date,
                        obligation_id: Some(ob.id),
                        severity: if severe {
                            WarningSeverity::Critical
                        } else {
                            WarningSeverity::Warning
                        },
                        message: format!(
                            "Cannot cover {} for {} (balance {}); late fee {} at risk",
                            full, ob.payee, balance, ob.late_fee
                        ),
                    });
                }
                PlanAction::Deferred => {
                    warnings.push(PlanWarning {
                        date,
                        obligation_id: Some(ob.id),
                        severity: WarningSeverity::Info,
                        message: format!("{} deferred on request", ob.payee),
                    });
                }
                PlanAction::PayFull | PlanAction::PayMinimum => {}
            }

            let account_id = ob
                .preferred_account_id
                .filter(|id| account_ids.contains(id))
                .or(fallback_account);
            let escalation_risk = match action {
                PlanAction::AtRisk | PlanAction::GraceDeferred => ob.escalation_type.clone(),
                _ => None,
            };

            debug!(
                obligation_id = ob.id,
                %date,
                action = action.as_str(),
                amount = %pay,
                "Plan step"
            );

            schedule.push(ScheduleEntry {
                date,
                obligation_id: ob.id,
                payee: ob.payee.clone(),
                amount: pay,
                account_id,
                action,
                balance_before,
                revenue_on_date: unrecorded_revenue,
                balance_after: balance,
                grace_used: item.grace_used || action == PlanAction::GraceDeferred,
                escalation_risk,
            });
            unrecorded_revenue = Money::ZERO;

            if balance < lowest_balance {
                lowest_balance = balance;
                lowest_balance_date = date;
            }
        }

        if balance < lowest_balance {
            lowest_balance = balance;
            lowest_balance_date = date;
        }
    }

    PlanSimulation {
        strategy,
        horizon_days: horizon,
        start_date: today,
        starting_balance,
        ending_balance: balance,
        lowest_balance,
        lowest_balance_date,
        total_inflows,
        total_outflows,
        late_fees_avoided,
        late_fees_risked,
        schedule,
        warnings,
        revenue_summary,
    }
}

/// Payment planner
pub struct PaymentPlanner<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    planner: PlannerPolicy,
    escalation: EscalationPolicy,
}

impl<'a> PaymentPlanner<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self::with_config(db, clock, PlannerPolicy::default(), EscalationPolicy::default())
    }

    pub fn with_config(
        db: &'a Database,
        clock: &'a dyn Clock,
        planner: PlannerPolicy,
        escalation: EscalationPolicy,
    ) -> Self {
        Self {
            db,
            clock,
            planner,
            escalation,
        }
    }

    /// Load balances, open obligations and active revenue, then simulate
    pub fn generate_payment_plan(&self, options: &PlanOptions) -> Result<PlanSimulation> {
        let inputs = PlanInputs {
            accounts: self.db.list_accounts()?,
            obligations: self.db.list_open_obligations()?,
            revenue: self.db.list_revenue_sources(true)?,
        };

        let plan = simulate(
            &inputs,
            options,
            &self.escalation,
            &self.planner,
            self.clock.today(),
        );

        info!(
            strategy = plan.strategy.as_str(),
            entries = plan.schedule.len(),
            warnings = plan.warnings.len(),
            ending = %plan.ending_balance,
            lowest = %plan.lowest_balance,
            "Payment plan generated"
        );
        Ok(plan)
    }

    /// Persist a simulation as a draft
    pub fn save_payment_plan(&self, plan: &PlanSimulation) -> Result<i64> {
        let id = self.db.insert_payment_plan(plan, self.clock.now())?;
        info!(plan_id = id, strategy = plan.strategy.as_str(), "Payment plan saved as draft");
        Ok(id)
    }

    /// Make a draft the single active plan
    pub fn activate_payment_plan(&self, id: i64) -> Result<ActivationOutcome> {
        let now = self.clock.now();
        let outcome = self.db.activate_payment_plan(id, now)?;
        if let ActivationOutcome::Activated { abandoned } = outcome {
            let details = serde_json::json!({ "abandoned": abandoned }).to_string();
            self.db.log_audit(
                "planner",
                "plan_activated",
                Some("payment_plan"),
                Some(id),
                Some(&details),
                now,
            )?;
        }
        Ok(outcome)
    }
}

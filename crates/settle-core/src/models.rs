//! Domain models for settle

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Implements `as_str`, `FromStr` and `Display` for a fieldless enum whose
/// storage form is a fixed lowercase string.
macro_rules! str_enum {
    ($name:ident, $label:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant,)+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(format!("Unknown {}: {}", $label, s)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

// ========== Accounts ==========

/// A balance-bearing account, kept current by sync collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: AccountType,
    pub current_balance: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Checking,
    Savings,
    Credit,
    Mortgage,
    Loan,
}

str_enum!(AccountType, "account type", {
    Checking => "checking",
    Savings => "savings",
    Credit => "credit",
    Mortgage => "mortgage",
    Loan => "loan",
});

impl AccountType {
    /// Accounts whose balance counts as spendable cash
    pub fn is_cash(&self) -> bool {
        matches!(self, Self::Checking | Self::Savings)
    }
}

// ========== Obligations ==========

/// A recurring or one-time payment duty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    pub id: i64,
    pub account_id: Option<i64>,
    pub category: ObligationCategory,
    pub payee: String,
    /// None when the amount is not yet known (e.g. variable utility bill)
    pub amount_due: Option<Money>,
    pub amount_minimum: Option<Money>,
    /// None when the stored date was empty or unparseable
    pub due_date: Option<NaiveDate>,
    pub recurrence: Recurrence,
    pub recurrence_day: Option<u32>,
    pub status: ObligationStatus,
    pub auto_pay: bool,
    pub negotiable: bool,
    pub late_fee: Money,
    pub grace_period_days: i64,
    /// Cached output of the urgency scorer
    pub urgency_score: u8,
    /// Consequence of non-payment (collections, service_shutoff, legal, ...)
    pub escalation_type: Option<String>,
    pub credit_impact_score: i64,
    pub preferred_account_id: Option<i64>,
}

impl Obligation {
    /// A minimum payment option exists when it is set and below the full amount
    pub fn minimum_option(&self) -> Option<Money> {
        match (self.amount_minimum, self.amount_due) {
            (Some(min), Some(due)) if min.is_positive() && min < due => Some(min),
            _ => None,
        }
    }
}

/// A new obligation from ingestion or manual entry
#[derive(Debug, Clone)]
pub struct NewObligation {
    pub account_id: Option<i64>,
    pub category: ObligationCategory,
    pub payee: String,
    pub amount_due: Option<Money>,
    pub amount_minimum: Option<Money>,
    pub due_date: Option<NaiveDate>,
    pub recurrence: Recurrence,
    pub recurrence_day: Option<u32>,
    pub auto_pay: bool,
    pub negotiable: bool,
    pub late_fee: Money,
    pub grace_period_days: i64,
    pub escalation_type: Option<String>,
    pub credit_impact_score: i64,
    pub preferred_account_id: Option<i64>,
}

impl NewObligation {
    /// A one-time, pending obligation with everything else defaulted
    pub fn new(payee: &str, category: ObligationCategory, amount_due: Money, due_date: NaiveDate) -> Self {
        Self {
            account_id: None,
            category,
            payee: payee.to_string(),
            amount_due: Some(amount_due),
            amount_minimum: None,
            due_date: Some(due_date),
            recurrence: Recurrence::OneTime,
            recurrence_day: None,
            auto_pay: false,
            negotiable: false,
            late_fee: Money::ZERO,
            grace_period_days: 0,
            escalation_type: None,
            credit_impact_score: 0,
            preferred_account_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationCategory {
    Legal,
    FederalTax,
    PropertyTax,
    StateTax,
    Mortgage,
    Insurance,
    Utility,
    Loan,
    Hoa,
    CreditCard,
    Medical,
    Subscription,
    Other,
}

str_enum!(ObligationCategory, "obligation category", {
    Legal => "legal",
    FederalTax => "federal_tax",
    PropertyTax => "property_tax",
    StateTax => "state_tax",
    Mortgage => "mortgage",
    Insurance => "insurance",
    Utility => "utility",
    Loan => "loan",
    Hoa => "hoa",
    CreditCard => "credit_card",
    Medical => "medical",
    Subscription => "subscription",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Stored as "none"
    #[serde(rename = "none")]
    OneTime,
    Monthly,
    Quarterly,
    Annual,
}

str_enum!(Recurrence, "recurrence", {
    OneTime => "none",
    Monthly => "monthly",
    Quarterly => "quarterly",
    Annual => "annual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Pending,
    Overdue,
    Paid,
    Disputed,
    Deferred,
}

str_enum!(ObligationStatus, "obligation status", {
    Pending => "pending",
    Overdue => "overdue",
    Paid => "paid",
    Disputed => "disputed",
    Deferred => "deferred",
});

impl ObligationStatus {
    /// Pending or overdue: still needs money
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

// ========== Transactions ==========

/// An observed money movement. Amount is always a non-negative magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    /// Set once by the matcher, never reassigned
    pub obligation_id: Option<i64>,
    pub direction: Direction,
    pub amount: Money,
    pub counterparty: Option<String>,
    pub description: String,
    pub tx_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub direction: Direction,
    pub amount: Money,
    pub counterparty: Option<String>,
    pub description: String,
    pub tx_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inflow,
    Outflow,
}

str_enum!(Direction, "direction", {
    Inflow => "inflow",
    Outflow => "outflow",
});

// ========== Revenue ==========

/// A discovered or declared recurring inflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueSource {
    pub id: i64,
    /// Where the row came from: "discovery" or "manual"
    pub source: String,
    pub description: String,
    pub counterparty: String,
    pub account_id: Option<i64>,
    pub amount: Money,
    pub cadence: RevenueCadence,
    /// 0..=1
    pub confidence: f64,
    pub verified_by: VerifiedBy,
    pub occurrences: i64,
    pub next_expected_date: Option<NaiveDate>,
    pub active: bool,
}

/// Fields written by discovery or manual declaration
#[derive(Debug, Clone)]
pub struct NewRevenueSource {
    pub source: String,
    pub description: String,
    pub counterparty: String,
    pub account_id: Option<i64>,
    pub amount: Money,
    pub cadence: RevenueCadence,
    pub confidence: f64,
    pub verified_by: VerifiedBy,
    pub occurrences: i64,
    pub next_expected_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevenueCadence {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Annual,
    Irregular,
}

str_enum!(RevenueCadence, "revenue cadence", {
    Weekly => "weekly",
    Biweekly => "biweekly",
    Monthly => "monthly",
    Quarterly => "quarterly",
    Annual => "annual",
    Irregular => "irregular",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifiedBy {
    Manual,
    TransactionHistory,
    ValidatedMatch,
}

str_enum!(VerifiedBy, "verification source", {
    Manual => "manual",
    TransactionHistory => "transaction_history",
    ValidatedMatch => "validated_match",
});

// ========== Recommendations ==========

/// An actionable suggestion emitted by triage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub rec_type: RecType,
    /// 1 = highest
    pub priority: u8,
    pub title: String,
    pub reasoning: String,
    /// Machine-readable action (pay_now, negotiate, defer, pay_minimum, ...)
    pub action: String,
    pub obligation_id: Option<i64>,
    pub dispute_id: Option<i64>,
    pub legal_deadline_id: Option<i64>,
    pub payee: Option<String>,
    pub estimated_savings: Money,
    /// Learner confidence at emission time
    pub confidence: f64,
    pub dedup_key: String,
    pub status: RecStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRecommendation {
    pub rec_type: RecType,
    pub priority: u8,
    pub title: String,
    pub reasoning: String,
    pub action: String,
    pub obligation_id: Option<i64>,
    pub dispute_id: Option<i64>,
    pub legal_deadline_id: Option<i64>,
    pub payee: Option<String>,
    pub estimated_savings: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecType {
    Payment,
    Negotiate,
    Defer,
    Dispute,
    Legal,
    Strategy,
    Warning,
}

str_enum!(RecType, "recommendation type", {
    Payment => "payment",
    Negotiate => "negotiate",
    Defer => "defer",
    Dispute => "dispute",
    Legal => "legal",
    Strategy => "strategy",
    Warning => "warning",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecStatus {
    Active,
    Completed,
    Dismissed,
    Expired,
}

str_enum!(RecStatus, "recommendation status", {
    Active => "active",
    Completed => "completed",
    Dismissed => "dismissed",
    Expired => "expired",
});

// ========== Decisions ==========

/// One user decision on a recommendation (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFeedback {
    pub id: i64,
    pub recommendation_id: i64,
    pub rec_type: RecType,
    pub payee: Option<String>,
    pub decision: Decision,
    pub confidence_at_decision: f64,
    /// Latest recorded outcome, if any
    pub outcome_status: Option<OutcomeStatus>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    Deferred,
    Modified,
}

str_enum!(Decision, "decision", {
    Approved => "approved",
    Rejected => "rejected",
    Deferred => "deferred",
    Modified => "modified",
});

impl Decision {
    /// Status the recommendation moves to once decided
    pub fn resulting_status(&self) -> RecStatus {
        match self {
            Self::Approved | Self::Modified => RecStatus::Completed,
            Self::Rejected | Self::Deferred => RecStatus::Dismissed,
        }
    }
}

/// Result of deciding on a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionResult {
    Recorded {
        feedback_id: i64,
        confidence: f64,
        status: RecStatus,
    },
    NotFound,
    /// Recommendation is no longer active (already decided or expired)
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Partial,
    Failed,
}

str_enum!(OutcomeStatus, "outcome status", {
    Succeeded => "succeeded",
    Partial => "partial",
    Failed => "failed",
});

/// Counts of approved/rejected decisions in a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub approved: i64,
    pub rejected: i64,
}

impl DecisionCounts {
    pub fn total(&self) -> i64 {
        self.approved + self.rejected
    }

    pub fn acceptance_rate(&self) -> Option<f64> {
        if self.total() == 0 {
            None
        } else {
            Some(self.approved as f64 / self.total() as f64)
        }
    }
}

// ========== Disputes & legal deadlines ==========

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: i64,
    pub obligation_id: Option<i64>,
    pub title: String,
    pub status: DisputeStatus,
    pub next_action: Option<String>,
    pub next_action_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

str_enum!(DisputeStatus, "dispute status", {
    Open => "open",
    Resolved => "resolved",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalDeadline {
    pub id: i64,
    pub title: String,
    pub case_ref: Option<String>,
    pub deadline_date: NaiveDate,
    pub completed: bool,
}

// ========== Projections ==========

/// One persisted day of the cash-flow forecast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub projection_date: NaiveDate,
    pub day_index: i64,
    pub inflow: Money,
    pub outflow: Money,
    pub balance: Money,
    pub confidence: f64,
}

// ========== Payment plans ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Optimal,
    Conservative,
    Aggressive,
}

str_enum!(Strategy, "strategy", {
    Optimal => "optimal",
    Conservative => "conservative",
    Aggressive => "aggressive",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    PayFull,
    PayMinimum,
    /// Pushed to the end of the grace period (aggressive only)
    GraceDeferred,
    /// Deferred on request
    Deferred,
    AtRisk,
}

str_enum!(PlanAction, "plan action", {
    PayFull => "pay_full",
    PayMinimum => "pay_minimum",
    GraceDeferred => "grace_deferred",
    Deferred => "deferred",
    AtRisk => "at_risk",
});

/// One simulated action on one day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub obligation_id: i64,
    pub payee: String,
    pub amount: Money,
    pub account_id: Option<i64>,
    pub action: PlanAction,
    pub balance_before: Money,
    /// Revenue posted on this date ahead of this entry (zero after the first entry of a day)
    pub revenue_on_date: Money,
    pub balance_after: Money,
    pub grace_used: bool,
    pub escalation_risk: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Info,
    Warning,
    Critical,
}

str_enum!(WarningSeverity, "warning severity", {
    Info => "info",
    Warning => "warning",
    Critical => "critical",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWarning {
    pub date: NaiveDate,
    pub obligation_id: Option<i64>,
    pub severity: WarningSeverity,
    pub message: String,
}

/// Expected inflows from one revenue source over the plan horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueSummaryItem {
    pub revenue_source_id: i64,
    pub description: String,
    pub cadence: RevenueCadence,
    pub confidence: f64,
    pub amount_per_occurrence: Money,
    pub occurrences: usize,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Abandoned,
}

str_enum!(PlanStatus, "plan status", {
    Draft => "draft",
    Active => "active",
    Abandoned => "abandoned",
});

/// Output of one payment-plan simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSimulation {
    pub strategy: Strategy,
    pub horizon_days: i64,
    pub start_date: NaiveDate,
    pub starting_balance: Money,
    pub ending_balance: Money,
    pub lowest_balance: Money,
    pub lowest_balance_date: NaiveDate,
    pub total_inflows: Money,
    pub total_outflows: Money,
    pub late_fees_avoided: Money,
    pub late_fees_risked: Money,
    pub schedule: Vec<ScheduleEntry>,
    pub warnings: Vec<PlanWarning>,
    pub revenue_summary: Vec<RevenueSummaryItem>,
}

/// A persisted simulation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub id: i64,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub simulation: PlanSimulation,
}

/// Result of asking to activate a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationOutcome {
    /// Now active; carries the id of the plan it replaced, if any
    Activated { abandoned: Option<i64> },
    AlreadyActive,
    NotFound,
    /// Plan exists but is abandoned and cannot be reactivated
    Conflict,
}

// ========== Automation runs ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

str_enum!(RunStatus, "run status", {
    Running => "running",
    Completed => "completed",
    CompletedWithErrors => "completed_with_errors",
    Failed => "failed",
});

/// Outcome of one isolated pipeline phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    pub phase: String,
    pub ok: bool,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRun {
    pub id: i64,
    pub trigger: String,
    pub status: RunStatus,
    pub phases: Vec<PhaseOutcome>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

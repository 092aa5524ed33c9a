//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Settle - Triage obligations and plan payments
#[derive(Parser)]
#[command(name = "settle")]
#[command(about = "Obligation triage and payment-plan decision engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "settle.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SETTLE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Decision policy file (TOML)
    ///
    /// Defaults to ~/.local/share/settle/config/policy.toml if present,
    /// otherwise the built-in policy.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Show database status (encryption, counts, last run)
    Status,

    /// Manage accounts (list, set)
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Manage obligations (list, add, defer, pay, dispute)
    Obligations {
        #[command(subcommand)]
        action: Option<ObligationsAction>,
    },

    /// Record a transaction
    Transaction {
        /// Account id
        #[arg(long)]
        account: i64,

        /// Direction: inflow or outflow
        #[arg(long, default_value = "outflow")]
        direction: String,

        /// Amount in dollars (positive)
        #[arg(long)]
        amount: f64,

        /// Transaction date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Counterparty name
        #[arg(long)]
        counterparty: Option<String>,

        /// Bank description
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Link recent outflows to open obligations
    Match,

    /// Rescore obligations and generate recommendations
    Triage,

    /// Generate the 90-day cash-flow projection
    Project,

    /// Revenue sources (discover, list)
    Revenue {
        #[command(subcommand)]
        action: Option<RevenueAction>,
    },

    /// Simulate a payment plan
    Plan {
        /// Strategy: optimal, conservative, aggressive
        #[arg(short, long, default_value = "optimal")]
        strategy: String,

        /// Horizon in days (defaults to policy)
        #[arg(long)]
        horizon: Option<i64>,

        /// Obligation ids to defer
        #[arg(long, value_delimiter = ',')]
        defer: Vec<i64>,

        /// Obligation ids to pay on day one
        #[arg(long, value_delimiter = ',')]
        pay_early: Vec<i64>,

        /// Override an amount: ID=DOLLARS (repeatable)
        #[arg(long = "amount", value_name = "ID=DOLLARS")]
        amounts: Vec<String>,

        /// Save the plan as a draft
        #[arg(long)]
        save: bool,

        /// Compare all three strategies instead of one
        #[arg(long)]
        compare: bool,
    },

    /// Manage saved plans (list, show, activate)
    Plans {
        #[command(subcommand)]
        action: Option<PlansAction>,
    },

    /// Manage recommendations (list, decide, outcome)
    Recs {
        #[command(subcommand)]
        action: Option<RecsAction>,
    },

    /// Show learned confidence per recommendation type
    Confidence {
        /// Refine for one payee
        #[arg(long)]
        payee: Option<String>,
    },

    /// Manage disputes (list, add, resolve)
    Disputes {
        #[command(subcommand)]
        action: Option<DisputesAction>,
    },

    /// Manage legal deadlines (list, add, complete)
    Deadlines {
        #[command(subcommand)]
        action: Option<DeadlinesAction>,
    },

    /// Run one automation pass (match, triage, project, revenue, plan)
    Run,

    /// Run the automation pass on an interval
    ///
    /// Reads SETTLE_SCHEDULE_HOURS when --hours is not given.
    Schedule {
        /// Interval in hours
        #[arg(long)]
        hours: Option<u64>,
    },

    /// Show recent audit log entries and automation runs
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List accounts
    List,
    /// Create an account or update its balance
    Set {
        /// Account name
        name: String,

        /// Type: checking, savings, credit, mortgage, loan
        #[arg(short = 't', long = "type", default_value = "checking")]
        account_type: String,

        /// Current balance in dollars
        #[arg(short, long)]
        balance: f64,
    },
}

#[derive(Subcommand)]
pub enum ObligationsAction {
    /// List obligations
    List {
        /// Filter by status: pending, overdue, paid, disputed, deferred
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Add an obligation
    Add {
        /// Payee name
        payee: String,

        /// Amount due in dollars
        #[arg(short, long)]
        amount: f64,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        due: String,

        /// Category (legal, federal_tax, mortgage, utility, credit_card, ...)
        #[arg(short, long, default_value = "other")]
        category: String,

        /// Minimum payment in dollars
        #[arg(long)]
        minimum: Option<f64>,

        /// Recurrence: none, monthly, quarterly, annual
        #[arg(long, default_value = "none")]
        recurrence: String,

        /// Late fee in dollars
        #[arg(long, default_value = "0")]
        late_fee: f64,

        /// Grace period in days
        #[arg(long, default_value = "0")]
        grace_days: i64,

        /// Escalation type (e.g. collections, lien, legal_action)
        #[arg(long)]
        escalation: Option<String>,

        /// Credit impact score (0-100)
        #[arg(long, default_value = "0")]
        credit_impact: i64,

        /// The payee accepts negotiation
        #[arg(long)]
        negotiable: bool,

        /// Paid automatically
        #[arg(long)]
        auto_pay: bool,
    },
    /// Mark an obligation deferred
    Defer {
        /// Obligation id
        id: i64,
    },
    /// Mark an obligation paid
    Pay {
        /// Obligation id
        id: i64,
    },
    /// Mark an obligation disputed
    Dispute {
        /// Obligation id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RevenueAction {
    /// Discover recurring revenue from inflow history
    Discover,
    /// List revenue sources
    List {
        /// Include inactive sources
        #[arg(long)]
        all: bool,
    },
    /// Add a manual revenue source
    Add {
        /// Description
        description: String,

        /// Amount per occurrence in dollars
        #[arg(short, long)]
        amount: f64,

        /// Cadence: weekly, biweekly, monthly, quarterly, annual, irregular
        #[arg(short, long, default_value = "monthly")]
        cadence: String,

        /// Next expected date (YYYY-MM-DD)
        #[arg(short, long)]
        next: String,

        /// Deposit account id
        #[arg(long)]
        account: Option<i64>,
    },
    /// Deactivate a revenue source
    Deactivate {
        /// Revenue source id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum PlansAction {
    /// List saved plans
    List {
        /// Maximum number of plans
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show a saved plan's schedule
    Show {
        /// Plan id
        id: i64,
    },
    /// Activate a saved plan (abandons the current active plan)
    Activate {
        /// Plan id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RecsAction {
    /// List recommendations
    List {
        /// Filter by status: active, completed, dismissed, expired
        #[arg(short, long, default_value = "active")]
        status: String,
    },
    /// Record a decision: approved, rejected, deferred, modified
    Decide {
        /// Recommendation id
        id: i64,

        /// Decision
        decision: String,
    },
    /// Record how a decision turned out: succeeded, partial, failed
    Outcome {
        /// Decision feedback id
        feedback_id: i64,

        /// Outcome
        outcome: String,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DisputesAction {
    /// List open disputes
    List,
    /// Open a dispute
    Add {
        /// Title
        title: String,

        /// Related obligation id
        #[arg(long)]
        obligation: Option<i64>,

        /// Next action to take
        #[arg(long)]
        next_action: Option<String>,

        /// Date of the next action (YYYY-MM-DD)
        #[arg(long)]
        by: Option<String>,
    },
    /// Resolve a dispute
    Resolve {
        /// Dispute id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum DeadlinesAction {
    /// List pending legal deadlines
    List,
    /// Add a legal deadline
    Add {
        /// Title
        title: String,

        /// Deadline date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Case reference
        #[arg(long)]
        case: Option<String>,
    },
    /// Mark a deadline complete
    Complete {
        /// Deadline id
        id: i64,
    },
}

//! Settle CLI - Obligation triage and payment planning
//!
//! Usage:
//!   settle init                        Initialize database
//!   settle obligations add ...         Track a bill
//!   settle triage                      Score obligations and recommend
//!   settle plan --strategy optimal     Simulate a payment plan
//!   settle schedule --hours 24         Run the automation pass daily

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use settle_core::SystemClock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let clock = SystemClock;
    let json = cli.json;

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt),
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(AccountsAction::List) => commands::cmd_accounts_list(&db, json),
                Some(AccountsAction::Set {
                    name,
                    account_type,
                    balance,
                }) => commands::cmd_accounts_set(&db, &name, &account_type, balance),
            }
        }
        Commands::Obligations { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_obligations_list(&db, None, json),
                Some(ObligationsAction::List { status }) => {
                    commands::cmd_obligations_list(&db, status.as_deref(), json)
                }
                Some(ObligationsAction::Add {
                    payee,
                    amount,
                    due,
                    category,
                    minimum,
                    recurrence,
                    late_fee,
                    grace_days,
                    escalation,
                    credit_impact,
                    negotiable,
                    auto_pay,
                }) => commands::cmd_obligations_add(
                    &db,
                    &commands::ObligationArgs {
                        payee,
                        amount,
                        due,
                        category,
                        minimum,
                        recurrence,
                        late_fee,
                        grace_days,
                        escalation,
                        credit_impact,
                        negotiable,
                        auto_pay,
                    },
                ),
                Some(ObligationsAction::Defer { id }) => {
                    commands::cmd_obligations_defer(&db, &clock, id)
                }
                Some(ObligationsAction::Pay { id }) => commands::cmd_obligations_pay(&db, &clock, id),
                Some(ObligationsAction::Dispute { id }) => {
                    commands::cmd_obligations_dispute(&db, &clock, id)
                }
            }
        }
        Commands::Transaction {
            account,
            direction,
            amount,
            date,
            counterparty,
            description,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transaction_add(
                &db,
                account,
                &direction,
                amount,
                &date,
                counterparty.as_deref(),
                &description,
            )
        }
        Commands::Match => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            commands::cmd_match(&db, &clock, &policy, json)
        }
        Commands::Triage => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            commands::cmd_triage(&db, &clock, &policy, json)
        }
        Commands::Project => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_project(&db, &clock, json)
        }
        Commands::Revenue { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RevenueAction::Discover) => {
                    let policy = commands::load_policy(cli.config.as_deref())?;
                    commands::cmd_revenue_discover(&db, &clock, &policy, json)
                }
                Some(RevenueAction::List { all }) => commands::cmd_revenue_list(&db, all, json),
                Some(RevenueAction::Add {
                    description,
                    amount,
                    cadence,
                    next,
                    account,
                }) => commands::cmd_revenue_add(
                    &db,
                    &clock,
                    &description,
                    amount,
                    &cadence,
                    &next,
                    account,
                ),
                Some(RevenueAction::Deactivate { id }) => commands::cmd_revenue_deactivate(&db, id),
            }
        }
        Commands::Plan {
            strategy,
            horizon,
            defer,
            pay_early,
            amounts,
            save,
            compare,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            if compare {
                commands::cmd_plan_compare(&db, &clock, &policy, horizon, json)
            } else {
                let options =
                    commands::plan_options(&strategy, horizon, &defer, &pay_early, &amounts)?;
                commands::cmd_plan(&db, &clock, &policy, &options, save, json)
            }
        }
        Commands::Plans { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_plans_list(&db, 20, json),
                Some(PlansAction::List { limit }) => commands::cmd_plans_list(&db, limit, json),
                Some(PlansAction::Show { id }) => commands::cmd_plans_show(&db, id, json),
                Some(PlansAction::Activate { id }) => {
                    let policy = commands::load_policy(cli.config.as_deref())?;
                    commands::cmd_plans_activate(&db, &clock, &policy, id)
                }
            }
        }
        Commands::Recs { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_recs_list(&db, "active", json),
                Some(RecsAction::List { status }) => commands::cmd_recs_list(&db, &status, json),
                Some(RecsAction::Decide { id, decision }) => {
                    let policy = commands::load_policy(cli.config.as_deref())?;
                    commands::cmd_recs_decide(&db, &clock, &policy, id, &decision, json)
                }
                Some(RecsAction::Outcome {
                    feedback_id,
                    outcome,
                    notes,
                }) => {
                    let policy = commands::load_policy(cli.config.as_deref())?;
                    commands::cmd_recs_outcome(
                        &db,
                        &clock,
                        &policy,
                        feedback_id,
                        &outcome,
                        notes.as_deref(),
                    )
                }
            }
        }
        Commands::Confidence { payee } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            commands::cmd_confidence(&db, &clock, &policy, payee.as_deref(), json)
        }
        Commands::Disputes { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(DisputesAction::List) => commands::cmd_disputes_list(&db, json),
                Some(DisputesAction::Add {
                    title,
                    obligation,
                    next_action,
                    by,
                }) => commands::cmd_disputes_add(
                    &db,
                    &title,
                    obligation,
                    next_action.as_deref(),
                    by.as_deref(),
                ),
                Some(DisputesAction::Resolve { id }) => commands::cmd_disputes_resolve(&db, id),
            }
        }
        Commands::Deadlines { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(DeadlinesAction::List) => commands::cmd_deadlines_list(&db, json),
                Some(DeadlinesAction::Add { title, date, case }) => {
                    commands::cmd_deadlines_add(&db, &title, &date, case.as_deref())
                }
                Some(DeadlinesAction::Complete { id }) => {
                    commands::cmd_deadlines_complete(&db, id)
                }
            }
        }
        Commands::Run => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            commands::cmd_run(&db, &clock, &policy, json)
        }
        Commands::Schedule { hours } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let policy = commands::load_policy(cli.config.as_deref())?;
            commands::cmd_schedule(db, policy, hours).await
        }
        Commands::Audit { limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_audit(&db, limit, json)
        }
    }
}

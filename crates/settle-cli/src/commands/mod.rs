//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init, status, audit and shared utilities (open_db, load_policy)
//! - `ledger` - Accounts, obligations, transactions, disputes, legal deadlines
//! - `engine` - Matching, triage, projection, revenue, pipeline and scheduler
//! - `plans` - Payment plan simulation and saved plans
//! - `recs` - Recommendations, decisions and confidence

pub mod core;
pub mod engine;
pub mod ledger;
pub mod plans;
pub mod recs;

// Re-export command functions for main.rs
pub use core::*;
pub use engine::*;
pub use ledger::*;
pub use plans::*;
pub use recs::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

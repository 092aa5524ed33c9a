//! Settle Core Library
//!
//! Obligation triage and payment planning for a single household or
//! business:
//! - Encrypted database access and migrations
//! - Urgency scoring and the triage rule ladder
//! - Transaction-to-obligation reconciliation
//! - 90-day cash-flow projection
//! - Payment-plan simulation under three strategies
//! - Revenue source discovery from inflow history
//! - Decision-confidence learning from recommendation feedback
//! - The sequential automation pipeline tying them together

pub mod clock;
pub mod confidence;
pub mod config;
pub mod db;
pub mod error;
pub mod matcher;
pub mod models;
pub mod money;
pub mod pipeline;
pub mod planner;
pub mod projector;
pub mod recurrence;
pub mod revenue;
pub mod triage;
pub mod urgency;

/// Seed helpers shared by unit, integration and CLI tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use confidence::ConfidenceLearner;
pub use config::{DedupKey, PolicyConfig};
pub use db::{AuditEntry, Database};
pub use error::{Error, Result};
pub use matcher::{MatchResult, TransactionMatch, TransactionMatcher};
pub use money::Money;
pub use pipeline::{run_pipeline, PipelineResult};
pub use planner::{PaymentPlanner, PlanOptions};
pub use projector::{CashFlowProjector, ProjectionResult};
pub use revenue::{RevenueDiscovery, RevenueDiscoveryResult};
pub use triage::{TriageOrchestrator, TriageResult};
pub use urgency::{UrgencyInput, UrgencyLevel};

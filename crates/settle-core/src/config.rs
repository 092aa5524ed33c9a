//! Decision policy configuration
//!
//! Every tunable of the engine that is not a fixed scoring rule lives here:
//! escalation multipliers, triage thresholds, matcher windows, revenue
//! exclusion patterns and platform confidences, and learner base rates.
//!
//! ## Configuration Resolution
//!
//! 1. An explicit path (`--config`), which must exist
//! 2. Override in the data dir (~/.local/share/settle/config/policy.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Every key is optional; anything left out keeps its default.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::RecType;
use crate::money::Money;
use crate::planner::MAX_HORIZON_DAYS;

/// Upper bound for any day-count window in the policy (a century)
const MAX_WINDOW_DAYS: i64 = 36_500;
const MAX_LOOKBACK_MONTHS: u32 = 1_200;

/// Embedded default policy (compiled into binary)
const DEFAULT_POLICY: &str = include_str!("../../../config/policy.toml");

/// How triage decides that a new recommendation duplicates an active one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupKey {
    /// Exact title match
    #[default]
    Title,
    /// Stable hash of rec type, target id and action
    Content,
}

impl DedupKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
        }
    }
}

impl std::str::FromStr for DedupKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "content" | "content_key" => Ok(Self::Content),
            _ => Err(format!("Unknown dedup key: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    /// escalation_type -> priority multiplier
    pub multipliers: HashMap<String, f64>,
    pub credit_impact_threshold: i64,
    pub credit_impact_boost: f64,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        let multipliers = [("collections", 1.5), ("service_shutoff", 1.3), ("legal", 1.8)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            multipliers,
            credit_impact_threshold: 50,
            credit_impact_boost: 1.2,
        }
    }
}

impl EscalationPolicy {
    /// Multiplier for an obligation's escalation type and credit impact
    pub fn multiplier(&self, escalation_type: Option<&str>, credit_impact_score: i64) -> f64 {
        let base = escalation_type
            .and_then(|t| self.multipliers.get(&t.to_lowercase()))
            .copied()
            .unwrap_or(1.0);
        if credit_impact_score > self.credit_impact_threshold {
            base * self.credit_impact_boost
        } else {
            base
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriagePolicy {
    pub recommendation_ttl_days: i64,
    pub surplus_window_days: i64,
    pub negotiate_min_amount: Money,
    pub negotiate_savings_rate: f64,
    pub minimum_payment_surplus: Money,
    pub legal_window_days: i64,
    pub legal_urgent_days: i64,
    pub dedup_key: DedupKey,
}

impl Default for TriagePolicy {
    fn default() -> Self {
        Self {
            recommendation_ttl_days: 7,
            surplus_window_days: 30,
            negotiate_min_amount: Money::from_dollars(100.0),
            negotiate_savings_rate: 0.15,
            minimum_payment_surplus: Money::from_dollars(500.0),
            legal_window_days: 14,
            legal_urgent_days: 3,
            dedup_key: DedupKey::Title,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerPolicy {
    pub horizon_days: i64,
    pub conservative_buffer: Money,
}

impl Default for PlannerPolicy {
    fn default() -> Self {
        Self {
            horizon_days: 90,
            conservative_buffer: Money::from_dollars(500.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatcherPolicy {
    pub lookback_days: i64,
    pub max_transactions: i64,
    pub confidence_floor: f64,
    pub name_floor: f64,
}

impl Default for MatcherPolicy {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            max_transactions: 500,
            confidence_floor: 0.6,
            name_floor: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevenuePolicy {
    pub lookback_months: u32,
    pub min_months: usize,
    pub exclusion_patterns: Vec<String>,
    /// (counterparty substring, confidence floor), sorted by substring
    pub platforms: Vec<(String, f64)>,
}

impl Default for RevenuePolicy {
    fn default() -> Self {
        let exclusion_patterns = [
            r"\btransfer\b",
            r"\bxfer\b",
            r"cash ?back",
            r"auto[ -]?transfer",
            r"interest paid",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut platforms: Vec<(String, f64)> = [
            ("airbnb", 0.95),
            ("vrbo", 0.90),
            ("booking.com", 0.85),
            ("stripe", 0.85),
            ("shopify", 0.85),
            ("square", 0.80),
            ("upwork", 0.80),
            ("doordash", 0.75),
            ("uber", 0.75),
            ("paypal", 0.70),
            ("venmo", 0.60),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        platforms.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            lookback_months: 6,
            min_months: 2,
            exclusion_patterns,
            platforms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfidencePolicy {
    pub window_days: i64,
    pub min_decisions: i64,
    pub min_payee_decisions: i64,
    pub base: HashMap<RecType, f64>,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        let base = [
            (RecType::Payment, 0.70),
            (RecType::Legal, 0.80),
            (RecType::Dispute, 0.65),
            (RecType::Negotiate, 0.55),
            (RecType::Strategy, 0.60),
            (RecType::Defer, 0.50),
            (RecType::Warning, 0.50),
        ]
        .into_iter()
        .collect();
        Self {
            window_days: 90,
            min_decisions: 5,
            min_payee_decisions: 3,
            base,
        }
    }
}

/// Full decision policy
#[derive(Debug, Clone, Default)]
pub struct PolicyConfig {
    pub escalation: EscalationPolicy,
    pub triage: TriagePolicy,
    pub planner: PlannerPolicy,
    pub matcher: MatcherPolicy,
    pub revenue: RevenuePolicy,
    pub confidence: ConfidencePolicy,
}

impl PolicyConfig {
    /// Load the policy, resolving an explicit path, then the data-dir
    /// override, then the embedded default
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::NotFound(format!(
                    "config file {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Loading policy config");
            return Self::from_toml_str(&read(path)?);
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                debug!(path = %path.display(), "Loading policy override");
                return Self::from_toml_str(&read(&path)?);
            }
        }

        Self::from_toml_str(DEFAULT_POLICY)
    }

    /// Parse a policy from TOML, merging it over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawPolicy = toml::from_str(content)?;
        let mut config = PolicyConfig::default();

        if let Some(esc) = raw.escalation {
            if let Some(multipliers) = esc.multipliers {
                for (k, v) in multipliers {
                    config.escalation.multipliers.insert(k.to_lowercase(), v);
                }
            }
            if let Some(v) = esc.credit_impact_threshold {
                config.escalation.credit_impact_threshold = v;
            }
            if let Some(v) = esc.credit_impact_boost {
                config.escalation.credit_impact_boost = v;
            }
        }

        if let Some(t) = raw.triage {
            if let Some(v) = t.recommendation_ttl_days {
                config.triage.recommendation_ttl_days = v;
            }
            if let Some(v) = t.surplus_window_days {
                config.triage.surplus_window_days = v;
            }
            if let Some(v) = t.negotiate_min_amount {
                config.triage.negotiate_min_amount = Money::from_dollars(v);
            }
            if let Some(v) = t.negotiate_savings_rate {
                config.triage.negotiate_savings_rate = v;
            }
            if let Some(v) = t.minimum_payment_surplus {
                config.triage.minimum_payment_surplus = Money::from_dollars(v);
            }
            if let Some(v) = t.legal_window_days {
                config.triage.legal_window_days = v;
            }
            if let Some(v) = t.legal_urgent_days {
                config.triage.legal_urgent_days = v;
            }
            if let Some(v) = t.dedup_key {
                config.triage.dedup_key = v.parse().map_err(Error::Config)?;
            }
        }

        if let Some(p) = raw.planner {
            if let Some(v) = p.horizon_days {
                config.planner.horizon_days = v;
            }
            if let Some(v) = p.conservative_buffer {
                config.planner.conservative_buffer = Money::from_dollars(v);
            }
        }

        if let Some(m) = raw.matcher {
            if let Some(v) = m.lookback_days {
                config.matcher.lookback_days = v;
            }
            if let Some(v) = m.max_transactions {
                config.matcher.max_transactions = v;
            }
            if let Some(v) = m.confidence_floor {
                config.matcher.confidence_floor = v;
            }
            if let Some(v) = m.name_floor {
                config.matcher.name_floor = v;
            }
        }

        if let Some(r) = raw.revenue {
            if let Some(v) = r.lookback_months {
                config.revenue.lookback_months = v;
            }
            if let Some(v) = r.min_months {
                config.revenue.min_months = v;
            }
            if let Some(v) = r.exclusion_patterns {
                config.revenue.exclusion_patterns = v;
            }
            if let Some(platforms) = r.platforms {
                for (name, conf) in platforms {
                    let name = name.to_lowercase();
                    match config.revenue.platforms.iter_mut().find(|(n, _)| *n == name) {
                        Some(entry) => entry.1 = conf,
                        None => config.revenue.platforms.push((name, conf)),
                    }
                }
                config.revenue.platforms.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }

        if let Some(c) = raw.confidence {
            if let Some(v) = c.window_days {
                config.confidence.window_days = v;
            }
            if let Some(v) = c.min_decisions {
                config.confidence.min_decisions = v;
            }
            if let Some(v) = c.min_payee_decisions {
                config.confidence.min_payee_decisions = v;
            }
            if let Some(base) = c.base {
                for (name, v) in base {
                    let rec_type: RecType = name.parse().map_err(Error::Config)?;
                    config.confidence.base.insert(rec_type, v);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in &self.escalation.multipliers {
            if !v.is_finite() || *v <= 0.0 {
                return Err(Error::Config(format!(
                    "Escalation multiplier for {} must be positive",
                    name
                )));
            }
        }
        for (name, v) in &self.revenue.platforms {
            if !(0.0..=1.0).contains(v) || *v == 0.0 {
                return Err(Error::Config(format!(
                    "Platform confidence for {} must be in (0, 1]",
                    name
                )));
            }
        }
        for (rec_type, v) in &self.confidence.base {
            if !(0.0..=1.0).contains(v) {
                return Err(Error::Config(format!(
                    "Base confidence for {} must be in [0, 1]",
                    rec_type
                )));
            }
        }
        if !(1..=MAX_HORIZON_DAYS).contains(&self.planner.horizon_days) {
            return Err(Error::Config(format!(
                "Planner horizon must be between 1 and {} days",
                MAX_HORIZON_DAYS
            )));
        }
        let windows = [
            ("triage.recommendation_ttl_days", self.triage.recommendation_ttl_days),
            ("triage.surplus_window_days", self.triage.surplus_window_days),
            ("triage.legal_window_days", self.triage.legal_window_days),
            ("triage.legal_urgent_days", self.triage.legal_urgent_days),
            ("matcher.lookback_days", self.matcher.lookback_days),
            ("confidence.window_days", self.confidence.window_days),
        ];
        for (name, days) in windows {
            if !(0..=MAX_WINDOW_DAYS).contains(&days) {
                return Err(Error::Config(format!(
                    "{} must be between 0 and {}",
                    name, MAX_WINDOW_DAYS
                )));
            }
        }
        if self.revenue.lookback_months > MAX_LOOKBACK_MONTHS {
            return Err(Error::Config(format!(
                "revenue.lookback_months must be at most {}",
                MAX_LOOKBACK_MONTHS
            )));
        }
        Ok(())
    }
}

/// Default override location (~/.local/share/settle/config/policy.toml)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("settle").join("config").join("policy.toml"))
}

fn read(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    escalation: Option<RawEscalation>,
    triage: Option<RawTriage>,
    planner: Option<RawPlanner>,
    matcher: Option<RawMatcher>,
    revenue: Option<RawRevenue>,
    confidence: Option<RawConfidence>,
}

#[derive(Debug, Deserialize)]
struct RawEscalation {
    multipliers: Option<HashMap<String, f64>>,
    credit_impact_threshold: Option<i64>,
    credit_impact_boost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTriage {
    recommendation_ttl_days: Option<i64>,
    surplus_window_days: Option<i64>,
    negotiate_min_amount: Option<f64>,
    negotiate_savings_rate: Option<f64>,
    minimum_payment_surplus: Option<f64>,
    legal_window_days: Option<i64>,
    legal_urgent_days: Option<i64>,
    dedup_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPlanner {
    horizon_days: Option<i64>,
    conservative_buffer: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMatcher {
    lookback_days: Option<i64>,
    max_transactions: Option<i64>,
    confidence_floor: Option<f64>,
    name_floor: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawRevenue {
    lookback_months: Option<u32>,
    min_months: Option<usize>,
    exclusion_patterns: Option<Vec<String>>,
    platforms: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct RawConfidence {
    window_days: Option<i64>,
    min_decisions: Option<i64>,
    min_payee_decisions: Option<i64>,
    base: Option<HashMap<String, f64>>,
}

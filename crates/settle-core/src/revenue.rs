//! Revenue source discovery
//!
//! Looks back over recent inflows for counterparties that pay into the same
//! account month after month. Internal movements (transfers, cashback,
//! interest) and payments from the user's own accounts are excluded.
//! Survivors with activity in enough distinct months become revenue sources
//! with a confidence based on known platforms, frequency and amount stability.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::RevenuePolicy;
use crate::db::Database;
use crate::error::Result;
use crate::models::{NewRevenueSource, RevenueCadence, Transaction, VerifiedBy};
use crate::money::Money;
use crate::recurrence::add_months;

/// `source` value of rows written by discovery
pub const DISCOVERY_SOURCE: &str = "discovery";

/// One discovered source
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredSource {
    pub revenue_source_id: i64,
    pub counterparty: String,
    pub account_id: i64,
    /// Mean monthly amount
    pub amount: Money,
    pub cadence: RevenueCadence,
    pub confidence: f64,
    pub occurrences: i64,
    pub months: usize,
    pub variance: f64,
    pub next_expected_date: NaiveDate,
    pub created: bool,
}

/// Results of a discovery pass
#[derive(Debug, Default, Serialize)]
pub struct RevenueDiscoveryResult {
    pub scanned: usize,
    pub excluded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub sources: Vec<DiscoveredSource>,
}

/// Confidence for a recurring counterparty.
///
/// Known platforms put a floor under the value; everyone else is tiered on
/// frequency and how much the monthly amount moves.
pub fn assign_confidence(
    counterparty: &str,
    occurrences: i64,
    variance: f64,
    platforms: &[(String, f64)],
) -> f64 {
    let stable = variance < 0.1;

    let tier = if occurrences >= 5 && stable {
        0.90
    } else if occurrences >= 3 && variance < 0.2 {
        0.80
    } else if occurrences >= 3 {
        0.65
    } else {
        0.45
    };

    let name = counterparty.to_lowercase();
    let platform = platforms
        .iter()
        .filter(|(needle, _)| name.contains(needle.as_str()))
        .map(|(_, c)| *c)
        .fold(None, |best: Option<f64>, c| Some(best.map_or(c, |b| b.max(c))));

    let confidence = match platform {
        Some(floor) if occurrences >= 5 && stable => floor.max(0.95),
        Some(floor) => floor.max(tier),
        None => tier,
    };
    confidence.clamp(0.01, 1.0)
}

/// (max - min) / max over monthly totals
fn amount_variance(monthly: &[Money]) -> f64 {
    let max = monthly.iter().copied().max().unwrap_or(Money::ZERO);
    let min = monthly.iter().copied().min().unwrap_or(Money::ZERO);
    if !max.is_positive() {
        return 0.0;
    }
    (max - min).cents() as f64 / max.cents() as f64
}

/// Inflows from one counterparty into one account
#[derive(Default)]
struct Group {
    display: String,
    occurrences: i64,
    by_month: BTreeMap<(i32, u32), Money>,
    last_date: Option<NaiveDate>,
}

/// Revenue discovery
pub struct RevenueDiscovery<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: RevenuePolicy,
}

impl<'a> RevenueDiscovery<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self::with_config(db, clock, RevenuePolicy::default())
    }

    pub fn with_config(db: &'a Database, clock: &'a dyn Clock, config: RevenuePolicy) -> Self {
        Self { db, clock, config }
    }

    fn exclusion_patterns(&self) -> Result<Vec<Regex>> {
        self.config
            .exclusion_patterns
            .iter()
            .map(|p| Ok(Regex::new(&format!("(?i){}", p))?))
            .collect()
    }

    /// Scan recent inflows and upsert recurring counterparties
    pub fn discover_revenue_sources(&self) -> Result<RevenueDiscoveryResult> {
        let today = self.clock.today();
        let since = add_months(today, -(self.config.lookback_months as i32));
        let patterns = self.exclusion_patterns()?;

        let own_accounts: Vec<String> = self
            .db
            .list_accounts()?
            .into_iter()
            .map(|a| a.name.trim().to_lowercase())
            .filter(|n| n.len() >= 3)
            .collect();

        let inflows = self.db.list_inflows_between(since, today)?;
        let mut result = RevenueDiscoveryResult {
            scanned: inflows.len(),
            ..Default::default()
        };

        let mut groups: HashMap<(String, i64), Group> = HashMap::new();
        for tx in &inflows {
            let display = counterparty_of(tx);
            let key = display.to_lowercase();
            if key.is_empty() {
                result.excluded += 1;
                continue;
            }

            let text = format!("{} {}", display, tx.description);
            if patterns.iter().any(|re| re.is_match(&text))
                || own_accounts.iter().any(|name| key.contains(name.as_str()))
            {
                result.excluded += 1;
                continue;
            }

            let group = groups.entry((key, tx.account_id)).or_default();
            if group.display.is_empty() {
                group.display = display;
            }
            group.occurrences += 1;
            *group
                .by_month
                .entry((tx.tx_date.year(), tx.tx_date.month()))
                .or_default() += tx.amount;
            group.last_date = group.last_date.max(Some(tx.tx_date));
        }

        // Stable iteration order for reproducible output
        let keys: BTreeSet<(String, i64)> = groups.keys().cloned().collect();
        let now = self.clock.now();

        for key in keys {
            let Some(group) = groups.get(&key) else {
                continue;
            };
            let months = group.by_month.len();
            if months < self.config.min_months {
                continue;
            }
            let Some(last_date) = group.last_date else {
                continue;
            };
            let (counterparty, account_id) = key;

            let monthly: Vec<Money> = group.by_month.values().copied().collect();
            let total: Money = monthly.iter().sum();
            let amount = total.divide(months as i64);
            let variance = amount_variance(&monthly);
            let confidence = assign_confidence(
                &counterparty,
                group.occurrences,
                variance,
                &self.config.platforms,
            );
            let cadence = if group.occurrences >= 3 {
                RevenueCadence::Monthly
            } else {
                RevenueCadence::Irregular
            };

            let mut next_expected = add_months(last_date, 1);
            while next_expected < today {
                next_expected = add_months(next_expected, 1);
            }

            let new = NewRevenueSource {
                source: DISCOVERY_SOURCE.to_string(),
                description: group.display.clone(),
                counterparty: counterparty.clone(),
                account_id: Some(account_id),
                amount,
                cadence,
                confidence,
                verified_by: VerifiedBy::TransactionHistory,
                occurrences: group.occurrences,
                next_expected_date: Some(next_expected),
            };

            let existing =
                self.db
                    .find_revenue_source(DISCOVERY_SOURCE, &counterparty, Some(account_id))?;
            let (id, created) = match existing {
                Some(id) => {
                    self.db.update_revenue_measurements(id, &new, now)?;
                    result.updated += 1;
                    (id, false)
                }
                None => {
                    let id = self.db.insert_revenue_source(&new, now)?;
                    result.inserted += 1;
                    (id, true)
                }
            };

            debug!(
                counterparty = %counterparty,
                account_id,
                months,
                confidence,
                created,
                "Revenue source"
            );

            result.sources.push(DiscoveredSource {
                revenue_source_id: id,
                counterparty,
                account_id,
                amount,
                cadence,
                confidence,
                occurrences: group.occurrences,
                months,
                variance,
                next_expected_date: next_expected,
                created,
            });
        }

        info!(
            scanned = result.scanned,
            excluded = result.excluded,
            inserted = result.inserted,
            updated = result.updated,
            "Revenue discovery complete"
        );
        Ok(result)
    }
}

/// Counterparty if recorded, else the description
fn counterparty_of(tx: &Transaction) -> String {
    tx.counterparty
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| tx.description.trim())
        .to_string()
}

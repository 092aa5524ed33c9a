//! Transaction-to-obligation reconciliation
//!
//! Scores every unlinked recent outflow against every open obligation:
//!
//! - name similarity (weight 0.50): share of payee tokens found in the
//!   transaction's counterparty/description
//! - amount proximity (weight 0.35): banded ratio of the smaller to the larger amount
//! - date proximity (weight 0.15): banded distance from the due date
//!
//! A pair with name similarity under the floor is never a match. Each
//! transaction links to its single best obligation above the confidence
//! floor, and each obligation is claimed at most once per run.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::MatcherPolicy;
use crate::db::Database;
use crate::error::Result;
use crate::models::{Obligation, Transaction};
use crate::money::Money;

const NAME_WEIGHT: f64 = 0.50;
const AMOUNT_WEIGHT: f64 = 0.35;
const DATE_WEIGHT: f64 = 0.15;

/// Tokens that carry no payee identity
const STOPWORDS: &[&str] = &[
    "the", "inc", "llc", "ltd", "co", "corp", "company", "of", "and", "payment", "pmt", "pymt",
    "bill", "online", "ach", "debit", "autopay", "web", "pos", "purchase", "www", "com",
];

/// One accepted link
#[derive(Debug, Clone, Serialize)]
pub struct TransactionMatch {
    pub transaction_id: i64,
    pub obligation_id: i64,
    pub payee: String,
    pub amount: Money,
    pub confidence: f64,
    pub name_score: f64,
    pub amount_score: f64,
    pub date_score: f64,
}

/// Results of a matching pass
#[derive(Debug, Default, Serialize)]
pub struct MatchResult {
    pub scanned: usize,
    pub matched: usize,
    pub paid: usize,
    pub matches: Vec<TransactionMatch>,
}

/// Lowercase, split on anything that is not a letter or digit
fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Tokens with stopwords removed, unless that would leave nothing
fn significant_tokens(s: &str) -> Vec<String> {
    let all = tokenize(s);
    let filtered: Vec<String> = all
        .iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .cloned()
        .collect();
    if filtered.is_empty() {
        all
    } else {
        filtered
    }
}

fn token_matches(payee_token: &str, tx_token: &str) -> bool {
    if payee_token == tx_token {
        return true;
    }
    // Truncated bank descriptors ("COMCAS" for "comcast") match on a shared prefix
    payee_token.len() >= 4
        && tx_token.len() >= 4
        && (payee_token.starts_with(tx_token) || tx_token.starts_with(payee_token))
}

/// Share of the payee's tokens that appear in the transaction text (0..=1)
pub fn name_similarity(payee: &str, transaction_text: &str) -> f64 {
    let payee_tokens = significant_tokens(payee);
    if payee_tokens.is_empty() {
        return 0.0;
    }
    let tx_tokens = tokenize(transaction_text);

    let matched = payee_tokens
        .iter()
        .filter(|p| tx_tokens.iter().any(|t| token_matches(p, t)))
        .count();

    matched as f64 / payee_tokens.len() as f64
}

/// Banded closeness of a paid amount to the amount due
pub fn amount_proximity(paid: Money, due: Option<Money>) -> f64 {
    let due = match due {
        Some(d) if !d.is_zero() => d.abs(),
        _ => return 0.5,
    };
    let paid = paid.abs();
    if paid == due {
        return 1.0;
    }

    let (lo, hi) = if paid < due { (paid, due) } else { (due, paid) };
    let ratio = lo.cents() as f64 / hi.cents() as f64;
    if ratio >= 0.95 {
        0.95
    } else if ratio >= 0.8 {
        0.7
    } else if ratio >= 0.5 {
        0.3
    } else {
        0.1
    }
}

/// Banded closeness of the transaction date to the due date
pub fn date_proximity(tx_date: NaiveDate, due: Option<NaiveDate>) -> f64 {
    let due = match due {
        Some(d) => d,
        None => return 0.5,
    };
    match (tx_date - due).num_days().abs() {
        0..=3 => 1.0,
        4..=7 => 0.8,
        8..=14 => 0.5,
        15..=30 => 0.3,
        _ => 0.1,
    }
}

/// Transaction matcher
pub struct TransactionMatcher<'a> {
    db: &'a Database,
    clock: &'a dyn Clock,
    config: MatcherPolicy,
}

impl<'a> TransactionMatcher<'a> {
    pub fn new(db: &'a Database, clock: &'a dyn Clock) -> Self {
        Self::with_config(db, clock, MatcherPolicy::default())
    }

    pub fn with_config(db: &'a Database, clock: &'a dyn Clock, config: MatcherPolicy) -> Self {
        Self { db, clock, config }
    }

    /// Score one pair; None if the names are too far apart
    fn score_pair(&self, tx: &Transaction, ob: &Obligation) -> Option<TransactionMatch> {
        let text = format!(
            "{} {}",
            tx.counterparty.as_deref().unwrap_or_default(),
            tx.description
        );
        let name_score = name_similarity(&ob.payee, &text);
        if name_score < self.config.name_floor {
            return None;
        }

        let amount_score = amount_proximity(tx.amount, ob.amount_due);
        let date_score = date_proximity(tx.tx_date, ob.due_date);
        let confidence =
            NAME_WEIGHT * name_score + AMOUNT_WEIGHT * amount_score + DATE_WEIGHT * date_score;

        Some(TransactionMatch {
            transaction_id: tx.id,
            obligation_id: ob.id,
            payee: ob.payee.clone(),
            amount: tx.amount,
            confidence,
            name_score,
            amount_score,
            date_score,
        })
    }

    /// Link recent unmatched outflows to open obligations and mark them paid
    pub fn match_transactions(&self) -> Result<MatchResult> {
        let today = self.clock.today();
        let since = today - Duration::days(self.config.lookback_days);

        let transactions = self
            .db
            .list_unlinked_outflows(since, self.config.max_transactions)?;
        let obligations = self.db.list_open_obligations()?;

        let mut result = MatchResult {
            scanned: transactions.len(),
            ..Default::default()
        };
        if obligations.is_empty() {
            info!(scanned = result.scanned, "No open obligations to match");
            return Ok(result);
        }

        let mut claimed: HashSet<i64> = HashSet::new();

        for tx in &transactions {
            let best = obligations
                .iter()
                .filter(|ob| !claimed.contains(&ob.id))
                .filter_map(|ob| self.score_pair(tx, ob))
                .filter(|m| m.confidence > self.config.confidence_floor)
                .max_by(|a, b| {
                    a.confidence
                        .total_cmp(&b.confidence)
                        // Ties go to the lower obligation id
                        .then(b.obligation_id.cmp(&a.obligation_id))
                });

            let Some(m) = best else {
                continue;
            };
            claimed.insert(m.obligation_id);

            match self.apply_match(&m) {
                Ok(paid) => {
                    debug!(
                        transaction_id = m.transaction_id,
                        obligation_id = m.obligation_id,
                        confidence = m.confidence,
                        "Matched transaction"
                    );
                    result.matched += 1;
                    if paid {
                        result.paid += 1;
                    }
                    result.matches.push(m);
                }
                Err(e) => {
                    warn!(
                        transaction_id = m.transaction_id,
                        obligation_id = m.obligation_id,
                        error = %e,
                        "Failed to apply match"
                    );
                }
            }
        }

        info!(
            scanned = result.scanned,
            matched = result.matched,
            paid = result.paid,
            "Transaction matching complete"
        );
        Ok(result)
    }

    /// Link, mark paid, audit. Returns whether the obligation was marked paid.
    fn apply_match(&self, m: &TransactionMatch) -> Result<bool> {
        let now = self.clock.now();

        if !self.db.link_transaction(m.transaction_id, m.obligation_id)? {
            return Err(crate::error::Error::InvalidData(format!(
                "transaction {} is already linked",
                m.transaction_id
            )));
        }
        let paid = self.db.mark_obligation_paid(m.obligation_id, now)?;

        let details = serde_json::json!({
            "transaction_id": m.transaction_id,
            "payee": m.payee,
            "amount": m.amount,
            "confidence": (m.confidence * 1000.0).round() / 1000.0,
        })
        .to_string();
        self.db.log_audit(
            "matcher",
            "transaction_matched",
            Some("obligation"),
            Some(m.obligation_id),
            Some(&details),
            now,
        )?;

        Ok(paid)
    }
}

//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Balance-bearing accounts
//! - `obligations` - Payment duties, urgency cache, status transitions
//! - `transactions` - Observed money movements and obligation links
//! - `revenue` - Discovered and declared revenue sources
//! - `recommendations` - Triage output and expiry
//! - `feedback` - Decisions on recommendations and their outcomes
//! - `plans` - Saved payment plans and activation
//! - `projections` - Cash-flow forecast points
//! - `disputes` - Disputes and legal deadlines
//! - `audit` - Audit log and automation run log

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod audit;
mod disputes;
mod feedback;
mod obligations;
mod plans;
mod projections;
mod recommendations;
mod revenue;
mod transactions;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SETTLE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"settle-salt-v1-k";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
///
/// Falls back to the Unix epoch for unparseable values so reads never fail
/// on a bad timestamp.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_default()
}

/// Parse a stored DATE column; empty or malformed values become None
pub(crate) fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

pub(crate) fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SETTLE_DB_KEY` to be set. Use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            // The key pragma must run before anything else on the connection
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an isolated scratch database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "settle_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Accounts (kept current by sync collaborators, never by the engine)
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                account_type TEXT NOT NULL,            -- checking, savings, credit, mortgage, loan
                current_balance REAL NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Obligations (bills, debts, taxes)
            CREATE TABLE IF NOT EXISTS obligations (
                id INTEGER PRIMARY KEY,
                account_id INTEGER REFERENCES accounts(id),
                category TEXT NOT NULL DEFAULT 'other',
                payee TEXT NOT NULL,
                amount_due REAL,                       -- NULL = not yet known
                amount_minimum REAL,
                due_date DATE,
                recurrence TEXT NOT NULL DEFAULT 'none', -- none, monthly, quarterly, annual
                recurrence_day INTEGER,
                status TEXT NOT NULL DEFAULT 'pending', -- pending, overdue, paid, disputed, deferred
                auto_pay BOOLEAN NOT NULL DEFAULT 0,
                negotiable BOOLEAN NOT NULL DEFAULT 0,
                late_fee REAL DEFAULT 0,
                grace_period_days INTEGER DEFAULT 0,
                urgency_score INTEGER NOT NULL DEFAULT 0,
                escalation_type TEXT,                  -- collections, service_shutoff, legal, ...
                credit_impact_score INTEGER DEFAULT 0,
                preferred_account_id INTEGER REFERENCES accounts(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_obligations_status ON obligations(status);
            CREATE INDEX IF NOT EXISTS idx_obligations_due ON obligations(due_date);

            -- Transactions (amount is always a non-negative magnitude)
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                obligation_id INTEGER REFERENCES obligations(id),
                direction TEXT NOT NULL,               -- inflow, outflow
                amount REAL NOT NULL CHECK (amount >= 0),
                counterparty TEXT,
                description TEXT NOT NULL DEFAULT '',
                tx_date DATE NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(tx_date);
            CREATE INDEX IF NOT EXISTS idx_transactions_unlinked ON transactions(direction, obligation_id);

            -- Revenue sources (discovered or declared recurring inflows)
            CREATE TABLE IF NOT EXISTS revenue_sources (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,                  -- discovery, manual
                description TEXT NOT NULL,
                counterparty TEXT NOT NULL,
                account_id INTEGER REFERENCES accounts(id),
                amount REAL NOT NULL,
                cadence TEXT NOT NULL,                 -- weekly, biweekly, monthly, quarterly, annual, irregular
                confidence REAL NOT NULL,
                verified_by TEXT NOT NULL,             -- manual, transaction_history, validated_match
                occurrences INTEGER NOT NULL DEFAULT 0,
                next_expected_date DATE,
                active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(source, counterparty, account_id)
            );

            -- Disputes
            CREATE TABLE IF NOT EXISTS disputes (
                id INTEGER PRIMARY KEY,
                obligation_id INTEGER REFERENCES obligations(id),
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',   -- open, resolved
                next_action TEXT,
                next_action_date DATE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Legal deadlines
            CREATE TABLE IF NOT EXISTS legal_deadlines (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                case_ref TEXT,
                deadline_date DATE NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Recommendations (triage output)
            CREATE TABLE IF NOT EXISTS recommendations (
                id INTEGER PRIMARY KEY,
                rec_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                title TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                action TEXT NOT NULL,
                obligation_id INTEGER REFERENCES obligations(id),
                dispute_id INTEGER REFERENCES disputes(id),
                legal_deadline_id INTEGER REFERENCES legal_deadlines(id),
                payee TEXT,
                estimated_savings REAL NOT NULL DEFAULT 0,
                confidence REAL NOT NULL,
                dedup_key TEXT NOT NULL,               -- content key: rec_type|target|action digest
                status TEXT NOT NULL DEFAULT 'active', -- active, completed, dismissed, expired
                created_at DATETIME NOT NULL,
                decided_at DATETIME
            );

            CREATE INDEX IF NOT EXISTS idx_recommendations_status ON recommendations(status, created_at);

            -- Decision feedback (one decision per recommendation, append-only)
            CREATE TABLE IF NOT EXISTS decision_feedback (
                id INTEGER PRIMARY KEY,
                recommendation_id INTEGER NOT NULL UNIQUE REFERENCES recommendations(id),
                rec_type TEXT NOT NULL,
                payee TEXT,
                decision TEXT NOT NULL,                -- approved, rejected, deferred, modified
                confidence_at_decision REAL NOT NULL,
                decided_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_decision_feedback_type ON decision_feedback(rec_type, decided_at);
            CREATE INDEX IF NOT EXISTS idx_decision_feedback_payee ON decision_feedback(payee, decided_at);

            -- Decision outcomes (informational)
            CREATE TABLE IF NOT EXISTS decision_outcomes (
                id INTEGER PRIMARY KEY,
                feedback_id INTEGER NOT NULL REFERENCES decision_feedback(id),
                outcome_status TEXT NOT NULL,          -- succeeded, partial, failed
                notes TEXT,
                recorded_at DATETIME NOT NULL
            );

            -- Payment plans (schedule/warnings/revenue summary stored as JSON)
            CREATE TABLE IF NOT EXISTS payment_plans (
                id INTEGER PRIMARY KEY,
                strategy TEXT NOT NULL,
                horizon_days INTEGER NOT NULL,
                start_date DATE NOT NULL,
                starting_balance REAL NOT NULL,
                ending_balance REAL NOT NULL,
                lowest_balance REAL NOT NULL,
                lowest_balance_date DATE NOT NULL,
                total_inflows REAL NOT NULL,
                total_outflows REAL NOT NULL,
                late_fees_avoided REAL NOT NULL,
                late_fees_risked REAL NOT NULL,
                schedule TEXT NOT NULL,
                warnings TEXT NOT NULL,
                revenue_summary TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',  -- draft, active, abandoned
                created_at DATETIME NOT NULL,
                activated_at DATETIME,
                abandoned_at DATETIME
            );

            -- At most one active plan
            CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_plans_single_active
                ON payment_plans(status) WHERE status = 'active';

            -- Cash-flow projections (replaced on regenerate)
            CREATE TABLE IF NOT EXISTS projections (
                id INTEGER PRIMARY KEY,
                projection_date DATE NOT NULL UNIQUE,
                day_index INTEGER NOT NULL,
                inflow REAL NOT NULL,
                outflow REAL NOT NULL,
                balance REAL NOT NULL,
                confidence REAL NOT NULL,
                generated_at DATETIME NOT NULL
            );

            -- Audit log (matches, decisions, activations)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action);

            -- Automation runs (one row per pipeline pass)
            CREATE TABLE IF NOT EXISTS automation_runs (
                id INTEGER PRIMARY KEY,
                triggered_by TEXT NOT NULL,            -- manual, scheduled
                status TEXT NOT NULL DEFAULT 'running',
                phases TEXT NOT NULL DEFAULT '[]',
                error TEXT,
                started_at DATETIME NOT NULL,
                finished_at DATETIME
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Audit log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests;

//! Transaction operations

use chrono::NaiveDate;
use rusqlite::{params, Row};

use super::{format_date, Database};
use crate::error::{Error, Result};
use crate::models::{Direction, NewTransaction, Transaction};
use crate::money::Money;

const TRANSACTION_COLUMNS: &str =
    "id, account_id, obligation_id, direction, amount, counterparty, description, tx_date";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let direction: String = row.get(3)?;
    let amount: f64 = row.get(4)?;
    let tx_date: String = row.get(7)?;
    let tx_date = NaiveDate::parse_from_str(&tx_date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        obligation_id: row.get(2)?,
        direction: direction.parse().unwrap_or(Direction::Outflow),
        amount: Money::from_dollars(amount),
        counterparty: row.get(5)?,
        description: row.get(6)?,
        tx_date,
    })
}

impl Database {
    /// Record an observed transaction. Amount must be a non-negative magnitude.
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        if tx.amount.is_negative() {
            return Err(Error::InvalidData(format!(
                "Transaction amount must be non-negative, got {}",
                tx.amount
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO transactions (account_id, direction, amount, counterparty, description, tx_date)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.account_id,
                tx.direction.as_str(),
                tx.amount.to_dollars(),
                tx.counterparty,
                tx.description,
                format_date(tx.tx_date),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a transaction by ID
    pub fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS),
                params![id],
                row_to_transaction,
            )
            .ok();
        Ok(tx)
    }

    /// Most recent transactions first
    pub fn list_transactions(&self, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM transactions ORDER BY tx_date DESC, id DESC LIMIT ?",
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(params![limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Outflows on or after `since` with no obligation link, most recent first
    pub fn list_unlinked_outflows(&self, since: NaiveDate, limit: i64) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE direction = 'outflow' AND obligation_id IS NULL AND tx_date >= ?
            ORDER BY tx_date DESC, id DESC
            LIMIT ?
            "#,
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(params![format_date(since), limit], row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Inflows dated in `[since, until]`, oldest first
    pub fn list_inflows_between(&self, since: NaiveDate, until: NaiveDate) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE direction = 'inflow' AND tx_date >= ? AND tx_date <= ?
            ORDER BY tx_date, id
            "#,
            TRANSACTION_COLUMNS
        ))?;
        let txs = stmt
            .query_map(
                params![format_date(since), format_date(until)],
                row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(txs)
    }

    /// Link a transaction to an obligation.
    ///
    /// Returns false when the transaction is already linked; a link is never
    /// reassigned.
    pub fn link_transaction(&self, transaction_id: i64, obligation_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE transactions SET obligation_id = ? WHERE id = ? AND obligation_id IS NULL",
            params![obligation_id, transaction_id],
        )?;
        Ok(n > 0)
    }
}

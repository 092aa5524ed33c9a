//! Account operations

use rusqlite::{params, Row};

use super::Database;
use crate::error::Result;
use crate::models::{Account, AccountType};
use crate::money::Money;

const ACCOUNT_COLUMNS: &str = "id, name, account_type, current_balance";

fn row_to_account(row: &Row) -> rusqlite::Result<Account> {
    let account_type_str: String = row.get(2)?;
    let balance: Option<f64> = row.get(3)?;
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type: account_type_str.parse().unwrap_or(AccountType::Checking),
        current_balance: Money::from_dollars(balance.unwrap_or(0.0)),
    })
}

impl Database {
    /// Create an account, or update the balance of the one with this name
    pub fn upsert_account(
        &self,
        name: &str,
        account_type: AccountType,
        current_balance: Money,
    ) -> Result<i64> {
        let conn = self.conn()?;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM accounts WHERE name = ?",
                params![name],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing {
            conn.execute(
                "UPDATE accounts SET account_type = ?, current_balance = ? WHERE id = ?",
                params![account_type.as_str(), current_balance.to_dollars(), id],
            )?;
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO accounts (name, account_type, current_balance) VALUES (?, ?, ?)",
            params![name, account_type.as_str(), current_balance.to_dollars()],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Set an account's balance (sync collaborators only)
    pub fn update_account_balance(&self, id: i64, balance: Money) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE accounts SET current_balance = ? WHERE id = ?",
            params![balance.to_dollars(), id],
        )?;
        Ok(n > 0)
    }

    /// List all accounts
    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts ORDER BY name",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map([], row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get an account by ID
    pub fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
                params![id],
                row_to_account,
            )
            .ok();

        Ok(account)
    }

    /// Sum of checking and savings balances
    pub fn cash_balance(&self) -> Result<Money> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(current_balance), 0) FROM accounts
             WHERE account_type IN ('checking', 'savings')",
            [],
            |row| row.get(0),
        )?;
        Ok(Money::from_dollars(total))
    }
}

//! External-store engine variant and the account seed
//!
//! [`SqlLedger`] posts each transaction inside one database transaction:
//! a dedupe probe on the unique `ref_id` index, pessimistic row locks
//! acquired in ascending account-id order, balance validation and update,
//! then the transaction record insert. The database provides durability,
//! so this variant uses no WAL.
//!
//! [`load_all_accounts`] is the startup seed for the in-memory variants:
//! one query returning the full `{id -> balance}` population.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE accounts (
//!   id      BIGINT PRIMARY KEY,
//!   balance BIGINT NOT NULL
//! );
//! CREATE TABLE transactions (
//!   id              BIGINT PRIMARY KEY AUTO_INCREMENT,
//!   ref_id          BINARY(16) NOT NULL UNIQUE,
//!   sequence        BIGINT UNSIGNED NOT NULL,
//!   from_account_id BIGINT NOT NULL,
//!   to_account_id   BIGINT NOT NULL,
//!   amount          BIGINT NOT NULL,
//!   kind            TINYINT UNSIGNED NOT NULL,
//!   created_at      BIGINT NOT NULL
//! );
//! ```

use std::collections::HashMap;

use sqlx::{MySqlPool, Row};

use crate::error::{Error, Result};
use crate::types::{AccountId, Transaction, TransactionType};

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}

/// Load the full account population from the external store.
pub async fn load_all_accounts(pool: &MySqlPool) -> Result<HashMap<AccountId, i64>> {
    let rows = sqlx::query("SELECT id, balance FROM accounts")
        .fetch_all(pool)
        .await
        .map_err(db_err)?;

    let mut balances = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id").map_err(db_err)?;
        let balance: i64 = row.try_get("balance").map_err(db_err)?;
        balances.insert(AccountId::new(id), balance);
    }
    Ok(balances)
}

/// Relational transaction engine.
pub struct SqlLedger {
    pool: MySqlPool,
}

impl SqlLedger {
    /// Wrap a connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Post one transaction. Duplicate submissions acknowledge `Ok`.
    pub async fn post(&self, tran: &Transaction) -> Result<()> {
        tran.validate()?;
        match self.post_inner(tran).await {
            Err(Error::TransactionAlreadyProcessed) => Ok(()),
            other => other,
        }
    }

    async fn post_inner(&self, tran: &Transaction) -> Result<()> {
        let mut db = self.pool.begin().await.map_err(db_err)?;
        let ref_id = tran.transaction_id.as_bytes().to_vec();

        // Dedupe probe; its failure aborts the post outright.
        let existing = sqlx::query("SELECT id FROM transactions WHERE ref_id = ?")
            .bind(ref_id.clone())
            .fetch_optional(&mut *db)
            .await
            .map_err(|e| Error::SelectTransactionFailed(e.to_string()))?;
        if existing.is_some() {
            return Err(Error::TransactionAlreadyProcessed);
        }

        // Row locks in ascending id order so opposing transfers cannot
        // deadlock each other.
        let mut balances = HashMap::new();
        for id in tran.lock_ids() {
            let row = sqlx::query("SELECT balance FROM accounts WHERE id = ? FOR UPDATE")
                .bind(id.get())
                .fetch_optional(&mut *db)
                .await
                .map_err(db_err)?
                .ok_or(Error::AccountNotFound(id))?;
            let balance: i64 = row.try_get("balance").map_err(db_err)?;
            balances.insert(id, balance);
        }

        let updates = compute_updates(tran, &balances)?;
        for (id, balance) in updates {
            sqlx::query("UPDATE accounts SET balance = ? WHERE id = ?")
                .bind(balance)
                .bind(id.get())
                .execute(&mut *db)
                .await
                .map_err(db_err)?;
        }

        let inserted = sqlx::query(
            "INSERT INTO transactions \
             (ref_id, sequence, from_account_id, to_account_id, amount, kind, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ref_id)
        .bind(tran.sequence)
        .bind(tran.from.get())
        .bind(tran.to.get())
        .bind(tran.amount)
        .bind(tran.kind as u8)
        .bind(tran.created_at_millis)
        .execute(&mut *db)
        .await;

        match inserted {
            Ok(_) => {}
            // Lost a race against a concurrent retry of the same id; the
            // rollback on drop discards our balance updates.
            Err(e) if e
                .as_database_error()
                .map_or(false, |d| d.is_unique_violation()) =>
            {
                return Err(Error::TransactionAlreadyProcessed);
            }
            Err(e) => return Err(db_err(e)),
        }

        db.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// Current balance of one account.
    pub async fn balance(&self, account: AccountId) -> Result<i64> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = ?")
            .bind(account.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(Error::AccountNotFound(account))?;
        row.try_get("balance").map_err(db_err)
    }

    /// Full `{id -> balance}` population.
    pub async fn load_all_accounts(&self) -> Result<HashMap<AccountId, i64>> {
        load_all_accounts(&self.pool).await
    }
}

/// New balances for the accounts a transaction touches.
fn compute_updates(
    tran: &Transaction,
    balances: &HashMap<AccountId, i64>,
) -> Result<Vec<(AccountId, i64)>> {
    let read = |id: AccountId| -> Result<i64> {
        balances.get(&id).copied().ok_or(Error::AccountNotFound(id))
    };

    match tran.kind {
        TransactionType::Deposit => {
            let credited = read(tran.to)?
                .checked_add(tran.amount)
                .ok_or(Error::BalanceOverflow(tran.to))?;
            Ok(vec![(tran.to, credited)])
        }
        TransactionType::Withdraw => {
            let balance = read(tran.from)?;
            if balance < tran.amount {
                return Err(Error::InsufficientBalance);
            }
            Ok(vec![(tran.from, balance - tran.amount)])
        }
        TransactionType::Transfer => {
            let from_balance = read(tran.from)?;
            if from_balance < tran.amount {
                return Err(Error::InsufficientBalance);
            }
            let credited = read(tran.to)?
                .checked_add(tran.amount)
                .ok_or(Error::BalanceOverflow(tran.to))?;
            Ok(vec![
                (tran.from, from_balance - tran.amount),
                (tran.to, credited),
            ])
        }
    }
}

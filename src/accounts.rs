//! Account store and idempotency index
//!
//! [`AccountStore`] owns the account population; it is populated once at
//! startup from the external seed and mutated only by the transaction
//! engine. [`IdempotencyIndex`] owns the set of applied transaction ids.
//! Neither type synchronizes: the engine variant that holds them provides
//! the serialization discipline.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Account, AccountId, Transaction, TransactionType};

/// Mapping from account id to its balance record.
#[derive(Debug, Default)]
pub struct AccountStore {
    accounts: HashMap<AccountId, Account>,
}

impl AccountStore {
    /// Build the store from the seed population.
    pub fn new(balances: HashMap<AccountId, i64>) -> Self {
        let accounts = balances
            .into_iter()
            .map(|(id, balance)| (id, Account::new(id, balance)))
            .collect();
        Self { accounts }
    }

    /// Current balance of `id`.
    pub fn balance(&self, id: AccountId) -> Result<i64> {
        self.accounts
            .get(&id)
            .map(|account| account.balance)
            .ok_or(Error::AccountNotFound(id))
    }

    /// Number of accounts in the population.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// True when the population is empty.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Apply a validated transaction, dispatching on its type.
    ///
    /// The amount is re-checked here so the store refuses bad input even
    /// if a caller skips engine validation.
    pub fn apply(&mut self, tran: &Transaction) -> Result<()> {
        if tran.amount < 1 {
            return Err(Error::AmountMustBePositive);
        }
        match tran.kind {
            TransactionType::Deposit => self.apply_deposit(tran.to, tran.amount),
            TransactionType::Withdraw => self.apply_withdraw(tran.from, tran.amount),
            TransactionType::Transfer => self.apply_transfer(tran.from, tran.to, tran.amount),
        }
    }

    fn apply_deposit(&mut self, to: AccountId, amount: i64) -> Result<()> {
        let account = self
            .accounts
            .get_mut(&to)
            .ok_or(Error::AccountNotFound(to))?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow(to))?;
        Ok(())
    }

    fn apply_withdraw(&mut self, from: AccountId, amount: i64) -> Result<()> {
        let account = self
            .accounts
            .get_mut(&from)
            .ok_or(Error::AccountNotFound(from))?;
        if account.balance < amount {
            return Err(Error::InsufficientBalance);
        }
        account.balance -= amount;
        Ok(())
    }

    /// Debit `from` and credit `to` as one observable step.
    ///
    /// Every failure condition (existence, funds, overflow) is checked
    /// before either side mutates, so an error never leaves the debit
    /// without the credit.
    fn apply_transfer(&mut self, from: AccountId, to: AccountId, amount: i64) -> Result<()> {
        if from == to {
            return Err(Error::SelfTransfer);
        }
        let from_balance = self.balance(from)?;
        let to_balance = self.balance(to)?;
        if from_balance < amount {
            return Err(Error::InsufficientBalance);
        }
        let credited = to_balance
            .checked_add(amount)
            .ok_or(Error::BalanceOverflow(to))?;

        // Both ids were present above; the map is not touched in between.
        self.accounts
            .get_mut(&from)
            .expect("debited account vanished")
            .balance = from_balance - amount;
        self.accounts
            .get_mut(&to)
            .expect("credited account vanished")
            .balance = credited;
        Ok(())
    }

    /// Copy of the current `{id -> balance}` map.
    pub fn snapshot(&self) -> HashMap<AccountId, i64> {
        self.accounts
            .iter()
            .map(|(id, account)| (*id, account.balance))
            .collect()
    }

    /// Sum of all balances, widened so the sum itself cannot overflow.
    pub fn total_balance(&self) -> i128 {
        self.accounts
            .values()
            .map(|account| i128::from(account.balance))
            .sum()
    }
}

/// Set of transaction ids that were seen and successfully applied.
///
/// Updated only after a successful store mutation: a transaction that
/// failed business validation never enters, so its retry re-runs.
#[derive(Debug, Default)]
pub struct IdempotencyIndex {
    seen: HashSet<Uuid>,
}

impl IdempotencyIndex {
    /// True when `id` was already applied.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    /// Record `id` as applied.
    pub fn insert(&mut self, id: Uuid) {
        self.seen.insert(id);
    }

    /// Number of applied ids.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when nothing was applied yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

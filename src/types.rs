//! Core domain types for the ledger
//!
//! All monetary values are fixed-scale signed integers ([`AMOUNT_SCALE`]
//! units per currency unit); floating point never touches money. Types are
//! serde-derived because transactions are bincode-framed into the WAL.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fixed-point scale: one currency unit is 10,000 ledger units.
pub const AMOUNT_SCALE: i64 = 10_000;

/// Account identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    /// Create new account ID
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw numeric id
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An account with its current balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier, immutable for the process lifetime
    pub id: AccountId,
    /// Current balance in fixed-scale units; never negative after a
    /// completed transaction
    pub balance: i64,
}

impl Account {
    /// Create an account with an initial balance
    pub fn new(id: AccountId, balance: i64) -> Self {
        Self { id, balance }
    }
}

/// Transaction type (closed enumeration)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionType {
    /// Credit `to`
    Deposit = 1,
    /// Debit `from`
    Withdraw = 2,
    /// Debit `from`, credit `to` as one step
    Transfer = 3,
}

/// A monetary transaction submitted for posting
///
/// Owned by the caller until `post` completes; conceptually moved into the
/// WAL on append and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// External tracking id; the idempotency key
    pub transaction_id: Uuid,
    /// Transaction type
    pub kind: TransactionType,
    /// Debited account (meaningful for Withdraw and Transfer)
    pub from: AccountId,
    /// Credited account (meaningful for Deposit and Transfer)
    pub to: AccountId,
    /// Amount in fixed-scale units, must be >= 1
    pub amount: i64,
    /// Global order number assigned by the applier before the WAL append;
    /// zero means not yet assigned
    pub sequence: u64,
    /// Submission timestamp, milliseconds since the Unix epoch
    pub created_at_millis: i64,
}

impl Transaction {
    /// A deposit crediting `to`
    pub fn deposit(transaction_id: Uuid, to: AccountId, amount: i64, created_at_millis: i64) -> Self {
        Self {
            transaction_id,
            kind: TransactionType::Deposit,
            from: AccountId::new(0),
            to,
            amount,
            sequence: 0,
            created_at_millis,
        }
    }

    /// A withdrawal debiting `from`
    pub fn withdraw(
        transaction_id: Uuid,
        from: AccountId,
        amount: i64,
        created_at_millis: i64,
    ) -> Self {
        Self {
            transaction_id,
            kind: TransactionType::Withdraw,
            from,
            to: AccountId::new(0),
            amount,
            sequence: 0,
            created_at_millis,
        }
    }

    /// A transfer moving `amount` from `from` to `to`
    pub fn transfer(
        transaction_id: Uuid,
        from: AccountId,
        to: AccountId,
        amount: i64,
        created_at_millis: i64,
    ) -> Self {
        Self {
            transaction_id,
            kind: TransactionType::Transfer,
            from,
            to,
            amount,
            sequence: 0,
            created_at_millis,
        }
    }

    /// Structural validation, run before any WAL or store effect.
    pub fn validate(&self) -> Result<()> {
        if self.amount < 1 {
            return Err(Error::AmountMustBePositive);
        }
        if self.kind == TransactionType::Transfer && self.from == self.to {
            return Err(Error::SelfTransfer);
        }
        Ok(())
    }

    /// Accounts this transaction touches, ascending by id.
    ///
    /// The ascending order is the lock-acquisition order for stores with
    /// per-row locks; it rules out deadlock cycles between concurrent
    /// transfers in opposite directions.
    pub fn lock_ids(&self) -> Vec<AccountId> {
        match self.kind {
            TransactionType::Deposit => vec![self.to],
            TransactionType::Withdraw => vec![self.from],
            TransactionType::Transfer => {
                if self.from < self.to {
                    vec![self.from, self.to]
                } else {
                    vec![self.to, self.from]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_positive_amounts() {
        let id = Uuid::new_v4();
        let zero = Transaction::deposit(id, AccountId::new(1), 0, 0);
        assert!(matches!(zero.validate(), Err(Error::AmountMustBePositive)));

        let negative = Transaction::withdraw(id, AccountId::new(1), -5, 0);
        assert!(matches!(
            negative.validate(),
            Err(Error::AmountMustBePositive)
        ));
    }

    #[test]
    fn validate_rejects_self_transfer() {
        let tx = Transaction::transfer(Uuid::new_v4(), AccountId::new(3), AccountId::new(3), 10, 0);
        assert!(matches!(tx.validate(), Err(Error::SelfTransfer)));
    }

    #[test]
    fn lock_ids_are_ascending() {
        let forward =
            Transaction::transfer(Uuid::new_v4(), AccountId::new(1), AccountId::new(2), 10, 0);
        let backward =
            Transaction::transfer(Uuid::new_v4(), AccountId::new(2), AccountId::new(1), 10, 0);
        assert_eq!(forward.lock_ids(), backward.lock_ids());
        assert_eq!(forward.lock_ids(), vec![AccountId::new(1), AccountId::new(2)]);
    }

    #[test]
    fn lock_ids_single_sided() {
        let deposit = Transaction::deposit(Uuid::new_v4(), AccountId::new(9), 10, 0);
        assert_eq!(deposit.lock_ids(), vec![AccountId::new(9)]);

        let withdraw = Transaction::withdraw(Uuid::new_v4(), AccountId::new(4), 10, 0);
        assert_eq!(withdraw.lock_ids(), vec![AccountId::new(4)]);
    }
}

//! Exclusive-lock engine variant
//!
//! A single `RwLock` guards the account store and the idempotency index
//! for the whole applier protocol; the WAL append and its durability
//! barrier happen inside the exclusive section, so the critical section is
//! intentionally broad. Throughput ceiling: one writer at a time, many
//! concurrent balance readers.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::accounts::AccountStore;
use crate::error::{Error, Result};
use crate::ledger::LedgerCore;
use crate::recovery::RecoveryReport;
use crate::types::{AccountId, Transaction};
use crate::wal::WriteAheadLog;

/// Lock-based transaction engine.
pub struct MutexLedger {
    state: RwLock<LedgerCore>,
    wal: WriteAheadLog,
    /// When false, balance reads also take the write lock.
    shared_reads: bool,
}

impl MutexLedger {
    /// Construct the engine, replaying the WAL before any traffic.
    pub fn new(
        accounts: AccountStore,
        wal: WriteAheadLog,
        shared_reads: bool,
    ) -> Result<(Self, RecoveryReport)> {
        let (core, report) = LedgerCore::recover(accounts, &wal)?;
        let engine = Self {
            state: RwLock::new(core),
            wal,
            shared_reads,
        };
        Ok((engine, report))
    }

    /// Post one transaction under the exclusive lock.
    pub fn post(&self, tran: Transaction) -> Result<()> {
        let mut state = self.state.write();
        match state.post(&self.wal, tran) {
            Err(Error::TransactionAlreadyProcessed) => Ok(()),
            other => other,
        }
    }

    /// Current balance; sees the latest committed mutation.
    pub fn balance(&self, account: AccountId) -> Result<i64> {
        if self.shared_reads {
            self.state.read().accounts.balance(account)
        } else {
            self.state.write().accounts.balance(account)
        }
    }

    /// Copy of the full account population.
    pub fn snapshot(&self) -> HashMap<AccountId, i64> {
        self.state.read().accounts.snapshot()
    }

    /// Flush the WAL; the engine accepts no further guarantees after this.
    pub fn close(&self) -> Result<()> {
        self.wal.flush()
    }
}

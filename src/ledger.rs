//! Transaction engine facade
//!
//! The engine is polymorphic over the capability set
//! `{post, balance, load_all_accounts}` with a closed set of variants:
//! [`MutexLedger`], the single-writer queue engine, and the external
//! relational ledger. Callers depend on [`Ledger`] only; the variant is
//! selected once at startup from configuration.
//!
//! [`LedgerCore`] holds the applier protocol both in-memory variants run
//! under their own serialization discipline:
//!
//! 1. structural validation (no WAL, no store effect on failure)
//! 2. idempotency probe (duplicates acknowledge as `Ok`)
//! 3. sequence assignment
//! 4. WAL append + durability barrier
//! 5. account-store mutation
//! 6. idempotency commit, on success only

use std::collections::HashMap;
use std::time::Instant;

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::accounts::{AccountStore, IdempotencyIndex};
use crate::actor::{spawn_single_writer, SingleWriterLedger};
use crate::config::{Config, LedgerVariant};
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::mutex::MutexLedger;
use crate::recovery::{self, RecoveryReport};
use crate::sql::{self, SqlLedger};
use crate::types::{AccountId, Transaction};
use crate::wal::WriteAheadLog;

/// Accounts, applied-id set, and the sequence counter: everything the
/// applier owns besides the WAL handle.
pub(crate) struct LedgerCore {
    pub(crate) accounts: AccountStore,
    pub(crate) seen: IdempotencyIndex,
    pub(crate) next_sequence: u64,
}

impl LedgerCore {
    /// Rebuild state from the WAL before accepting any traffic.
    pub(crate) fn recover(
        accounts: AccountStore,
        wal: &WriteAheadLog,
    ) -> Result<(Self, RecoveryReport)> {
        let mut accounts = accounts;
        let mut seen = IdempotencyIndex::default();
        let report = recovery::replay(wal, &mut accounts, &mut seen)?;
        let core = Self {
            accounts,
            seen,
            next_sequence: report.next_sequence,
        };
        Ok((core, report))
    }

    /// Run the applier protocol for one transaction.
    ///
    /// Returns [`Error::TransactionAlreadyProcessed`] for duplicates; the
    /// engine variants suppress that into an `Ok` acknowledgement. The WAL
    /// barrier completes before any state mutates, so recovery can rebuild
    /// every state a caller may have observed.
    pub(crate) fn post(&mut self, wal: &WriteAheadLog, mut tran: Transaction) -> Result<()> {
        tran.validate()?;

        if self.seen.contains(&tran.transaction_id) {
            return Err(Error::TransactionAlreadyProcessed);
        }

        tran.sequence = self.next_sequence;
        wal.append(&tran)
            .map_err(|e| Error::WalWrite(e.to_string()))?;
        // The record is durable; its sequence number is spent even if the
        // business step below fails.
        self.next_sequence = tran.sequence + 1;

        self.accounts.apply(&tran)?;
        self.seen.insert(tran.transaction_id);
        Ok(())
    }
}

/// The closed set of engine variants.
pub enum Engine {
    /// Exclusive-lock engine; many readers, one writer.
    Mutex(MutexLedger),
    /// Bounded-queue engine with a dedicated applier task.
    SingleWriter(SingleWriterLedger),
    /// Relational ledger; the database provides durability and locking.
    External(SqlLedger),
}

/// The engine facade handed to the transport adapter.
pub struct Ledger {
    engine: Engine,
    metrics: Metrics,
}

impl Ledger {
    /// Wrap an already-constructed engine (used by tests and by `open`).
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            metrics: Metrics::default(),
        }
    }

    /// Build the configured variant.
    ///
    /// In-memory variants seed their account population from the external
    /// store, then replay the WAL; the external variant posts straight to
    /// the database and needs neither.
    pub async fn open(config: &Config, pool: &MySqlPool) -> Result<Self> {
        let ledger = match config.variant {
            LedgerVariant::External => Self::new(Engine::External(SqlLedger::new(pool.clone()))),
            LedgerVariant::Mutex | LedgerVariant::SingleWriter => {
                let balances = sql::load_all_accounts(pool).await?;
                let accounts = AccountStore::new(balances);
                if accounts.is_empty() {
                    warn!("account seed is empty; every post will fail its account lookup");
                }
                info!(accounts = accounts.len(), "account seed loaded");
                let wal = WriteAheadLog::open(&config.wal_path)?;

                let (engine, report) = match config.variant {
                    LedgerVariant::Mutex => {
                        let (engine, report) =
                            MutexLedger::new(accounts, wal, config.shared_balance_reads)?;
                        (Engine::Mutex(engine), report)
                    }
                    _ => {
                        let (engine, report) =
                            spawn_single_writer(accounts, wal, config.queue_capacity)?;
                        (Engine::SingleWriter(engine), report)
                    }
                };

                let ledger = Self::new(engine);
                ledger.metrics.record_recovery(&report);
                ledger
            }
        };
        Ok(ledger)
    }

    /// Post one transaction. Duplicate submissions acknowledge `Ok`.
    pub async fn post(&self, tran: Transaction) -> Result<()> {
        let started = Instant::now();
        let result = match &self.engine {
            Engine::Mutex(engine) => engine.post(tran),
            Engine::SingleWriter(engine) => engine.post(tran).await,
            Engine::External(engine) => engine.post(&tran).await,
        };
        self.metrics
            .record_post(result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    /// Current balance of one account.
    pub async fn balance(&self, account: AccountId) -> Result<i64> {
        match &self.engine {
            Engine::Mutex(engine) => engine.balance(account),
            Engine::SingleWriter(engine) => engine.balance(account).await,
            Engine::External(engine) => engine.balance(account).await,
        }
    }

    /// Full `{id -> balance}` population.
    pub async fn load_all_accounts(&self) -> Result<HashMap<AccountId, i64>> {
        match &self.engine {
            Engine::Mutex(engine) => Ok(engine.snapshot()),
            Engine::SingleWriter(engine) => engine.snapshot().await,
            Engine::External(engine) => engine.load_all_accounts().await,
        }
    }

    /// Stop accepting work and make everything durable.
    ///
    /// The single-writer variant drains its queue before returning; the
    /// mutex variant flushes the WAL. Posts submitted afterwards fail.
    pub async fn shutdown(&self) -> Result<()> {
        match &self.engine {
            Engine::Mutex(engine) => engine.close(),
            Engine::SingleWriter(engine) => engine.shutdown().await,
            Engine::External(_) => Ok(()),
        }
    }

    /// Metrics collector for this engine.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

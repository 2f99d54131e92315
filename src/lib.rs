//! memledger
//!
//! High-throughput in-memory ledger posting monetary transactions
//! (deposit, withdraw, transfer) against a fixed account population, with
//! durability, idempotency, and crash recovery through a write-ahead log.
//!
//! # Architecture
//!
//! - **Write-before-apply**: every transaction is framed into the WAL and
//!   fsynced before any balance mutates, so recovery can rebuild every
//!   state a caller may have observed.
//! - **Idempotency**: each transaction carries a UUID; ids already applied
//!   acknowledge `Ok` without re-running.
//! - **Interchangeable engines**: an exclusive-lock applier, a
//!   single-writer bounded-queue applier, and a relational variant, behind
//!   one facade.
//! - **Recovery**: on construction the WAL is replayed start to finish;
//!   replay order equals append order equals original apply order.
//!
//! # Invariants
//!
//! - No balance is negative after any completed post.
//! - Transfers conserve the total system balance.
//! - A transaction id mutates the account map at most once, across
//!   retries and across restarts.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod accounts;
pub mod actor;
pub mod config;
pub mod error;
pub mod grpc;
pub mod ledger;
pub mod metrics;
pub mod mutex;
pub mod recovery;
pub mod sql;
pub mod types;
pub mod wal;

// Re-exports
pub use accounts::{AccountStore, IdempotencyIndex};
pub use actor::{spawn_single_writer, SingleWriterLedger};
pub use config::{Config, LedgerVariant};
pub use error::{Error, Result};
pub use ledger::{Engine, Ledger};
pub use metrics::Metrics;
pub use mutex::MutexLedger;
pub use recovery::RecoveryReport;
pub use sql::SqlLedger;
pub use types::{Account, AccountId, Transaction, TransactionType, AMOUNT_SCALE};
pub use wal::WriteAheadLog;

//! Crash recovery
//!
//! Rebuilds the account map and the idempotency index by replaying the WAL
//! once, synchronously, during engine construction. Replay never emits new
//! log records and runs single-threaded, so no concurrency control applies.

use tracing::{info, warn};

use crate::accounts::{AccountStore, IdempotencyIndex};
use crate::error::Result;
use crate::types::Transaction;
use crate::wal::WriteAheadLog;

/// Outcome of one WAL replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records decoded from the log.
    pub replayed: u64,
    /// Records applied to the account store.
    pub applied: u64,
    /// Records skipped because their id was already applied earlier in
    /// the log (a retry of a previously failed post).
    pub skipped_duplicates: u64,
    /// Records whose replay failed business validation. The record was
    /// durable, so a differing outcome is a data anomaly worth surfacing,
    /// not a fatal condition.
    pub anomalies: u64,
    /// Next sequence number the applier should assign.
    pub next_sequence: u64,
}

/// Replay the WAL into `accounts` and `index`.
///
/// Business failures are recorded and replay continues; a structural
/// failure (undecodable record, corrupt frame) aborts, and the engine
/// refuses to start.
pub fn replay(
    wal: &WriteAheadLog,
    accounts: &mut AccountStore,
    index: &mut IdempotencyIndex,
) -> Result<RecoveryReport> {
    let mut report = RecoveryReport {
        next_sequence: 1,
        ..RecoveryReport::default()
    };

    wal.read_all(|payload| {
        let tran: Transaction = bincode::deserialize(payload)?;
        report.replayed += 1;
        if tran.sequence >= report.next_sequence {
            report.next_sequence = tran.sequence + 1;
        }

        if index.contains(&tran.transaction_id) {
            report.skipped_duplicates += 1;
            return Ok(());
        }

        match accounts.apply(&tran) {
            Ok(()) => {
                index.insert(tran.transaction_id);
                report.applied += 1;
                Ok(())
            }
            Err(e) if e.is_business() => {
                warn!(
                    transaction_id = %tran.transaction_id,
                    sequence = tran.sequence,
                    error = %e,
                    "replayed record failed business validation"
                );
                report.anomalies += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    })?;

    info!(
        replayed = report.replayed,
        applied = report.applied,
        skipped_duplicates = report.skipped_duplicates,
        anomalies = report.anomalies,
        next_sequence = report.next_sequence,
        "wal replay complete"
    );
    Ok(report)
}

//! Single-writer queue engine variant
//!
//! Producers submit requests onto a bounded mpsc queue; one dedicated
//! applier task consumes it in FIFO order and, being the only mutator of
//! the account store and idempotency index, needs no lock on them.
//! Backpressure is the bounded queue itself: producers wait when it is
//! full. Balance reads and snapshots are marshalled through the same
//! queue, so they observe a consistent point in the apply order.
//!
//! Each request carries a oneshot reply slot; `post` resolves when the
//! applier has logged and applied (or rejected) the transaction. A caller
//! that gives up waiting must assume the transaction may still commit and
//! retry with the same id.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::accounts::AccountStore;
use crate::error::{Error, Result};
use crate::ledger::LedgerCore;
use crate::recovery::RecoveryReport;
use crate::types::{AccountId, Transaction};
use crate::wal::WriteAheadLog;

/// Message sent to the applier task.
pub enum LedgerMessage {
    /// Post a transaction.
    Post {
        /// The transaction to apply.
        tran: Transaction,
        /// Resolves once the transaction is durable and applied.
        reply: oneshot::Sender<Result<()>>,
    },
    /// Read one balance.
    Balance {
        /// Account to read.
        account: AccountId,
        /// Resolves with the balance at this point in the apply order.
        reply: oneshot::Sender<Result<i64>>,
    },
    /// Copy the full account population.
    Snapshot {
        /// Resolves with the `{id -> balance}` map.
        reply: oneshot::Sender<HashMap<AccountId, i64>>,
    },
    /// Drain the queue, flush the WAL, and exit.
    Shutdown {
        /// Resolves once the drain is complete.
        reply: oneshot::Sender<()>,
    },
}

/// The applier: sole owner of ledger state and the WAL.
pub struct LedgerActor {
    core: LedgerCore,
    wal: WriteAheadLog,
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Consume the mailbox until shutdown or until every producer is gone.
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown { reply } => {
                    self.drain();
                    self.flush();
                    let _ = reply.send(());
                    debug!("single-writer applier exited");
                    return;
                }
                other => self.handle(other),
            }
        }
        // All senders dropped without an explicit shutdown.
        self.flush();
        debug!("single-writer mailbox closed");
    }

    /// Process everything already enqueued, without waiting for more.
    fn drain(&mut self) {
        while let Ok(msg) = self.mailbox.try_recv() {
            match msg {
                LedgerMessage::Shutdown { reply } => {
                    let _ = reply.send(());
                }
                other => self.handle(other),
            }
        }
    }

    fn flush(&self) {
        if let Err(e) = self.wal.flush() {
            error!(error = %e, "wal flush on shutdown failed");
        }
    }

    fn handle(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Post { tran, reply } => {
                let result = match self.core.post(&self.wal, tran) {
                    Err(Error::TransactionAlreadyProcessed) => Ok(()),
                    other => other,
                };
                // A send error means the caller stopped waiting; the
                // transaction stays applied and durable regardless.
                let _ = reply.send(result);
            }
            LedgerMessage::Balance { account, reply } => {
                let _ = reply.send(self.core.accounts.balance(account));
            }
            LedgerMessage::Snapshot { reply } => {
                let _ = reply.send(self.core.accounts.snapshot());
            }
            LedgerMessage::Shutdown { .. } => unreachable!("shutdown handled by run"),
        }
    }
}

/// Producer-side handle; cheap to clone.
#[derive(Clone)]
pub struct SingleWriterLedger {
    sender: mpsc::Sender<LedgerMessage>,
}

impl SingleWriterLedger {
    /// Post one transaction and wait for the applier's acknowledgement.
    pub async fn post(&self, tran: Transaction) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Post { tran, reply })
            .await
            .map_err(|_| Error::Concurrency("ledger mailbox closed".into()))?;
        response
            .await
            .map_err(|_| Error::Concurrency("ledger reply dropped".into()))?
    }

    /// Read one balance through the queue.
    pub async fn balance(&self, account: AccountId) -> Result<i64> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Balance { account, reply })
            .await
            .map_err(|_| Error::Concurrency("ledger mailbox closed".into()))?;
        response
            .await
            .map_err(|_| Error::Concurrency("ledger reply dropped".into()))?
    }

    /// Copy of the full account population.
    pub async fn snapshot(&self) -> Result<HashMap<AccountId, i64>> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(LedgerMessage::Snapshot { reply })
            .await
            .map_err(|_| Error::Concurrency("ledger mailbox closed".into()))?;
        response
            .await
            .map_err(|_| Error::Concurrency("ledger reply dropped".into()))
    }

    /// Ask the applier to drain its queue and exit.
    ///
    /// Submissions after this resolve with a closed-queue error.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(LedgerMessage::Shutdown { reply })
            .await
            .is_err()
        {
            // Applier already gone.
            return Ok(());
        }
        let _ = response.await;
        Ok(())
    }
}

/// Replay the WAL, then start the applier on the current runtime.
///
/// `capacity` bounds the queue; it is the backpressure mechanism and is
/// never unbounded.
pub fn spawn_single_writer(
    accounts: AccountStore,
    wal: WriteAheadLog,
    capacity: usize,
) -> Result<(SingleWriterLedger, RecoveryReport)> {
    let (core, report) = LedgerCore::recover(accounts, &wal)?;
    let (sender, mailbox) = mpsc::channel(capacity.max(1));
    let actor = LedgerActor { core, wal, mailbox };
    tokio::spawn(actor.run());
    Ok((SingleWriterLedger { sender }, report))
}

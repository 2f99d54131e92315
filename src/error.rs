//! Error types for the ledger

use thiserror::Error;

use crate::types::AccountId;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Transaction amount was zero or negative
    #[error("amount must be positive")]
    AmountMustBePositive,

    /// Transfer names the same account on both sides
    #[error("transfer endpoints must differ")]
    SelfTransfer,

    /// Referenced account does not exist
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Debited account holds less than the transaction amount
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Crediting the account would overflow its balance
    #[error("balance overflow for account {0}")]
    BalanceOverflow(AccountId),

    /// Transaction id already applied; engines suppress this into an
    /// `Ok` acknowledgement (idempotent retry)
    #[error("transaction already processed")]
    TransactionAlreadyProcessed,

    /// WAL append or durability barrier failed; no state was changed
    #[error("wal write failed: {0}")]
    WalWrite(String),

    /// Malformed WAL record encountered during replay
    #[error("wal record corrupt at offset {offset}: {reason}")]
    WalCorrupt {
        /// Byte offset of the bad frame.
        offset: u64,
        /// What failed the frame check.
        reason: String,
    },

    /// External-store dedupe probe failed (external variant only)
    #[error("select transaction failed: {0}")]
    SelectTransactionFailed(String),

    /// Other external-store failure
    #[error("database error: {0}")]
    Database(String),

    /// Mailbox or reply channel closed (single-writer variant)
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for deterministic business-rule failures.
    ///
    /// Recovery replays WAL records whose apply fails with a business
    /// error by recording the anomaly and continuing; any other failure
    /// aborts recovery.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Error::AmountMustBePositive
                | Error::SelfTransfer
                | Error::AccountNotFound(_)
                | Error::InsufficientBalance
                | Error::BalanceOverflow(_)
        )
    }
}

use std::time::Duration;

use common::InvalidOrderNumber;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur when interacting with the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The order number is empty, non-numeric or fails the checksum.
    #[error(transparent)]
    InvalidOrderNumber(#[from] InvalidOrderNumber),

    /// A withdrawal sum must be strictly positive.
    #[error("invalid withdrawal sum: {0}")]
    InvalidSum(Decimal),

    /// The account balance does not cover the withdrawal.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    /// The accrual service reported a negative reward.
    #[error("negative accrual {0} rejected")]
    NegativeAccrual(Decimal),

    /// The operation did not finish within its deadline and was rolled back.
    #[error("ledger operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored row could not be mapped back into the domain.
    #[error("corrupt ledger row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// True for failures worth retrying later (storage trouble, timeouts);
    /// false for validation errors and business conflicts.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Timeout(_) | LedgerError::Database(_))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

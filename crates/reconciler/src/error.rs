use ledger::LedgerError;
use thiserror::Error;

/// Errors that abort a reconciliation cycle.
///
/// Per-order failures never surface here; they are counted in the cycle
/// report and retried on the next poll.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Pending orders could not be listed.
    #[error("failed to list pending orders: {0}")]
    ListPending(#[source] LedgerError),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

//! Startup and shutdown errors.

use accrual::AccrualError;
use ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// A required environment variable is absent or empty.
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("accrual client error: {0}")]
    Accrual(#[from] AccrualError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

//! Deadlines for ledger operations.

use std::future::Future;
use std::time::Duration;

use crate::error::{LedgerError, Result};

/// Runs a ledger operation with a deadline.
///
/// Dropping an unfinished operation drops its transaction, which rolls it
/// back, so a timed-out operation never leaves partial state behind.
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit)),
    }
}

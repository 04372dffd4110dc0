//! Reconciliation worker.
//!
//! Periodically lists orders that are not yet final, asks the accrual
//! service about each of them through a bounded pool of handlers, and
//! writes the answers back into the ledger. Listing is snapshot based, so
//! the same order may be handled in consecutive cycles; the ledger's
//! idempotent apply step is what keeps balances correct.

pub mod config;
pub mod error;
pub mod pause;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{ReconcileError, Result};
pub use pause::SharedPause;
pub use worker::{CycleReport, ReconciliationWorker};

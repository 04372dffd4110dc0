//! Order and point-account ledger.
//!
//! The ledger is the single source of truth for order state and account
//! balances. Every mutating operation is one atomic step: the in-memory
//! backend holds a write lock for its duration, the PostgreSQL backend runs
//! it in one transaction with row locks. Retrying any operation is safe.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod service;
pub mod store;
pub mod timeout;

pub use common::{OrderNumber, OrderStatus, UserId};
pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use model::{ApplyOutcome, Balance, CreateOutcome, Order, WithdrawOutcome, Withdrawal};
pub use postgres::{PoolSettings, PostgresLedger};
pub use service::LoyaltyService;
pub use store::{AccountLedgerStore, OrderLedgerStore};
pub use timeout::with_timeout;

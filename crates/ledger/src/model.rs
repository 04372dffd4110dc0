//! Ledger records and operation outcomes.

use chrono::{DateTime, Utc};
use common::{OrderNumber, OrderStatus, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An uploaded order as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Reward reported by the accrual service; never cleared once set.
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
    /// Set once the reward has been credited to the owner's account.
    pub accrual_applied: bool,
}

/// Point account state of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

/// A completed point withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub user_id: UserId,
    pub order_number: OrderNumber,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Result of uploading an order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new order was recorded in state `NEW`.
    Created,
    /// The same user already uploaded this number.
    DuplicateOwnedBySelf,
    /// Another user owns this number; first writer wins.
    DuplicateOwnedByOther,
}

/// Result of applying an accrual lookup to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The order was updated. `credited` holds the amount added to the
    /// owner's balance by this call, if any.
    Applied { credited: Option<Decimal> },
    /// No such order; nothing was changed.
    NotFound,
}

/// Result of a successful withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawOutcome {
    /// The account was debited and the withdrawal recorded.
    Withdrawn,
    /// A withdrawal for this order number already exists; nothing was debited.
    AlreadyProcessed,
}

//! Internal order status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of an uploaded order in the loyalty system.
///
/// State transitions:
/// ```text
/// New ──► Processing ──┬──► Processed
///   │                  └──► Invalid
///   └──────────────────────► Processed / Invalid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Uploaded, not yet seen by the accrual service.
    #[default]
    New,

    /// The accrual service is computing the reward.
    Processing,

    /// The accrual service refused the order (terminal state).
    Invalid,

    /// The reward has been computed (terminal state).
    Processed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state (no further reconciliation).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Returns true if the reconciliation worker still has to poll this order.
    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the status name as stored and reported.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownOrderStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(UnknownOrderStatus(other.to_string())),
        }
    }
}

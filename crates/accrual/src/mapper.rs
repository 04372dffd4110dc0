//! External accrual status → internal order status.

use common::OrderStatus;

use crate::model::AccrualStatus;

/// Maps an accrual service status onto the order lifecycle.
///
/// Unrecognized statuses map to `Processing` so the order keeps being
/// polled instead of being dropped.
pub fn map_status(status: AccrualStatus) -> OrderStatus {
    match status {
        AccrualStatus::Registered | AccrualStatus::Processing => OrderStatus::Processing,
        AccrualStatus::Invalid => OrderStatus::Invalid,
        AccrualStatus::Processed => OrderStatus::Processed,
        AccrualStatus::Unknown => OrderStatus::Processing,
    }
}

impl From<AccrualStatus> for OrderStatus {
    fn from(status: AccrualStatus) -> Self {
        map_status(status)
    }
}

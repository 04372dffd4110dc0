//! Shared types for the loyalty ledger.
//!
//! Holds the identifiers every other crate agrees on, the order number
//! checksum validator, and the internal order status.

pub mod status;
pub mod types;
pub mod validator;

pub use status::{OrderStatus, UnknownOrderStatus};
pub use types::{OrderNumber, UserId};
pub use validator::{InvalidOrderNumber, validate_order_number};

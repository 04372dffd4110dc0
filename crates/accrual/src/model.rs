//! Accrual service payloads and gateway outcomes.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reward computation status reported by the accrual service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    /// Registered, reward not computed yet.
    Registered,
    /// Reward computation in progress.
    Processing,
    /// The order will not be rewarded.
    Invalid,
    /// Reward computed.
    Processed,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl AccrualStatus {
    /// Returns the status name as sent by the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccrualStatus::Registered => "REGISTERED",
            AccrualStatus::Processing => "PROCESSING",
            AccrualStatus::Invalid => "INVALID",
            AccrualStatus::Processed => "PROCESSED",
            AccrualStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AccrualStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success payload of `GET /api/orders/{number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
}

/// A non-error reply from the accrual service.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualReply {
    /// 200 with a payload.
    Found(AccrualResponse),
    /// 204: the service has not seen this order yet.
    NotRegistered,
    /// 429: the client must back off, optionally for a hinted duration.
    RateLimited { retry_after: Option<Duration> },
}

/// What the gateway reports for a single order lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The service knows the order.
    Found {
        status: AccrualStatus,
        accrual: Option<Decimal>,
    },
    /// The service has not registered the order yet.
    NotRegistered,
    /// The service asked us to slow down.
    RateLimited { retry_after: Option<Duration> },
    /// The circuit breaker is open; the service was not contacted.
    Unavailable,
    /// Any other failure, with its description.
    OtherError(String),
}

impl FetchOutcome {
    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Found { .. } => "found",
            FetchOutcome::NotRegistered => "not_registered",
            FetchOutcome::RateLimited { .. } => "rate_limited",
            FetchOutcome::Unavailable => "unavailable",
            FetchOutcome::OtherError(_) => "error",
        }
    }
}

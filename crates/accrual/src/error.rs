//! Accrual transport errors.

use thiserror::Error;

/// Errors raised while talking to the accrual service.
///
/// Rate limiting and "not registered" are not errors; they are regular
/// replies (see [`crate::AccrualReply`]).
#[derive(Debug, Error)]
pub enum AccrualError {
    /// The request could not be sent or the connection failed.
    #[error("accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a status code we do not handle.
    #[error("unexpected accrual status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The success payload could not be decoded.
    #[error("failed to decode accrual response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Convenience type alias for accrual client results.
pub type Result<T> = std::result::Result<T, AccrualError>;

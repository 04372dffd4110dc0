//! Gateway to the external accrual service.
//!
//! One request per order number, translated into a small typed outcome.
//! Calls go through a circuit breaker so a degraded accrual service is not
//! hammered by every reconciliation handler at once.

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod gateway;
pub mod http;
pub mod mapper;
pub mod memory;
pub mod model;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use client::AccrualClient;
pub use error::AccrualError;
pub use gateway::AccrualGateway;
pub use http::{HttpAccrualClient, HttpClientConfig};
pub use mapper::map_status;
pub use memory::{ScriptedAccrualClient, ScriptedReply};
pub use model::{AccrualReply, AccrualResponse, AccrualStatus, FetchOutcome};

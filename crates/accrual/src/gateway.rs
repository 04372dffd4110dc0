//! Circuit-breaker protected accrual gateway.

use common::OrderNumber;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::client::AccrualClient;
use crate::model::{AccrualReply, FetchOutcome};

/// Fetches accrual state for orders through a circuit breaker.
///
/// One gateway instance is shared by every reconciliation handler, so the
/// breaker sees the combined failure stream. Rate-limit replies count as
/// successful calls: they are expected backpressure, not degradation.
pub struct AccrualGateway<C: AccrualClient> {
    client: C,
    breaker: CircuitBreaker,
}

impl<C: AccrualClient> AccrualGateway<C> {
    /// Creates a gateway around `client` with the given breaker settings.
    pub fn new(client: C, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            client,
            breaker: CircuitBreaker::new(breaker_config),
        }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the breaker guarding the client.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Issues one lookup for `number` and classifies the result.
    #[tracing::instrument(skip(self), fields(order = %number))]
    pub async fn fetch(&self, number: &OrderNumber) -> FetchOutcome {
        let outcome = match self
            .breaker
            .call(|| self.client.get_order_accrual(number))
            .await
        {
            Ok(AccrualReply::Found(resp)) => FetchOutcome::Found {
                status: resp.status,
                accrual: resp.accrual,
            },
            Ok(AccrualReply::NotRegistered) => FetchOutcome::NotRegistered,
            Ok(AccrualReply::RateLimited { retry_after }) => FetchOutcome::RateLimited { retry_after },
            Err(CircuitBreakerError::Open { .. }) => FetchOutcome::Unavailable,
            Err(CircuitBreakerError::Inner(e)) => FetchOutcome::OtherError(e.to_string()),
        };

        metrics::counter!("accrual_requests_total", "outcome" => outcome.label()).increment(1);
        tracing::debug!(outcome = outcome.label(), "accrual lookup finished");

        outcome
    }
}

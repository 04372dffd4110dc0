//! Accrual client trait.

use async_trait::async_trait;
use common::OrderNumber;

use crate::error::Result;
use crate::model::AccrualReply;

/// Raw transport to the accrual service: one request per call.
///
/// Implementations report rate limiting and unknown orders as regular
/// replies; only genuine failures are errors.
#[async_trait]
pub trait AccrualClient: Send + Sync {
    /// Looks up the accrual state of one order.
    async fn get_order_accrual(&self, number: &OrderNumber) -> Result<AccrualReply>;
}

#[async_trait]
impl<T: AccrualClient + ?Sized> AccrualClient for std::sync::Arc<T> {
    async fn get_order_accrual(&self, number: &OrderNumber) -> Result<AccrualReply> {
        (**self).get_order_accrual(number).await
    }
}

//! Loyalty service providing a simplified API for user-facing operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderNumber, UserId};
use rust_decimal::Decimal;

use crate::store::{AccountLedgerStore, OrderLedgerStore};
use crate::{Balance, CreateOutcome, LedgerError, Order, Result, WithdrawOutcome, Withdrawal};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Service for uploading orders and managing point accounts.
///
/// Validates raw order numbers before they reach the store and stamps
/// withdrawals with its clock.
#[derive(Clone)]
pub struct LoyaltyService<S> {
    store: S,
    clock: Clock,
}

impl<S> LoyaltyService<S>
where
    S: OrderLedgerStore + AccountLedgerStore,
{
    /// Creates a new loyalty service using the system clock.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the clock used to stamp withdrawals.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Uploads an order number for accrual tracking.
    #[tracing::instrument(skip(self))]
    pub async fn upload_order(&self, user_id: UserId, raw_number: &str) -> Result<CreateOutcome> {
        let number = OrderNumber::parse(raw_number)?;
        let outcome = self.store.create_order(user_id, &number).await?;
        tracing::debug!(order = %number, ?outcome, "order uploaded");
        Ok(outcome)
    }

    /// Lists the user's orders, newest first.
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        self.store.list_orders_by_user(user_id).await
    }

    /// Returns the user's balance, opening an empty account if needed.
    pub async fn balance(&self, user_id: UserId) -> Result<Balance> {
        self.store.get_or_init_balance(user_id).await
    }

    /// Spends points against an order number.
    #[tracing::instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        raw_number: &str,
        sum: Decimal,
    ) -> Result<WithdrawOutcome> {
        let number = OrderNumber::parse(raw_number)?;
        let now = (self.clock)();

        let result = self.store.withdraw(user_id, &number, sum, now).await;
        let outcome = match &result {
            Ok(WithdrawOutcome::Withdrawn) => "withdrawn",
            Ok(WithdrawOutcome::AlreadyProcessed) => "already_processed",
            Err(LedgerError::InsufficientFunds { .. }) => "insufficient_funds",
            Err(LedgerError::InvalidSum(_)) => "invalid_sum",
            Err(_) => "error",
        };
        metrics::counter!("ledger_withdrawals_total", "outcome" => outcome).increment(1);

        result
    }

    /// Lists the user's withdrawals, newest first.
    pub async fn list_withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        self.store.list_withdrawals_by_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use common::OrderStatus;

    use super::*;
    use crate::InMemoryLedger;

    fn service() -> LoyaltyService<InMemoryLedger> {
        LoyaltyService::new(InMemoryLedger::new())
    }

    #[tokio::test]
    async fn test_upload_validates_number() {
        let service = service();

        let err = service
            .upload_order(UserId::new(1), "79927398710")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrderNumber(_)));

        let err = service.upload_order(UserId::new(1), "").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrderNumber(_)));

        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_upload_and_list() {
        let service = service();
        let outcome = service
            .upload_order(UserId::new(1), " 79927398713 ")
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::Created);

        let orders = service.list_orders(UserId::new(1)).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].number.as_str(), "79927398713");
        assert_eq!(orders[0].status, OrderStatus::New);

        let outcome = service
            .upload_order(UserId::new(2), "79927398713")
            .await
            .unwrap();
        assert_eq!(outcome, CreateOutcome::DuplicateOwnedByOther);
    }

    #[tokio::test]
    async fn test_withdraw_uses_clock_and_validates() {
        let fixed = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let service = service().with_clock(move || fixed);
        let user = UserId::new(1);

        service.upload_order(user, "79927398713").await.unwrap();
        service
            .store()
            .apply_accrual_result(
                &OrderNumber::parse("79927398713").unwrap(),
                OrderStatus::Processed,
                Some(Decimal::from(500)),
            )
            .await
            .unwrap();

        let err = service
            .withdraw(user, "1234", Decimal::from(10))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrderNumber(_)));

        let outcome = service
            .withdraw(user, "2377225624", Decimal::new(7525, 2))
            .await
            .unwrap();
        assert_eq!(outcome, WithdrawOutcome::Withdrawn);

        let history = service.list_withdrawals(user).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].processed_at, fixed);

        let balance = service.balance(user).await.unwrap();
        assert_eq!(balance.current, Decimal::new(42475, 2));
        assert_eq!(balance.withdrawn, Decimal::new(7525, 2));
    }

    #[tokio::test]
    async fn test_balance_opens_empty_account() {
        let service = service();
        let balance = service.balance(UserId::new(42)).await.unwrap();
        assert_eq!(balance, Balance::default());
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderNumber, OrderStatus, UserId};
use rust_decimal::Decimal;

use crate::{ApplyOutcome, Balance, CreateOutcome, Order, Result, WithdrawOutcome, Withdrawal};

/// Persistence port for uploaded orders.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderLedgerStore: Send + Sync {
    /// Records a new order in state `NEW`, owned by `user_id`.
    ///
    /// Order numbers are globally unique; a second upload reports who owns
    /// the existing order instead of failing.
    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<CreateOutcome>;

    /// Retrieves one order by number.
    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Lists orders still in `NEW` or `PROCESSING`, oldest first.
    async fn list_pending_orders(&self) -> Result<Vec<Order>>;

    /// Applies an accrual lookup to an order in one atomic step.
    ///
    /// The status is written unconditionally; the accrual value is written
    /// when present and kept otherwise. If `status` is `PROCESSED` and the
    /// order has not been credited yet, the order is marked applied and a
    /// positive `accrual` is added to the owner's balance in the same step.
    /// Repeating the call never credits twice.
    async fn apply_accrual_result(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<ApplyOutcome>;
}

/// Persistence port for point accounts and withdrawals.
#[async_trait]
pub trait AccountLedgerStore: Send + Sync {
    /// Returns the user's balance, creating a zero account on first access.
    async fn get_or_init_balance(&self, user_id: UserId) -> Result<Balance>;

    /// Debits `sum` and records the withdrawal in one atomic step.
    ///
    /// Fails with `InvalidSum` unless `sum > 0` and with `InsufficientFunds`
    /// if the balance does not cover it (nothing changes in either case).
    /// A repeated request for the same order number is a no-op that reports
    /// `AlreadyProcessed`.
    async fn withdraw(
        &self,
        user_id: UserId,
        order_number: &OrderNumber,
        sum: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawOutcome>;

    /// Lists a user's withdrawals, newest first.
    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>>;
}

#[async_trait]
impl<T: OrderLedgerStore + ?Sized> OrderLedgerStore for Arc<T> {
    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<CreateOutcome> {
        (**self).create_order(user_id, number).await
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        (**self).get_order(number).await
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        (**self).list_orders_by_user(user_id).await
    }

    async fn list_pending_orders(&self) -> Result<Vec<Order>> {
        (**self).list_pending_orders().await
    }

    async fn apply_accrual_result(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<ApplyOutcome> {
        (**self).apply_accrual_result(number, status, accrual).await
    }
}

#[async_trait]
impl<T: AccountLedgerStore + ?Sized> AccountLedgerStore for Arc<T> {
    async fn get_or_init_balance(&self, user_id: UserId) -> Result<Balance> {
        (**self).get_or_init_balance(user_id).await
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        order_number: &OrderNumber,
        sum: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawOutcome> {
        (**self).withdraw(user_id, order_number, sum, now).await
    }

    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        (**self).list_withdrawals_by_user(user_id).await
    }
}

/// Rejects non-positive withdrawal sums.
pub(crate) fn check_withdrawal_sum(sum: Decimal) -> Result<()> {
    if sum <= Decimal::ZERO {
        return Err(crate::LedgerError::InvalidSum(sum));
    }
    Ok(())
}

/// Rejects negative accrual values reported by the accrual service.
pub(crate) fn check_accrual(accrual: Option<Decimal>) -> Result<()> {
    match accrual {
        Some(amount) if amount.is_sign_negative() && !amount.is_zero() => {
            Err(crate::LedgerError::NegativeAccrual(amount))
        }
        _ => Ok(()),
    }
}

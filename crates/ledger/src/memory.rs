use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderNumber, OrderStatus, UserId};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::{
    ApplyOutcome, Balance, CreateOutcome, LedgerError, Order, Result, WithdrawOutcome, Withdrawal,
    store::{AccountLedgerStore, OrderLedgerStore, check_accrual, check_withdrawal_sum},
};

#[derive(Debug, Default)]
struct LedgerState {
    orders: Vec<Order>,
    accounts: HashMap<UserId, Balance>,
    withdrawals: Vec<Withdrawal>,
}

/// In-memory ledger implementation for testing.
///
/// Every operation runs under a single write lock, which gives the same
/// all-or-nothing behavior as the PostgreSQL transactions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Inserts an order as-is, bypassing upload rules.
    pub async fn insert_order(&self, order: Order) {
        self.state.write().await.orders.push(order);
    }

    /// Clears all orders, accounts and withdrawals.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.accounts.clear();
        state.withdrawals.clear();
    }
}

#[async_trait]
impl OrderLedgerStore for InMemoryLedger {
    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<CreateOutcome> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.orders.iter().find(|o| &o.number == number) {
            return Ok(if existing.user_id == user_id {
                CreateOutcome::DuplicateOwnedBySelf
            } else {
                CreateOutcome::DuplicateOwnedByOther
            });
        }

        state.orders.push(Order {
            number: number.clone(),
            user_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
            accrual_applied: false,
        });
        Ok(CreateOutcome::Created)
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| &o.number == number).cloned())
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        // Later inserts first so equal timestamps still come out newest first.
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn list_pending_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.status.is_pending())
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(orders)
    }

    async fn apply_accrual_result(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<ApplyOutcome> {
        check_accrual(accrual)?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(order) = state.orders.iter_mut().find(|o| &o.number == number) else {
            return Ok(ApplyOutcome::NotFound);
        };

        let should_credit = status == OrderStatus::Processed && !order.accrual_applied;

        order.status = status;
        if accrual.is_some() {
            order.accrual = accrual;
        }

        let mut credited = None;
        if should_credit {
            order.accrual_applied = true;
            if let Some(amount) = accrual.filter(|a| *a > Decimal::ZERO) {
                state.accounts.entry(order.user_id).or_default().current += amount;
                credited = Some(amount);
                metrics::counter!("ledger_accruals_credited_total").increment(1);
            }
        }

        Ok(ApplyOutcome::Applied { credited })
    }
}

#[async_trait]
impl AccountLedgerStore for InMemoryLedger {
    async fn get_or_init_balance(&self, user_id: UserId) -> Result<Balance> {
        let mut state = self.state.write().await;
        Ok(*state.accounts.entry(user_id).or_default())
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        order_number: &OrderNumber,
        sum: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawOutcome> {
        check_withdrawal_sum(sum)?;

        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if state
            .withdrawals
            .iter()
            .any(|w| &w.order_number == order_number)
        {
            return Ok(WithdrawOutcome::AlreadyProcessed);
        }

        let available = state
            .accounts
            .get(&user_id)
            .map(|b| b.current)
            .unwrap_or_default();
        if available < sum {
            return Err(LedgerError::InsufficientFunds {
                requested: sum,
                available,
            });
        }

        let account = state.accounts.entry(user_id).or_default();
        account.current -= sum;
        account.withdrawn += sum;

        state.withdrawals.push(Withdrawal {
            user_id,
            order_number: order_number.clone(),
            sum,
            processed_at: now,
        });
        Ok(WithdrawOutcome::Withdrawn)
    }

    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        let mut withdrawals: Vec<Withdrawal> = state
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderNumber, OrderStatus, UserId};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};

use crate::{
    ApplyOutcome, Balance, CreateOutcome, LedgerError, Order, Result, WithdrawOutcome, Withdrawal,
    store::{AccountLedgerStore, OrderLedgerStore, check_accrual, check_withdrawal_sum},
};

/// Connection pool limits.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 100,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(300),
        }
    }
}

/// PostgreSQL-backed ledger implementation.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .max_lifetime(settings.max_lifetime)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| LedgerError::CorruptRow(e.to_string()))?;
        let number: String = row.try_get("number")?;

        Ok(Order {
            number: OrderNumber::from_trusted(number),
            user_id: UserId::new(row.try_get("user_id")?),
            status,
            accrual: row.try_get("accrual")?,
            uploaded_at: row.try_get("uploaded_at")?,
            accrual_applied: row.try_get("accrual_applied")?,
        })
    }

    fn row_to_withdrawal(row: PgRow) -> Result<Withdrawal> {
        let order_number: String = row.try_get("order_number")?;
        Ok(Withdrawal {
            user_id: UserId::new(row.try_get("user_id")?),
            order_number: OrderNumber::from_trusted(order_number),
            sum: row.try_get("sum")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

#[async_trait]
impl OrderLedgerStore for PostgresLedger {
    #[tracing::instrument(skip(self), fields(order = %number))]
    async fn create_order(&self, user_id: UserId, number: &OrderNumber) -> Result<CreateOutcome> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO orders (number, user_id, status)
            VALUES ($1, $2, 'NEW')
            ON CONFLICT (number) DO NOTHING
            RETURNING user_id
            "#,
        )
        .bind(number.as_str())
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            return Ok(CreateOutcome::Created);
        }

        let owner: i64 = sqlx::query_scalar("SELECT user_id FROM orders WHERE number = $1")
            .bind(number.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(if owner == user_id.as_i64() {
            CreateOutcome::DuplicateOwnedBySelf
        } else {
            CreateOutcome::DuplicateOwnedByOther
        })
    }

    async fn get_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at, accrual_applied
            FROM orders
            WHERE number = $1
            "#,
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at, accrual_applied
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn list_pending_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT number, user_id, status, accrual, uploaded_at, accrual_applied
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY uploaded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self), fields(order = %number))]
    async fn apply_accrual_result(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<ApplyOutcome> {
        check_accrual(accrual)?;

        // Dropping the transaction without commit rolls it back.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT user_id, accrual_applied
            FROM orders
            WHERE number = $1
            FOR UPDATE
            "#,
        )
        .bind(number.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(ApplyOutcome::NotFound);
        };
        let user_id: i64 = row.try_get("user_id")?;
        let already_applied: bool = row.try_get("accrual_applied")?;

        let should_credit = status == OrderStatus::Processed && !already_applied;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2,
                accrual = COALESCE($3, accrual),
                accrual_applied = accrual_applied OR $4
            WHERE number = $1
            "#,
        )
        .bind(number.as_str())
        .bind(status.as_str())
        .bind(accrual)
        .bind(should_credit)
        .execute(&mut *tx)
        .await?;

        let mut credited = None;
        if should_credit && let Some(amount) = accrual.filter(|a| *a > Decimal::ZERO) {
            sqlx::query(
                r#"
                INSERT INTO accounts (user_id, current, withdrawn)
                VALUES ($1, $2, 0)
                ON CONFLICT (user_id)
                DO UPDATE SET current = accounts.current + EXCLUDED.current
                "#,
            )
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;
            credited = Some(amount);
        }

        tx.commit().await?;

        if let Some(amount) = credited {
            metrics::counter!("ledger_accruals_credited_total").increment(1);
            tracing::info!(user_id, %amount, "accrual credited");
        }

        Ok(ApplyOutcome::Applied { credited })
    }
}

#[async_trait]
impl AccountLedgerStore for PostgresLedger {
    async fn get_or_init_balance(&self, user_id: UserId) -> Result<Balance> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING current, withdrawn
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(Balance {
            current: row.try_get("current")?,
            withdrawn: row.try_get("withdrawn")?,
        })
    }

    #[tracing::instrument(skip(self), fields(order = %order_number))]
    async fn withdraw(
        &self,
        user_id: UserId,
        order_number: &OrderNumber,
        sum: Decimal,
        now: DateTime<Utc>,
    ) -> Result<WithdrawOutcome> {
        check_withdrawal_sum(sum)?;

        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM withdrawals WHERE order_number = $1")
                .bind(order_number.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Ok(WithdrawOutcome::AlreadyProcessed);
        }

        // The upsert locks the account row until commit.
        let available: Decimal = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING current
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_one(&mut *tx)
        .await?;

        if available < sum {
            return Err(LedgerError::InsufficientFunds {
                requested: sum,
                available,
            });
        }

        sqlx::query(
            r#"
            UPDATE accounts
            SET current = current - $2,
                withdrawn = withdrawn + $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_i64())
        .bind(sum)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO withdrawals (user_id, order_number, sum, processed_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id.as_i64())
        .bind(order_number.as_str())
        .bind(sum)
        .bind(now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // A concurrent request for the same order number committed first.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_withdrawal_order_number")
            {
                return Ok(WithdrawOutcome::AlreadyProcessed);
            }
            return Err(LedgerError::Database(e));
        }

        tx.commit().await?;
        Ok(WithdrawOutcome::Withdrawn)
    }

    async fn list_withdrawals_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_withdrawal).collect()
    }
}

use std::sync::Arc;
use std::time::Instant;

use accrual::{AccrualClient, AccrualGateway, FetchOutcome, map_status};
use common::OrderNumber;
use ledger::{ApplyOutcome, OrderLedgerStore, with_timeout};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::error::{ReconcileError, Result};
use crate::pause::SharedPause;

/// Counts of what happened to the orders of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Pending orders listed at the start of the cycle.
    pub listed: usize,
    /// Lookups whose result was written to the ledger.
    pub applied: usize,
    /// Applications that credited points.
    pub credited: usize,
    pub not_registered: usize,
    pub rate_limited: usize,
    /// Lookups skipped because the circuit breaker was open.
    pub unavailable: usize,
    /// Orders deleted between listing and the ledger write.
    pub vanished: usize,
    /// Lookups or ledger writes that failed.
    pub failed: usize,
    /// Orders left in the queue because shutdown was requested.
    pub abandoned: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.applied += other.applied;
        self.credited += other.credited;
        self.not_registered += other.not_registered;
        self.rate_limited += other.rate_limited;
        self.unavailable += other.unavailable;
        self.vanished += other.vanished;
        self.failed += other.failed;
    }

    /// Orders a handler actually finished with.
    pub fn handled(&self) -> usize {
        self.applied
            + self.not_registered
            + self.rate_limited
            + self.unavailable
            + self.vanished
            + self.failed
    }
}

/// Background worker that brings pending orders up to date with the
/// accrual service.
pub struct ReconciliationWorker<S, C: AccrualClient> {
    store: Arc<S>,
    gateway: Arc<AccrualGateway<C>>,
    config: WorkerConfig,
}

impl<S, C> ReconciliationWorker<S, C>
where
    S: OrderLedgerStore + 'static,
    C: AccrualClient + 'static,
{
    /// Creates a new worker.
    pub fn new(store: Arc<S>, gateway: Arc<AccrualGateway<C>>, config: WorkerConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Runs polling cycles until `shutdown` is cancelled.
    ///
    /// The first cycle starts one poll interval after the call. A cycle in
    /// progress when shutdown fires stops dispatching and returns once its
    /// in-flight lookups have finished.
    pub async fn start(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            pool_size = self.config.pool_size,
            "reconciliation worker started"
        );

        let first_tick = tokio::time::Instant::now() + self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(first_tick, self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle(&shutdown).await {
                        tracing::error!(error = %e, "reconciliation cycle failed");
                    }
                }
            }
        }

        tracing::info!("reconciliation worker stopped");
    }

    /// Runs one polling cycle.
    #[tracing::instrument(skip_all)]
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let started = Instant::now();
        metrics::counter!("reconciliation_cycles_total").increment(1);

        let pending = with_timeout(self.config.ledger_timeout, self.store.list_pending_orders())
            .await
            .map_err(ReconcileError::ListPending)?;

        let mut report = CycleReport {
            listed: pending.len(),
            ..CycleReport::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        tracing::debug!(count = pending.len(), "processing pending orders");

        let (tx, rx) = mpsc::channel(pending.len());
        for order in pending {
            // Capacity covers every order, so this never waits.
            if tx.send(order.number).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let pause = SharedPause::new();
        let mut handlers = JoinSet::new();

        for _ in 0..self.config.pool_size {
            let handler = Handler {
                store: Arc::clone(&self.store),
                gateway: Arc::clone(&self.gateway),
                config: self.config.clone(),
                pause: pause.clone(),
                shutdown: shutdown.clone(),
            };
            let queue = Arc::clone(&queue);
            handlers.spawn(async move { handler.drain(queue).await });
        }

        while let Some(joined) = handlers.join_next().await {
            match joined {
                Ok(partial) => report.merge(partial),
                Err(e) => tracing::error!(error = %e, "reconciliation handler panicked"),
            }
        }

        report.abandoned = report.listed.saturating_sub(report.handled());

        metrics::histogram!("reconciliation_cycle_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(?report, "reconciliation cycle finished");

        Ok(report)
    }
}

/// What happened to one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handled {
    Applied { credited: Option<Decimal> },
    NotRegistered,
    RateLimited,
    Unavailable,
    Vanished,
    Failed,
}

impl Handled {
    fn label(self) -> &'static str {
        match self {
            Handled::Applied { .. } => "applied",
            Handled::NotRegistered => "not_registered",
            Handled::RateLimited => "rate_limited",
            Handled::Unavailable => "unavailable",
            Handled::Vanished => "vanished",
            Handled::Failed => "failed",
        }
    }
}

/// One member of the per-cycle pool.
struct Handler<S, C: AccrualClient> {
    store: Arc<S>,
    gateway: Arc<AccrualGateway<C>>,
    config: WorkerConfig,
    pause: SharedPause,
    shutdown: CancellationToken,
}

impl<S, C> Handler<S, C>
where
    S: OrderLedgerStore,
    C: AccrualClient,
{
    async fn drain(self, queue: Arc<Mutex<mpsc::Receiver<OrderNumber>>>) -> CycleReport {
        let mut report = CycleReport::default();

        loop {
            if self.shutdown.is_cancelled() || !self.pause.wait(&self.shutdown).await {
                break;
            }

            let next = queue.lock().await.recv().await;
            let Some(number) = next else {
                break;
            };

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.config.request_delay) => {}
            }

            let handled = self.process(&number).await;
            metrics::counter!("reconciliation_orders_total", "outcome" => handled.label())
                .increment(1);

            match handled {
                Handled::Applied { credited } => {
                    report.applied += 1;
                    if credited.is_some() {
                        report.credited += 1;
                    }
                }
                Handled::NotRegistered => report.not_registered += 1,
                Handled::RateLimited => report.rate_limited += 1,
                Handled::Unavailable => report.unavailable += 1,
                Handled::Vanished => report.vanished += 1,
                Handled::Failed => report.failed += 1,
            }
        }

        report
    }

    async fn process(&self, number: &OrderNumber) -> Handled {
        match self.gateway.fetch(number).await {
            FetchOutcome::Found { status, accrual } => {
                let status = map_status(status);
                let apply = self.store.apply_accrual_result(number, status, accrual);
                match with_timeout(self.config.ledger_timeout, apply).await {
                    Ok(ApplyOutcome::Applied { credited }) => {
                        tracing::info!(order = %number, %status, ?credited, "order updated");
                        Handled::Applied { credited }
                    }
                    Ok(ApplyOutcome::NotFound) => {
                        tracing::debug!(order = %number, "order vanished before update");
                        Handled::Vanished
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(
                            order = %number,
                            error = %e,
                            "failed to update order, will retry"
                        );
                        Handled::Failed
                    }
                    Err(e) => {
                        tracing::error!(order = %number, error = %e, "failed to update order");
                        Handled::Failed
                    }
                }
            }
            FetchOutcome::NotRegistered => {
                tracing::debug!(order = %number, "order not registered in accrual system");
                Handled::NotRegistered
            }
            FetchOutcome::RateLimited { retry_after } => {
                let cool_down = self.config.cool_down(retry_after);
                tracing::warn!(?cool_down, "accrual rate limit exceeded, pausing worker");
                self.pause.extend(cool_down);
                Handled::RateLimited
            }
            FetchOutcome::Unavailable => Handled::Unavailable,
            FetchOutcome::OtherError(error) => {
                tracing::error!(order = %number, %error, "failed to get accrual for order");
                Handled::Failed
            }
        }
    }
}

//! Loyalty server entry point.

use std::sync::Arc;

use accrual::{AccrualGateway, HttpAccrualClient};
use ledger::PostgresLedger;
use reconciler::ReconciliationWorker;
use server::{AppState, Config, ServerError};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_args_and_env()?;
    server::telemetry::init_tracing(config.log_format);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;

    // 3. Connect to the ledger and apply migrations
    let ledger = PostgresLedger::connect(&config.database_uri, &config.pool_settings()).await?;
    ledger.run_migrations().await?;
    tracing::info!("ledger migrations applied");

    // 4. Start the reconciliation worker
    let client = HttpAccrualClient::new(config.http_client())?;
    let gateway = Arc::new(AccrualGateway::new(client, config.breaker.clone()));
    let state = Arc::new(AppState::new(gateway.breaker().clone()));

    let shutdown = CancellationToken::new();
    let worker = ReconciliationWorker::new(Arc::new(ledger.clone()), gateway, config.worker.clone());
    let worker_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.start(shutdown).await })
    };

    // 5. Serve health and metrics until a signal arrives
    let app = server::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                tokio::select! {
                    () = shutdown_signal() => shutdown.cancel(),
                    () = shutdown.cancelled() => {}
                }
            }
        })
        .await;

    // 6. Let the worker drain, then release the pool
    shutdown.cancel();
    match tokio::time::timeout(config.shutdown_grace, worker_task).await {
        Ok(Ok(())) => tracing::info!("reconciliation worker drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "reconciliation worker task failed"),
        Err(_) => tracing::warn!(
            grace = ?config.shutdown_grace,
            "reconciliation worker did not drain within grace period"
        ),
    }
    ledger.pool().close().await;

    served?;
    tracing::info!("server shut down gracefully");
    Ok(())
}

mod bootstrap;
mod health;
mod read_api;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vinoteka_core::config::{AppConfig, LoadOptions, LogFormat};
use vinoteka_core::domain::sync::TaskKind;
use vinoteka_sync::{enqueue_all, SyncServices};

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must exist before bootstrap so its events are captured.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut background = JoinSet::new();
    for index in 0..app.config.sync.worker_concurrency.max(1) {
        let worker = app.services.worker(format!("server-worker-{index}"));
        let shutdown = shutdown_rx.clone();
        background.spawn(async move { worker.run(shutdown).await });
    }

    if app.config.sync.sweep_interval_secs > 0 {
        let services = app.services.clone();
        let interval = Duration::from_secs(app.config.sync.sweep_interval_secs);
        background.spawn(run_sweep(services, interval, shutdown_rx.clone()));
    }

    let router = health::router(health::HealthState::new(
        app.db_pool.clone(),
        app.services.queue.clone(),
    ))
    .merge(read_api::router(read_api::ReadApiState::new(
        app.services.flat.clone(),
        app.services.related.clone(),
        app.config.locales.pair(),
        app.config.ranking.bucket_cap,
    )));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        workers = app.config.sync.worker_concurrency.max(1),
        sweep_interval_secs = app.config.sync.sweep_interval_secs,
        "vinoteka-server started"
    );

    let mut http_shutdown = shutdown_rx.clone();
    background.spawn(async move {
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = http_shutdown.changed().await;
            })
            .await;
        if let Err(error) = served {
            warn!(
                event_name = "system.server.http_error",
                correlation_id = "runtime",
                error = %error,
                "http server terminated unexpectedly"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "shutdown requested");
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let drained = tokio::time::timeout(grace, async {
        while background.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "background tasks did not stop in time; aborting"
        );
        background.abort_all();
    }

    app.db_pool.close().await;
    info!(event_name = "system.server.stopped", correlation_id = "shutdown", "vinoteka-server stopped");
    Ok(())
}

/// Re-enqueues every published variant on a fixed interval to repair missed
/// mutation-triggered syncs.
async fn run_sweep(services: SyncServices, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let correlation_id = format!("sweep-{}", chrono::Utc::now().timestamp());
                if let Err(error) = enqueue_all(
                    services.source.as_ref(),
                    services.flat.as_ref(),
                    services.dispatcher.as_ref(),
                    TaskKind::ProjectVariant,
                    &correlation_id,
                )
                .await
                {
                    warn!(
                        event_name = "sync.sweep.failed",
                        correlation_id = %correlation_id,
                        error = %error,
                        "periodic sweep could not enqueue"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

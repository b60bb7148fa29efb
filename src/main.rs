//! Trend Ingest Service: binary entrypoint.
//! Boots the Axum HTTP server, wiring routes, shared state, the optional
//! ingest scheduler, and the Prometheus exporter.

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_ingest::config::AppConfig;
use trend_ingest::ingest::scheduler::spawn_ingest_scheduler;
use trend_ingest::metrics::Metrics;

/// Compact logs by default; `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trend_ingest=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("loading configuration")?;
    tracing::info!(
        bind = %cfg.bind_addr,
        bucket = %cfg.bucket.label(),
        feed = %cfg.feed.url,
        "configuration loaded"
    );

    let (state, db) = trend_ingest::app_state(&cfg)?;

    let metrics = Metrics::init()?;
    let app = trend_ingest::create_router(state.clone()).merge(metrics.router());

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = cfg.scheduler.clone().map(|sched| {
        tracing::info!(interval_secs = sched.interval.as_secs(), "ingest scheduler enabled");
        spawn_ingest_scheduler(state.ingestor.clone(), sched, stop_rx)
    });

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = stop_tx.send(true);
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
    }
    db.shutdown().await;
    Ok(())
}

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once, from the binary.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        describe_ingest_metrics();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_ingest_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingestion runs by outcome (ok|error).");
        describe_counter!("ingest_scheduled_runs_total", "Runs triggered by the scheduler.");
        describe_counter!("ingest_items_written_total", "New card rows written.");
        describe_counter!("ingest_metrics_written_total", "New metric observation rows written.");
        describe_counter!("ingest_items_skipped_total", "Items whose slug already existed.");
        describe_counter!("ingest_item_failures_total", "Items rejected by per-item isolation.");
        describe_counter!("ingest_provider_errors_total", "Feed fetch/decode errors.");
        describe_histogram!("ingest_fetch_ms", "Feed fetch time in milliseconds.");
        describe_gauge!("ingest_last_run_ts", "Unix ts when ingestion last ran.");
    });
}

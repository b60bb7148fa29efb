use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::bucket::to_iso;
use crate::ingest::{IngestFailure, IngestReport, Ingestor};
use crate::store::CardStore;

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
    pub store: Arc<dyn CardStore>,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>, store: Arc<dyn CardStore>) -> Self {
        Self { ingestor, store }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/health/db", get(health_db))
        .route("/ingest", get(ingest_status).post(trigger_ingest))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestOk {
    ok: bool,
    items_written: usize,
    metrics_written: usize,
    window_start: String,
    window_end: String,
    total_fetched: usize,
    bucket_size_minutes: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestErr {
    ok: bool,
    error: String,
    items_written: usize,
    metrics_written: usize,
    window_start: String,
    window_end: String,
}

impl From<IngestReport> for IngestOk {
    fn from(r: IngestReport) -> Self {
        Self {
            ok: true,
            items_written: r.items_written,
            metrics_written: r.metrics_written,
            window_start: to_iso(&r.window.start),
            window_end: to_iso(&r.window.end),
            total_fetched: r.total_fetched,
            bucket_size_minutes: r.bucket_size_minutes,
        }
    }
}

impl From<IngestFailure> for IngestErr {
    fn from(f: IngestFailure) -> Self {
        Self {
            ok: false,
            error: f.error.to_string(),
            items_written: 0,
            metrics_written: 0,
            window_start: to_iso(&f.window.start),
            window_end: to_iso(&f.window.end),
        }
    }
}

async fn trigger_ingest(State(state): State<AppState>) -> Response {
    match state.ingestor.run().await {
        Ok(report) => (StatusCode::OK, Json(IngestOk::from(report))).into_response(),
        Err(failure) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(IngestErr::from(failure))).into_response()
        }
    }
}

async fn ingest_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let bucket = state.ingestor.bucket();
    let window = bucket.current_window();
    Json(json!({
        "ok": true,
        "message": "HN ingestion endpoint is ready",
        "currentBucket": {
            "start": to_iso(&window.start),
            "end": to_iso(&window.end),
            "sizeMinutes": bucket.minutes(),
        },
        "usage": {
            "method": "POST",
            "description": "Trigger HN front page ingestion",
            "response": {
                "ok": "boolean",
                "itemsWritten": "number",
                "metricsWritten": "number",
                "windowStart": "string (ISO)",
                "windowEnd": "string (ISO)",
                "totalFetched": "number",
                "bucketSizeMinutes": "number",
            },
        },
    }))
}

#[derive(Serialize)]
struct DbHealthOut {
    ok: bool,
    now: String,
    version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn health_db(State(state): State<AppState>) -> Response {
    match state.store.health().await {
        Ok(h) => (
            StatusCode::OK,
            Json(DbHealthOut {
                ok: true,
                now: to_iso(&h.now),
                version: h.version,
                error: None,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(DbHealthOut {
                    ok: false,
                    now: to_iso(&Utc::now()),
                    version: "unknown".to_string(),
                    error: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

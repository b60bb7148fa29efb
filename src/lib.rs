// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod bucket;
pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod metrics;
pub mod slug;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::bucket::{BucketSpec, BucketWindow};
pub use crate::config::AppConfig;
pub use crate::ingest::{IngestReport, Ingestor};
pub use crate::slug::generate_slug;

use std::sync::Arc;

use crate::feed::hn::HnFeed;
use crate::store::{CardStore, Database};

/// Wire the production feed and the given store into an `Ingestor`.
pub fn build_ingestor(cfg: &AppConfig, store: Arc<dyn CardStore>) -> anyhow::Result<Arc<Ingestor>> {
    let feed = HnFeed::with_timeout(cfg.feed.url.clone(), cfg.feed.timeout)?;
    Ok(Arc::new(Ingestor::new(Arc::new(feed), store, cfg.bucket)))
}

/// Build the shared state from config: lazy pool plus HN feed.
pub fn app_state(cfg: &AppConfig) -> anyhow::Result<(AppState, Database)> {
    let db = Database::init(&cfg.database)?;
    let store: Arc<dyn CardStore> = Arc::new(db.clone());
    let ingestor = build_ingestor(cfg, store.clone())?;
    Ok((AppState::new(ingestor, store), db))
}

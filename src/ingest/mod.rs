// src/ingest/mod.rs
//! Ingestion Orchestrator.
//!
//! One run = align the current bucket, fetch the feed once, then write every
//! item inside a single transaction. Each item runs under its own savepoint so
//! an item-level failure is undone and recorded without aborting the batch.

pub mod record;
pub mod scheduler;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::bucket::{to_iso, BucketSpec, BucketWindow};
use crate::error::{IngestError, ItemProcessingError, StoreError};
use crate::feed::{FeedSource, RawItem};
use crate::ingest::record::StoryRecord;
use crate::store::{CardStore, IngestTx};

/// What happened to one fetched item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// New card row plus this many new metric rows.
    Written { metrics_written: usize },
    /// Slug already present; nothing written.
    Skipped,
    Failed(String),
}

/// Fold of all item outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub metrics_written: usize,
}

impl RunSummary {
    pub fn absorb(mut self, outcome: &ItemOutcome) -> Self {
        match outcome {
            ItemOutcome::Written { metrics_written } => {
                self.written += 1;
                self.metrics_written += metrics_written;
            }
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(_) => self.failed += 1,
        }
        self
    }

    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ItemOutcome>) -> Self {
        outcomes.into_iter().fold(Self::default(), Self::absorb)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub items_written: usize,
    pub metrics_written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_fetched: usize,
    pub window: BucketWindow<Utc>,
    pub bucket_size_minutes: u32,
}

/// A failed run. The window is still reported so callers can render it.
#[derive(Debug)]
pub struct IngestFailure {
    pub error: IngestError,
    pub window: BucketWindow<Utc>,
}

pub struct Ingestor {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn CardStore>,
    bucket: BucketSpec,
}

impl Ingestor {
    pub fn new(feed: Arc<dyn FeedSource>, store: Arc<dyn CardStore>, bucket: BucketSpec) -> Self {
        Self {
            feed,
            store,
            bucket,
        }
    }

    pub fn bucket(&self) -> BucketSpec {
        self.bucket
    }

    pub async fn run(&self) -> Result<IngestReport, IngestFailure> {
        self.run_at(Utc::now()).await
    }

    /// Run with an explicit clock reading (the bucket is derived from `now`).
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<IngestReport, IngestFailure> {
        crate::metrics::describe_ingest_metrics();

        let window = self.bucket.align_to_bucket(&now);
        info!(
            target: "ingest",
            provider = self.feed.name(),
            window_start = %to_iso(&window.start),
            window_end = %to_iso(&window.end),
            "ingestion started"
        );

        let result = self.execute(&window).await;
        gauge!("ingest_last_run_ts").set(now.timestamp() as f64);

        match result {
            Ok(report) => {
                counter!("ingest_runs_total", "outcome" => "ok").increment(1);
                counter!("ingest_items_written_total").increment(report.items_written as u64);
                counter!("ingest_metrics_written_total").increment(report.metrics_written as u64);
                counter!("ingest_items_skipped_total").increment(report.skipped as u64);
                counter!("ingest_item_failures_total").increment(report.failed as u64);
                info!(
                    target: "ingest",
                    fetched = report.total_fetched,
                    written = report.items_written,
                    metrics = report.metrics_written,
                    skipped = report.skipped,
                    failed = report.failed,
                    "ingestion completed"
                );
                Ok(report)
            }
            Err(error) => {
                counter!("ingest_runs_total", "outcome" => "error").increment(1);
                error!(target: "ingest", error = %error, "ingestion failed");
                Err(IngestFailure { error, window })
            }
        }
    }

    async fn execute(&self, window: &BucketWindow<Utc>) -> Result<IngestReport, IngestError> {
        let items = self.feed.fetch_items().await?;
        if items.is_empty() {
            return Err(IngestError::EmptyFeed);
        }
        info!(target: "ingest", fetched = items.len(), "feed fetched");

        let label = self.bucket.label();
        let mut tx = self.store.begin().await.map_err(IngestError::Transaction)?;
        let mut outcomes = Vec::with_capacity(items.len());

        for (idx, raw) in items.iter().enumerate() {
            match process_item(&mut *tx, raw, idx + 1, window, &label).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(fatal) => {
                    if let Err(e) = tx.rollback().await {
                        warn!(target: "ingest", error = %e, "rollback after fatal error failed");
                    }
                    return Err(IngestError::Transaction(fatal));
                }
            }
        }

        tx.commit().await.map_err(IngestError::Transaction)?;

        let summary = RunSummary::from_outcomes(&outcomes);
        Ok(IngestReport {
            items_written: summary.written,
            metrics_written: summary.metrics_written,
            skipped: summary.skipped,
            failed: summary.failed,
            total_fetched: items.len(),
            window: window.clone(),
            bucket_size_minutes: self.bucket.minutes(),
        })
    }
}

/// Process one item under a savepoint.
///
/// `Err` only for failures that leave the transaction unusable.
async fn process_item(
    tx: &mut dyn IngestTx,
    raw: &RawItem,
    rank: usize,
    window: &BucketWindow<Utc>,
    bucket_label: &str,
) -> Result<ItemOutcome, StoreError> {
    tx.savepoint().await?;
    match write_item(tx, raw, rank, window, bucket_label).await {
        Ok(outcome) => {
            tx.release_savepoint().await?;
            Ok(outcome)
        }
        Err(ItemProcessingError::Store { source, .. }) if source.is_fatal() => Err(source),
        Err(e) => {
            warn!(
                target: "ingest",
                position = rank,
                external_id = raw.external_id.as_deref().unwrap_or("<missing>"),
                error = %e,
                "item skipped after error"
            );
            tx.rollback_to_savepoint().await?;
            Ok(ItemOutcome::Failed(e.to_string()))
        }
    }
}

async fn write_item(
    tx: &mut dyn IngestTx,
    raw: &RawItem,
    rank: usize,
    window: &BucketWindow<Utc>,
    bucket_label: &str,
) -> Result<ItemOutcome, ItemProcessingError> {
    let story = StoryRecord::from_raw(raw, rank)?;
    let card = story.to_card();
    let store_err = |source: StoreError| ItemProcessingError::Store {
        external_id: story.external_id.clone(),
        source,
    };

    let Some(card_id) = tx.insert_card(&card).await.map_err(store_err)? else {
        tracing::debug!(target: "ingest", slug = %card.slug, "card exists, skipping");
        return Ok(ItemOutcome::Skipped);
    };

    let mut metrics_written = 0;
    for obs in story.observations(card_id, window, bucket_label) {
        if tx.insert_count(&obs).await.map_err(store_err)? {
            metrics_written += 1;
        }
    }
    Ok(ItemOutcome::Written { metrics_written })
}

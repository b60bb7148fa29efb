// src/store/mod.rs
//! Item Store (`cards`) and Metric Store (`counts`).
//!
//! Both stores expose insert-or-ignore writes against a documented unique key:
//! - cards: `slug`
//! - counts: `(card_id, source, metric_name, bucket_start, bucket_end)`
//!
//! A duplicate write is a silent no-op, never an overwrite.

pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::Database;

/// Neutral value every score column starts with.
pub const DEFAULT_SCORE: i32 = 50;

pub type CardId = i64;

/// The seven placeholder score columns of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scores {
    pub velocity: i32,
    pub acceleration: i32,
    pub convergence: i32,
    pub search_intent: i32,
    pub creator: i32,
    pub engagement_efficiency: i32,
    pub geo_demo_spread: i32,
}

impl Default for Scores {
    fn default() -> Self {
        Self {
            velocity: DEFAULT_SCORE,
            acceleration: DEFAULT_SCORE,
            convergence: DEFAULT_SCORE,
            search_intent: DEFAULT_SCORE,
            creator: DEFAULT_SCORE,
            engagement_efficiency: DEFAULT_SCORE,
            geo_demo_spread: DEFAULT_SCORE,
        }
    }
}

/// Canonical card row as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCard {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub source: String,
    pub source_url: String,
    pub scores: Scores,
    pub source_tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// One numeric observation of a card inside a bucket window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricObservation {
    pub card_id: CardId,
    pub source: String,
    pub metric_name: String,
    pub metric_value: f64,
    pub bucket_start: DateTime<Utc>,
    pub bucket_end: DateTime<Utc>,
    pub bucket_size: String,
}

/// Result of a storage round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbHealth {
    pub now: DateTime<Utc>,
    pub version: String,
}

/// Process-scoped storage handle.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Open one transaction for an ingestion run.
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError>;

    /// Trivial round-trip used by `/health/db`.
    async fn health(&self) -> Result<DbHealth, StoreError>;

    /// Overwrite the score columns of an existing card. Returns `false` if no card has that slug.
    async fn update_scores(&self, slug: &str, scores: Scores) -> Result<bool, StoreError>;
}

/// Writes of a single ingestion run.
///
/// Savepoints let one item's failure be undone without losing the rest of the batch.
#[async_trait]
pub trait IngestTx: Send {
    async fn savepoint(&mut self) -> Result<(), StoreError>;
    async fn release_savepoint(&mut self) -> Result<(), StoreError>;
    async fn rollback_to_savepoint(&mut self) -> Result<(), StoreError>;

    /// Insert keyed by slug. `Ok(None)` when the slug already exists.
    async fn insert_card(&mut self, card: &NewCard) -> Result<Option<CardId>, StoreError>;

    /// Insert keyed by the observation tuple. `Ok(false)` when it already exists.
    async fn insert_count(&mut self, obs: &MetricObservation) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

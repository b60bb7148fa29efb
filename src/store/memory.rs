// src/store/memory.rs
//! In-memory stores with the same uniqueness rules as the Postgres schema.
//!
//! Used as the test double for the orchestrator and the HTTP layer. Faults can
//! be injected per slug to exercise item-level and transaction-level failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::store::{CardId, CardStore, DbHealth, IngestTx, MetricObservation, NewCard, Scores};

/// `(card_id, source, metric_name, bucket_start, bucket_end)`
type CountKey = (CardId, String, String, DateTime<Utc>, DateTime<Utc>);

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCard {
    pub id: CardId,
    pub card: NewCard,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    cards: BTreeMap<String, StoredCard>,
    counts: BTreeMap<CountKey, MetricObservation>,
}

impl Tables {
    /// Insert-or-ignore of everything in `other`, by each table's unique key.
    ///
    /// Counts pointing at a card that lost a concurrent slug race are dropped,
    /// like a foreign key would reject them.
    fn merge_from(&mut self, other: Tables) {
        for (slug, card) in other.cards {
            self.cards.entry(slug).or_insert(card);
        }
        let live: HashSet<CardId> = self.cards.values().map(|c| c.id).collect();
        for (key, obs) in other.counts {
            if live.contains(&obs.card_id) {
                self.counts.entry(key).or_insert(obs);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// `insert_card` for these slugs fails with an item-level error.
    query_error_slugs: HashSet<String>,
    /// `insert_card` for these slugs fails as if the connection dropped.
    connection_error_slugs: HashSet<String>,
    fail_begin: bool,
    unhealthy: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Mutex<Faults>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_card_insert(&self, slug: &str) {
        self.faults_mut().query_error_slugs.insert(slug.to_string());
    }

    pub fn drop_connection_on(&self, slug: &str) {
        self.faults_mut().connection_error_slugs.insert(slug.to_string());
    }

    pub fn fail_begin(&self, on: bool) {
        self.faults_mut().fail_begin = on;
    }

    pub fn set_unhealthy(&self, on: bool) {
        self.faults_mut().unhealthy = on;
    }

    pub fn cards(&self) -> Vec<StoredCard> {
        self.committed().cards.values().cloned().collect()
    }

    pub fn card(&self, slug: &str) -> Option<StoredCard> {
        self.committed().cards.get(slug).cloned()
    }

    /// Observations ordered by their unique key.
    pub fn counts(&self) -> Vec<MetricObservation> {
        self.committed().counts.values().cloned().collect()
    }

    fn committed(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store mutex poisoned")
    }

    fn faults_mut(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().expect("memory store faults mutex poisoned")
    }
}

#[async_trait]
impl CardStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError> {
        if self.faults_mut().fail_begin {
            return Err(StoreError::Connection("pool timed out".into()));
        }
        let snapshot = self.committed().clone();
        Ok(Box::new(MemoryTx {
            store: self.clone(),
            staged: snapshot,
            savepoint: None,
        }))
    }

    async fn health(&self) -> Result<DbHealth, StoreError> {
        if self.faults_mut().unhealthy {
            return Err(StoreError::Connection("connection refused".into()));
        }
        Ok(DbHealth {
            now: Utc::now(),
            version: "memory".to_string(),
        })
    }

    async fn update_scores(&self, slug: &str, scores: Scores) -> Result<bool, StoreError> {
        let mut tables = self.committed();
        match tables.cards.get_mut(slug) {
            Some(stored) => {
                stored.card.scores = scores;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct MemoryTx {
    store: MemoryStore,
    staged: Tables,
    savepoint: Option<Tables>,
}

#[async_trait]
impl IngestTx for MemoryTx {
    async fn savepoint(&mut self) -> Result<(), StoreError> {
        self.savepoint = Some(self.staged.clone());
        Ok(())
    }

    async fn release_savepoint(&mut self) -> Result<(), StoreError> {
        self.savepoint = None;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
        match self.savepoint.take() {
            Some(saved) => {
                self.staged = saved;
                Ok(())
            }
            None => Err(StoreError::Connection("no active savepoint".into())),
        }
    }

    async fn insert_card(&mut self, card: &NewCard) -> Result<Option<CardId>, StoreError> {
        {
            let faults = self.store.faults_mut();
            if faults.connection_error_slugs.contains(&card.slug) {
                return Err(StoreError::Connection("connection reset by peer".into()));
            }
            if faults.query_error_slugs.contains(&card.slug) {
                return Err(StoreError::Query(format!(
                    "rejected card {}",
                    card.slug
                )));
            }
        }
        if self.staged.cards.contains_key(&card.slug) {
            return Ok(None);
        }
        let id = self.store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.staged.cards.insert(
            card.slug.clone(),
            StoredCard {
                id,
                card: card.clone(),
            },
        );
        Ok(Some(id))
    }

    async fn insert_count(&mut self, obs: &MetricObservation) -> Result<bool, StoreError> {
        let key = (
            obs.card_id,
            obs.source.clone(),
            obs.metric_name.clone(),
            obs.bucket_start,
            obs.bucket_end,
        );
        if self.staged.counts.contains_key(&key) {
            return Ok(false);
        }
        self.staged.counts.insert(key, obs.clone());
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { store, staged, .. } = *self;
        store.committed().merge_from(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Scores;

    fn card(slug: &str) -> NewCard {
        NewCard {
            slug: slug.to_string(),
            title: "t".into(),
            description: "d".into(),
            category: "Technology".into(),
            source: "hackernews".into(),
            source_url: "https://example.com".into(),
            scores: Scores::default(),
            source_tags: vec!["hackernews".into()],
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_a_no_op() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_card(&card("a-1")).await.unwrap().is_some());
        assert!(tx.insert_card(&card("a-1")).await.unwrap().is_none());
        tx.commit().await.unwrap();
        assert_eq!(store.cards().len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_card(&card("a-1")).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.cards().is_empty());
    }

    #[tokio::test]
    async fn savepoint_rollback_keeps_earlier_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_card(&card("a-1")).await.unwrap();
        tx.savepoint().await.unwrap();
        tx.insert_card(&card("b-2")).await.unwrap();
        tx.rollback_to_savepoint().await.unwrap();
        tx.commit().await.unwrap();
        let slugs: Vec<String> = store.cards().into_iter().map(|c| c.card.slug).collect();
        assert_eq!(slugs, vec!["a-1".to_string()]);
    }

    #[tokio::test]
    async fn update_scores_overwrites_existing_card() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_card(&card("a-1")).await.unwrap();
        tx.commit().await.unwrap();

        let scores = Scores {
            velocity: 90,
            ..Scores::default()
        };
        assert!(store.update_scores("a-1", scores).await.unwrap());
        assert!(!store.update_scores("missing-9", scores).await.unwrap());
        assert_eq!(store.card("a-1").unwrap().card.scores.velocity, 90);
    }
}

// src/store/postgres.rs
//! Postgres-backed stores over a process-wide `sqlx` pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::info;

use crate::config::{parse_database_url, DatabaseConfig};
use crate::error::{ConfigError, StoreError};
use crate::store::{CardId, CardStore, DbHealth, IngestTx, MetricObservation, NewCard, Scores};

const INSERT_CARD: &str = r#"
    INSERT INTO cards (
        slug, title, description, source, source_url, category,
        velocity_score, acceleration_score, convergence_score,
        search_intent_score, creator_score, engagement_efficiency_score,
        geo_demo_spread_score, source_tags, metadata
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (slug) DO NOTHING
    RETURNING id
"#;

const INSERT_COUNT: &str = r#"
    INSERT INTO counts (
        card_id, source, metric_name, metric_value,
        bucket_start, bucket_end, bucket_size
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (card_id, source, metric_name, bucket_start, bucket_end) DO NOTHING
"#;

const UPDATE_SCORES: &str = r#"
    UPDATE cards SET
        velocity_score = $2,
        acceleration_score = $3,
        convergence_score = $4,
        search_intent_score = $5,
        creator_score = $6,
        engagement_efficiency_score = $7,
        geo_demo_spread_score = $8,
        updated_at = NOW()
    WHERE slug = $1
"#;

/// Process-scoped handle around the connection pool.
///
/// Created once by [`Database::init`] and closed by [`Database::shutdown`].
/// Connections are opened lazily on first use.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn init(cfg: &DatabaseConfig) -> Result<Self, ConfigError> {
        let opts = parse_database_url(&cfg.url)?;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout)
            .idle_timeout(Some(cfg.idle_timeout))
            .connect_lazy_with(opts);
        info!(
            max_connections = cfg.max_connections,
            acquire_timeout_ms = cfg.acquire_timeout.as_millis() as u64,
            "database pool created"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}

#[async_trait]
impl CardStore for Database {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Box::new(PgIngestTx { tx }))
    }

    async fn health(&self) -> Result<DbHealth, StoreError> {
        let (now, version): (DateTime<Utc>, String) =
            sqlx::query_as("SELECT NOW() AS now, current_setting('server_version') AS version")
                .fetch_one(&self.pool)
                .await?;
        Ok(DbHealth { now, version })
    }

    async fn update_scores(&self, slug: &str, scores: Scores) -> Result<bool, StoreError> {
        let res = sqlx::query(UPDATE_SCORES)
            .bind(slug)
            .bind(scores.velocity)
            .bind(scores.acceleration)
            .bind(scores.convergence)
            .bind(scores.search_intent)
            .bind(scores.creator)
            .bind(scores.engagement_efficiency)
            .bind(scores.geo_demo_spread)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

struct PgIngestTx {
    tx: Transaction<'static, Postgres>,
}

impl PgIngestTx {
    // Savepoint statements only fail when the transaction itself is broken.
    async fn control(&mut self, sql: &'static str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(&mut *self.tx)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl IngestTx for PgIngestTx {
    async fn savepoint(&mut self) -> Result<(), StoreError> {
        self.control("SAVEPOINT ingest_item").await
    }

    async fn release_savepoint(&mut self) -> Result<(), StoreError> {
        self.control("RELEASE SAVEPOINT ingest_item").await
    }

    async fn rollback_to_savepoint(&mut self) -> Result<(), StoreError> {
        self.control("ROLLBACK TO SAVEPOINT ingest_item").await
    }

    async fn insert_card(&mut self, card: &NewCard) -> Result<Option<CardId>, StoreError> {
        let s = &card.scores;
        let id: Option<CardId> = sqlx::query_scalar(INSERT_CARD)
            .bind(&card.slug)
            .bind(&card.title)
            .bind(&card.description)
            .bind(&card.source)
            .bind(&card.source_url)
            .bind(&card.category)
            .bind(s.velocity)
            .bind(s.acceleration)
            .bind(s.convergence)
            .bind(s.search_intent)
            .bind(s.creator)
            .bind(s.engagement_efficiency)
            .bind(s.geo_demo_spread)
            .bind(&card.source_tags)
            .bind(sqlx::types::Json(&card.metadata))
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(id)
    }

    async fn insert_count(&mut self, obs: &MetricObservation) -> Result<bool, StoreError> {
        let res = sqlx::query(INSERT_COUNT)
            .bind(obs.card_id)
            .bind(&obs.source)
            .bind(&obs.metric_name)
            .bind(obs.metric_value)
            .bind(obs.bucket_start)
            .bind(obs.bucket_end)
            .bind(&obs.bucket_size)
            .execute(&mut *self.tx)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

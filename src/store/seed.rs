// src/store/seed.rs
//! Seed data loader and reset helper for development databases.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::store::migrate::{discover_sql_files, is_undefined_table};

pub const DEFAULT_SEEDS_DIR: &str = "db/seeds";

/// Tables cleared by [`reset`], children first.
const RESET_ORDER: [&str; 2] = ["counts", "cards"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    Applied(Vec<String>),
    /// `cards` already has rows and `force` was not set.
    SkippedExistingData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSummary {
    pub table_counts: Vec<(String, i64)>,
    /// `(title, category, velocity_score)` of the newest cards.
    pub sample_cards: Vec<(String, String, i32)>,
}

pub async fn has_data(pool: &PgPool) -> Result<bool> {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cards")
        .fetch_one(pool)
        .await
    {
        Ok(n) => Ok(n > 0),
        Err(e) if is_undefined_table(&e) => Ok(false),
        Err(e) => Err(e).context("counting cards"),
    }
}

pub async fn run_seeds(pool: &PgPool, dir: &Path, force: bool) -> Result<SeedOutcome> {
    if has_data(pool).await? {
        if !force {
            warn!("database already contains data; pass --force to seed anyway");
            return Ok(SeedOutcome::SkippedExistingData);
        }
        info!("force flag set, seeding over existing data");
    }

    let files = discover_sql_files(dir)?;
    let mut applied = Vec::with_capacity(files.len());
    for file in &files {
        let sql = fs::read_to_string(&file.path)
            .with_context(|| format!("reading seed {}", file.filename))?;
        let mut tx = pool.begin().await.context("begin seed transaction")?;
        sqlx::raw_sql(&sql)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "applying seed {} (last successful: {})",
                    file.filename,
                    applied.last().map(String::as_str).unwrap_or("none")
                )
            })?;
        tx.commit()
            .await
            .with_context(|| format!("committing seed {}", file.filename))?;
        info!(file = %file.filename, "seed applied");
        applied.push(file.filename.clone());
    }
    Ok(SeedOutcome::Applied(applied))
}

/// Delete all ingested data in one transaction.
pub async fn reset(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;
    for table in RESET_ORDER {
        info!(table, "clearing table");
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("clearing {table}"))?;
    }
    tx.commit().await.context("committing reset")?;
    Ok(())
}

pub async fn summary(pool: &PgPool) -> Result<DataSummary> {
    let mut table_counts = Vec::with_capacity(RESET_ORDER.len());
    for table in ["cards", "counts"] {
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("counting {table}"))?;
        table_counts.push((table.to_string(), n));
    }
    let sample_cards = sqlx::query_as::<_, (String, String, i32)>(
        "SELECT title, category, velocity_score FROM cards ORDER BY created_at DESC LIMIT 3",
    )
    .fetch_all(pool)
    .await
    .context("sampling cards")?;
    Ok(DataSummary {
        table_counts,
        sample_cards,
    })
}

// src/store/migrate.rs
//! File-based schema migrations tracked in `schema_migrations`.
//!
//! Migrations are `*.sql` files applied in filename order; a file's version is
//! its stem. Each file runs in its own transaction together with its tracking row.

use anyhow::{anyhow, Context, Result};
use sqlx::PgPool;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const DEFAULT_MIGRATIONS_DIR: &str = "db/migrations";

const CREATE_TRACKING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version TEXT PRIMARY KEY,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
"#;

/// Postgres `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFile {
    pub filename: String,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub file: SqlFile,
    pub applied: bool,
}

/// List `*.sql` files in `dir`, sorted by filename.
pub fn discover_sql_files(dir: &Path) -> Result<Vec<SqlFile>> {
    if !dir.is_dir() {
        return Err(anyhow!("directory not found: {}", dir.display()));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let (Some(filename), Some(version)) = (
            path.file_name().and_then(|s| s.to_str()).map(str::to_string),
            path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
        ) else {
            continue;
        };
        files.push(SqlFile {
            filename,
            version,
            path,
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

pub(crate) fn is_undefined_table(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE))
}

/// Versions already recorded. A missing tracking table means none.
pub async fn applied_versions(pool: &PgPool) -> Result<Vec<String>> {
    match sqlx::query_scalar::<_, String>("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
    {
        Ok(v) => Ok(v),
        Err(e) if is_undefined_table(&e) => Ok(Vec::new()),
        Err(e) => Err(e).context("reading schema_migrations"),
    }
}

pub async fn status(pool: &PgPool, dir: &Path) -> Result<Vec<MigrationStatus>> {
    let files = discover_sql_files(dir)?;
    let applied = applied_versions(pool).await?;
    Ok(files
        .into_iter()
        .map(|file| {
            let applied = applied.contains(&file.version);
            MigrationStatus { file, applied }
        })
        .collect())
}

async fn apply_one(pool: &PgPool, file: &SqlFile) -> Result<()> {
    let sql = fs::read_to_string(&file.path)
        .with_context(|| format!("reading migration {}", file.filename))?;

    // Dropping the transaction on an early return rolls it back.
    let mut tx = pool.begin().await.context("begin migration transaction")?;
    sqlx::raw_sql(&sql)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("applying migration {}", file.filename))?;
    sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1) ON CONFLICT (version) DO NOTHING")
        .bind(&file.version)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("recording migration {}", file.filename))?;
    tx.commit()
        .await
        .with_context(|| format!("committing migration {}", file.filename))?;
    Ok(())
}

/// Apply every pending migration, stopping at the first failure.
/// Returns the filenames applied by this call.
pub async fn run_pending(pool: &PgPool, dir: &Path) -> Result<Vec<String>> {
    let files = discover_sql_files(dir)?;
    sqlx::raw_sql(CREATE_TRACKING_TABLE)
        .execute(pool)
        .await
        .context("creating schema_migrations")?;
    let applied = applied_versions(pool).await?;

    let pending: Vec<SqlFile> = files
        .into_iter()
        .filter(|f| !applied.contains(&f.version))
        .collect();
    info!(pending = pending.len(), applied = applied.len(), "migration plan");

    let mut done = Vec::with_capacity(pending.len());
    for file in &pending {
        info!(file = %file.filename, "applying migration");
        if let Err(e) = apply_one(pool, file).await {
            error!(
                file = %file.filename,
                last_successful = done.last().map(String::as_str).unwrap_or("none"),
                error = %format!("{e:#}"),
                "migration failed, stopping"
            );
            return Err(e);
        }
        done.push(file.filename.clone());
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_sql_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["002_counts.sql", "001_cards.sql", "notes.md", "010_index.sql"] {
            fs::write(dir.path().join(name), "-- noop").unwrap();
        }
        let files = discover_sql_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["001_cards.sql", "002_counts.sql", "010_index.sql"]);
        assert_eq!(files[0].version, "001_cards");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_sql_files(&dir.path().join("nope")).is_err());
    }
}

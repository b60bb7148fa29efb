// tests/postgres_store.rs
//
// Postgres adapter against a live database. Ignored by default:
//   DATABASE_URL=postgres://... cargo test --test postgres_store -- --ignored
//
// Every transaction is rolled back, so the database is left as found
// (apart from applied migrations).

use std::path::Path;

use chrono::{TimeZone, Utc};
use rand::Rng;
use serde_json::json;

use trend_ingest::config::{AppConfig, FileConfig};
use trend_ingest::store::migrate::{run_pending, DEFAULT_MIGRATIONS_DIR};
use trend_ingest::store::{CardStore, Database, IngestTx, MetricObservation, NewCard, Scores};

async fn database() -> Option<Database> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let cfg = AppConfig::from_sources(FileConfig::default(), |k| {
        (k == "DATABASE_URL").then(|| url.clone())
    })
    .expect("DATABASE_URL must be a valid postgres URL");
    let db = Database::init(&cfg.database).expect("pool");
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_MIGRATIONS_DIR);
    run_pending(db.pool(), &dir).await.expect("migrations");
    Some(db)
}

fn card(slug: &str) -> NewCard {
    NewCard {
        slug: slug.to_string(),
        title: "Adapter check".into(),
        description: "Hacker News story by tester".into(),
        category: "Technology".into(),
        source: "hackernews".into(),
        source_url: "https://news.ycombinator.com/item?id=1".into(),
        scores: Scores::default(),
        source_tags: vec!["hackernews".into()],
        metadata: json!({ "hn_id": "1", "tags": ["story"] }),
    }
}

fn observation(card_id: i64) -> MetricObservation {
    MetricObservation {
        card_id,
        source: "hackernews".into(),
        metric_name: "points".into(),
        metric_value: 42.0,
        bucket_start: Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap(),
        bucket_end: Utc.with_ymd_and_hms(2025, 3, 14, 10, 45, 0).unwrap(),
        bucket_size: "15m".into(),
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn insert_or_ignore_and_savepoints() {
    let Some(db) = database().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let slug = format!("adapter-check-{}", rand::rng().random_range(0..u32::MAX));

    let mut tx = db.begin().await.unwrap();

    tx.savepoint().await.unwrap();
    let id = tx
        .insert_card(&card(&slug))
        .await
        .unwrap()
        .expect("first insert returns the new id");
    assert!(id > 0);
    assert!(tx.insert_card(&card(&slug)).await.unwrap().is_none());
    assert!(tx.insert_count(&observation(id)).await.unwrap());
    assert!(!tx.insert_count(&observation(id)).await.unwrap());
    tx.release_savepoint().await.unwrap();

    // A rejected statement is undone by the savepoint and the transaction survives.
    tx.savepoint().await.unwrap();
    let err = tx.insert_count(&observation(-1)).await.unwrap_err();
    assert!(!err.is_fatal(), "{err}");
    tx.rollback_to_savepoint().await.unwrap();

    let other = tx
        .insert_card(&card(&format!("{slug}-b")))
        .await
        .unwrap();
    assert!(other.is_some());

    tx.rollback().await.unwrap();
    db.shutdown().await;
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a disposable Postgres"]
async fn health_reports_server_version() {
    let Some(db) = database().await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let health = db.health().await.unwrap();
    assert!(!health.version.is_empty());
    assert!(!db.update_scores("no-such-slug-0", Scores::default()).await.unwrap());
    db.shutdown().await;
}

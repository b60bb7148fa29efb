//! Database tooling for the trend ingest service.
//!
//! - migrate: apply or list SQL migrations from `db/migrations`
//! - seed: load demo rows from `db/seeds`, optionally wiping first
//! - check: verify connectivity and print server details
//! - ingest: run one ingestion pass from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use trend_ingest::bucket::to_iso;
use trend_ingest::config::AppConfig;
use trend_ingest::store::migrate::{self, DEFAULT_MIGRATIONS_DIR};
use trend_ingest::store::seed::{self, SeedOutcome, DEFAULT_SEEDS_DIR};
use trend_ingest::store::{CardStore, Database};

#[derive(Parser)]
#[command(name = "trends-db")]
#[command(about = "Schema, seed, and connectivity tooling for the trends database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations or show their status
    Migrate {
        #[command(subcommand)]
        action: Option<MigrateAction>,
        /// Directory holding numbered .sql files
        #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR)]
        dir: PathBuf,
    },

    /// Load seed data
    Seed {
        /// Seed even when cards already has rows
        #[arg(long)]
        force: bool,
        /// Delete all cards and counts before seeding
        #[arg(long)]
        reset: bool,
        /// Only print row counts and a few sample cards
        #[arg(long)]
        summary: bool,
        /// Directory holding seed .sql files
        #[arg(long, default_value = DEFAULT_SEEDS_DIR)]
        dir: PathBuf,
    },

    /// Check database connectivity
    Check,

    /// Run one ingestion pass and print the report
    Ingest,
}

#[derive(Subcommand, Clone, Copy)]
enum MigrateAction {
    /// Apply every pending migration (default)
    Up,
    /// List migrations and whether each is applied
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("trend_ingest=info,ingest=info,warn")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env().context("loading configuration")?;
    let db = Database::init(&cfg.database)?;

    let result = match cli.command {
        Commands::Migrate { action, dir } => run_migrate(&db, action.unwrap_or(MigrateAction::Up), &dir).await,
        Commands::Seed {
            force,
            reset,
            summary,
            dir,
        } => run_seed(&db, force, reset, summary, &dir).await,
        Commands::Check => run_check(&db).await,
        Commands::Ingest => run_ingest(&cfg, &db).await,
    };

    db.shutdown().await;
    result
}

async fn run_migrate(db: &Database, action: MigrateAction, dir: &std::path::Path) -> Result<()> {
    match action {
        MigrateAction::Up => {
            let applied = migrate::run_pending(db.pool(), dir).await?;
            if applied.is_empty() {
                println!("No pending migrations.");
            } else {
                for name in &applied {
                    println!("applied {name}");
                }
                println!("{} migration(s) applied.", applied.len());
            }
        }
        MigrateAction::Status => {
            for entry in migrate::status(db.pool(), dir).await? {
                let mark = if entry.applied { "applied" } else { "pending" };
                println!("{:<8} {}", mark, entry.file.filename);
            }
        }
    }
    Ok(())
}

async fn run_seed(
    db: &Database,
    force: bool,
    reset: bool,
    summary_only: bool,
    dir: &std::path::Path,
) -> Result<()> {
    if summary_only {
        print_summary(db).await?;
        return Ok(());
    }

    if reset {
        seed::reset(db.pool()).await?;
        println!("Cleared cards and counts.");
    }

    match seed::run_seeds(db.pool(), dir, force || reset).await? {
        SeedOutcome::Applied(files) => {
            println!("{} seed file(s) applied.", files.len());
            print_summary(db).await?;
        }
        SeedOutcome::SkippedExistingData => {
            println!("Database already has data. Use --force to seed anyway or --reset to start clean.");
        }
    }
    Ok(())
}

async fn print_summary(db: &Database) -> Result<()> {
    let s = seed::summary(db.pool()).await?;
    println!("Row counts:");
    for (table, n) in &s.table_counts {
        println!("  {table:<8} {n}");
    }
    if !s.sample_cards.is_empty() {
        println!("Sample cards:");
        for (title, category, velocity) in &s.sample_cards {
            println!("  {title} [{category}] velocity={velocity}");
        }
    }
    Ok(())
}

async fn run_check(db: &Database) -> Result<()> {
    let started = Instant::now();
    let row: Result<(String, String, String, chrono::DateTime<chrono::Utc>), sqlx::Error> =
        sqlx::query_as(
            "SELECT version(), current_user::text, current_database()::text, NOW()",
        )
        .fetch_one(db.pool())
        .await;

    match row {
        Ok((version, user, database, now)) => {
            println!("Connected in {} ms", started.elapsed().as_millis());
            println!("  version:  {version}");
            println!("  user:     {user}");
            println!("  database: {database}");
            println!("  time:     {}", to_iso(&now));
            Ok(())
        }
        Err(e) => {
            let msg = e.to_string();
            eprintln!("Connection failed after {} ms: {msg}", started.elapsed().as_millis());
            if let Some(hint) = failure_hint(&msg) {
                eprintln!("Hint: {hint}");
            }
            Err(e).context("database connectivity check failed")
        }
    }
}

fn failure_hint(msg: &str) -> Option<&'static str> {
    let m = msg.to_ascii_lowercase();
    if m.contains("password authentication failed") {
        Some("check the user and password in DATABASE_URL")
    } else if m.contains("does not exist") {
        Some("the database or role in DATABASE_URL does not exist")
    } else if m.contains("connection refused") {
        Some("nothing is listening at that host and port; is Postgres running?")
    } else if m.contains("timed out") {
        Some("the server did not answer in time; check network access and firewall rules")
    } else if m.contains("ssl") || m.contains("tls") {
        Some("try adding or removing sslmode=require in DATABASE_URL")
    } else {
        None
    }
}

async fn run_ingest(cfg: &AppConfig, db: &Database) -> Result<()> {
    let store: std::sync::Arc<dyn CardStore> = std::sync::Arc::new(db.clone());
    let ingestor = trend_ingest::build_ingestor(cfg, store)?;
    match ingestor.run().await {
        Ok(report) => {
            println!(
                "Window {} .. {} ({}m)",
                to_iso(&report.window.start),
                to_iso(&report.window.end),
                report.bucket_size_minutes
            );
            println!("  fetched:         {}", report.total_fetched);
            println!("  items written:   {}", report.items_written);
            println!("  metrics written: {}", report.metrics_written);
            println!("  skipped:         {}", report.skipped);
            println!("  failed:          {}", report.failed);
            Ok(())
        }
        Err(failure) => Err(anyhow::Error::new(failure.error)).with_context(|| {
            format!(
                "ingestion for window {} .. {} failed",
                to_iso(&failure.window.start),
                to_iso(&failure.window.end)
            )
        }),
    }
}

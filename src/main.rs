use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gamepulse::database_ops::catalog::CatalogStore;
use gamepulse::database_ops::db::{Db, MIGRATIONS_DIR};
use gamepulse::database_ops::memory_catalog::MemoryCatalog;
use gamepulse::database_ops::pg_catalog::PgCatalog;
use gamepulse::database_ops::search::{self, DEFAULT_LIMIT};
use gamepulse::logging::{init_tracing, DEFAULT_FILTER};
use gamepulse::normalization::CanonicalTitle;
use gamepulse::orchestrator::Pipeline;
use gamepulse::util::env::Settings;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "gamepulse", version, about = "Game price tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Search every configured store for a term and ingest what comes back
    Scrape {
        /// Search term, e.g. "witcher 3"
        term: String,
        /// Ingest into an in-memory catalog and print the report instead of writing to the database
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the canonical title and slug for each raw title
    Normalize {
        #[arg(required = true)]
        titles: Vec<String>,
    },
    /// Case-insensitive title search over the catalog
    Search {
        query: String,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: i64,
    },
    /// Apply pending SQL migrations
    Migrate,
    /// Print the price history of one listing, oldest first
    Prices { listing_id: Uuid },
}

async fn connect(settings: &Settings, auto_migrate: bool) -> Result<PgCatalog> {
    let url = settings.require_database_url()?;
    let db = Db::connect(url, settings.db_max_conns, auto_migrate)
        .await
        .context("Db::connect failed")?;
    Ok(PgCatalog::new(&db))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Normalize { titles } => {
            for raw in titles {
                let c = CanonicalTitle::new(&raw);
                println!("{raw}\t{}\t{}", c.title, c.slug);
            }
        }
        Commands::Scrape { term, dry_run } => {
            if term.trim().is_empty() {
                bail!("search term is empty");
            }
            let store: Arc<dyn CatalogStore> = if dry_run {
                info!("dry run: ingesting into an in-memory catalog");
                Arc::new(MemoryCatalog::new())
            } else {
                Arc::new(connect(&settings, settings.auto_migrate).await?)
            };
            let pipeline = Pipeline::from_settings(&settings, store)?;
            let report = pipeline.run(&term).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if dry_run {
                let games = pipeline.engine().store().count_games().await?;
                info!(games, "dry run catalog size");
            }
        }
        Commands::Search { query, limit } => {
            if search::query_too_short(&query) {
                bail!("search query too short (min {} chars)", search::MIN_QUERY_LEN);
            }
            let store = connect(&settings, false).await?;
            for hit in search::search_games(&store, &query, limit).await? {
                println!("{}\t{}", hit.id, hit.title);
            }
        }
        Commands::Migrate => {
            let url = settings.require_database_url()?;
            let db = Db::connect(url, 1, false).await?;
            let applied = db.run_migrations(Path::new(MIGRATIONS_DIR)).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Prices { listing_id } => {
            let store = connect(&settings, false).await?;
            let prices = store.prices_for(listing_id).await?;
            if prices.is_empty() {
                println!("no price history for listing {listing_id}");
            }
            for p in prices {
                println!(
                    "{}\t{} {}\t-{}%",
                    p.scraped_at.to_rfc3339(),
                    p.price,
                    p.currency,
                    p.discount_percent
                );
            }
        }
    }
    Ok(())
}

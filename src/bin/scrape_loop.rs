// Periodic scrape + ingest over SCRAPE_TERMS until Ctrl-C

use anyhow::{bail, Result};
use gamepulse::database_ops::db::Db;
use gamepulse::database_ops::pg_catalog::PgCatalog;
use gamepulse::logging::{init_tracing, DEFAULT_FILTER};
use gamepulse::orchestrator::Pipeline;
use gamepulse::util::env::Settings;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    let settings = Settings::from_env();
    if settings.scrape_terms.is_empty() {
        bail!("SCRAPE_TERMS is empty; nothing to scrape");
    }

    let db = Db::connect(
        settings.require_database_url()?,
        settings.db_max_conns,
        settings.auto_migrate,
    )
    .await?;
    let pipeline = Pipeline::from_settings(&settings, Arc::new(PgCatalog::new(&db)))?;

    let mut ticker = interval(settings.scrape_loop_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(
        terms = settings.scrape_terms.len(),
        every_secs = settings.scrape_loop_every.as_secs(),
        "scrape loop started"
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for term in &settings.scrape_terms {
                    let report = pipeline.run(term).await;
                    if report.ingest.failed > 0 || report.scrape.failed_stores() > 0 {
                        warn!(
                            term = %term,
                            failed_stores = report.scrape.failed_stores(),
                            failed_ingests = report.ingest.failed,
                            "pass finished with failures"
                        );
                    } else {
                        info!(term = %term, ingested = report.ingest.ingested, "pass finished");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("ctrl-c received; stopping scrape loop");
                break;
            }
        }
    }
    db.pool.close().await;
    Ok(())
}

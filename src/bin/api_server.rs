// HTTP API server binary: ingestion webhook, search, health and price queries

use anyhow::Result;
use gamepulse::api::ApiServer;
use gamepulse::database_ops::db::Db;
use gamepulse::database_ops::ingest::IngestionEngine;
use gamepulse::database_ops::pg_catalog::PgCatalog;
use gamepulse::logging::{init_tracing, DEFAULT_FILTER};
use gamepulse::util::env::Settings;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER)?;
    tracing::info!("initializing gamepulse API server");

    let settings = Settings::from_env();
    let server = ApiServer::from_settings(&settings);

    let db = Db::connect(
        settings.require_database_url()?,
        settings.db_max_conns,
        settings.auto_migrate,
    )
    .await?;
    tracing::info!("database connected");

    let engine = IngestionEngine::new(Arc::new(PgCatalog::new(&db)), settings.rates.clone());
    server.run(engine).await?;

    Ok(())
}

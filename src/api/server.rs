// API server implementation using actix-web

use crate::api::{middleware, routes};
use crate::database_ops::ingest::IngestionEngine;
use crate::util::env::Settings;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};

pub struct ApiServer {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ApiServer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            host: settings.api_host.clone(),
            port: settings.api_port,
            allowed_origins: settings.allowed_origins.clone(),
        }
    }

    /// Serve until the process is signalled.
    pub async fn run(self, engine: IngestionEngine) -> Result<()> {
        let bind_addr = format!("{}:{}", self.host, self.port);

        tracing::info!(
            host = %self.host,
            port = %self.port,
            origins = self.allowed_origins.len(),
            "starting gamepulse API server"
        );

        let engine_data = web::Data::new(engine);
        let allowed_origins = self.allowed_origins.clone();

        HttpServer::new(move || {
            let (logger, compress) = middleware::setup_middleware();
            let cors = middleware::setup_cors(&allowed_origins);

            App::new()
                .app_data(engine_data.clone())
                .wrap(logger)
                .wrap(compress)
                .wrap(cors)
                .configure(routes::configure_routes)
        })
        .bind(&bind_addr)
        .with_context(|| format!("Failed to bind to {}", bind_addr))?
        .run()
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}

//! Fan-out of one search term across every configured store, then fan-in
//! into the ingestion engine.
//!
//! Each store runs in its own task under its own timeout. A store that errors,
//! panics or times out contributes nothing and never delays or cancels the
//! others; its outcome is still reported so "no results" and "source error"
//! stay distinguishable.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::database_ops::catalog::CatalogStore;
use crate::database_ops::ingest::{IngestReport, IngestionEngine, ScrapedListing};
use crate::database_ops::storefront::{
    profiles_from_names, scrapers_for, HttpFetcher, ScrapeError, StoreScraper,
};
use crate::util::env::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TaskStatus {
    Listings(usize),
    NoResults,
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub store_id: i32,
    pub store_name: String,
    pub status: TaskStatus,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeOutcome {
    pub listings: Vec<ScrapedListing>,
    pub tasks: Vec<TaskOutcome>,
}

impl ScrapeOutcome {
    pub fn failed_stores(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed(_) | TaskStatus::TimedOut))
            .count()
    }

    /// Log one line per store.
    pub fn summary(&self) {
        for t in &self.tasks {
            let ms = t.elapsed.as_millis() as u64;
            match &t.status {
                TaskStatus::Listings(n) => {
                    info!(store = %t.store_name, listings = n, elapsed_ms = ms, "store done")
                }
                TaskStatus::NoResults => {
                    info!(store = %t.store_name, elapsed_ms = ms, "store returned no results")
                }
                TaskStatus::Failed(reason) => {
                    warn!(store = %t.store_name, error = %reason, elapsed_ms = ms, "store failed")
                }
                TaskStatus::TimedOut => {
                    warn!(store = %t.store_name, elapsed_ms = ms, "store timed out")
                }
            }
        }
    }
}

pub struct ScrapeOrchestrator {
    scrapers: Vec<Arc<dyn StoreScraper>>,
    timeout: Duration,
}

impl ScrapeOrchestrator {
    pub fn new(scrapers: Vec<Arc<dyn StoreScraper>>, timeout: Duration) -> Self {
        Self { scrapers, timeout }
    }

    pub fn store_count(&self) -> usize {
        self.scrapers.len()
    }

    /// Run every store concurrently for `term`. Completes when the slowest
    /// store finishes or hits the timeout; never fails as a whole.
    pub async fn run(&self, term: &str) -> ScrapeOutcome {
        let mut handles = Vec::with_capacity(self.scrapers.len());
        for scraper in &self.scrapers {
            let scraper = scraper.clone();
            let term = term.to_string();
            let limit = self.timeout;
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let res = tokio::time::timeout(limit, scraper.scrape(&term)).await;
                (res, started.elapsed())
            }));
        }

        let mut outcome = ScrapeOutcome::default();
        for (scraper, joined) in self.scrapers.iter().zip(join_all(handles).await) {
            let profile = scraper.profile();
            let (status, elapsed) = match joined {
                Ok((Ok(Ok(listings)), elapsed)) => {
                    let status = if listings.is_empty() {
                        TaskStatus::NoResults
                    } else {
                        TaskStatus::Listings(listings.len())
                    };
                    outcome.listings.extend(listings);
                    (status, elapsed)
                }
                Ok((Ok(Err(e)), elapsed)) => (TaskStatus::Failed(e.to_string()), elapsed),
                Ok((Err(_), elapsed)) => (TaskStatus::TimedOut, elapsed),
                Err(join_err) => (TaskStatus::Failed(join_err.to_string()), self.timeout),
            };
            outcome.tasks.push(TaskOutcome {
                store_id: profile.id,
                store_name: profile.name.clone(),
                status,
                elapsed,
            });
        }
        info!(
            term,
            stores = outcome.tasks.len(),
            listings = outcome.listings.len(),
            failed = outcome.failed_stores(),
            "scrape finished"
        );
        outcome
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub term: String,
    pub scrape: ScrapeOutcome,
    pub ingest: IngestReport,
}

/// Scrape then ingest. Every scraped record is handed to the engine as its
/// own task.
pub struct Pipeline {
    orchestrator: ScrapeOrchestrator,
    engine: IngestionEngine,
}

impl Pipeline {
    pub fn new(orchestrator: ScrapeOrchestrator, engine: IngestionEngine) -> Self {
        Self {
            orchestrator,
            engine,
        }
    }

    /// HTTP scrapers for the configured stores, feeding `store`.
    pub fn from_settings(
        settings: &Settings,
        store: Arc<dyn CatalogStore>,
    ) -> Result<Self, ScrapeError> {
        let fetcher = Arc::new(HttpFetcher::new(settings.scrape_timeout)?);
        let profiles = profiles_from_names(&settings.scrape_stores, settings.scrape_top_n);
        let scrapers = scrapers_for(profiles, fetcher, &settings.rates);
        Ok(Self::new(
            ScrapeOrchestrator::new(scrapers, settings.scrape_timeout),
            IngestionEngine::new(store, settings.rates.clone()),
        ))
    }

    pub fn engine(&self) -> &IngestionEngine {
        &self.engine
    }

    pub async fn run(&self, term: &str) -> PipelineReport {
        let scrape = self.orchestrator.run(term).await;
        scrape.summary();
        let ingest = self.engine.ingest_all(scrape.listings.clone()).await;
        PipelineReport {
            term: term.to_string(),
            scrape,
            ingest,
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use gamepulse::database_ops::catalog::CatalogStore;
use gamepulse::database_ops::ingest::{IngestionEngine, ScrapedListing};
use gamepulse::database_ops::memory_catalog::MemoryCatalog;
use gamepulse::database_ops::steam::provider as steam;
use gamepulse::database_ops::storefront::{
    HtmlStoreScraper, PageFetcher, ScrapeError, StoreProfile, StoreScraper,
};
use gamepulse::normalization::RateTable;
use gamepulse::orchestrator::{Pipeline, ScrapeOrchestrator, TaskStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Behaviour {
    Records { after: Duration, count: usize },
    Hang,
    Fail,
}

struct StubStore {
    profile: StoreProfile,
    behaviour: Behaviour,
}

impl StubStore {
    fn new(id: i32, behaviour: Behaviour) -> Arc<dyn StoreScraper> {
        let mut profile = steam::profile(3);
        profile.id = id;
        profile.name = format!("stub-{id}");
        Arc::new(Self { profile, behaviour })
    }
}

#[async_trait]
impl StoreScraper for StubStore {
    fn profile(&self) -> &StoreProfile {
        &self.profile
    }

    async fn scrape(&self, term: &str) -> Result<Vec<ScrapedListing>, ScrapeError> {
        match &self.behaviour {
            Behaviour::Records { after, count } => {
                tokio::time::sleep(*after).await;
                Ok((0..*count)
                    .map(|i| ScrapedListing {
                        store_id: self.profile.id,
                        store_name: self.profile.name.clone(),
                        raw_title: format!("{term} part {i}"),
                        remote_id: format!("{}{i}", self.profile.id),
                        url: format!("https://shop.example/{}/{i}", self.profile.id),
                        price_usd: BigDecimal::from(10 + i as i64),
                        currency: "USD".into(),
                        discount_percent: 0,
                    })
                    .collect())
            }
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            Behaviour::Fail => Err(ScrapeError::Fetch {
                url: "https://shop.example".into(),
                reason: "connection refused".into(),
            }),
        }
    }
}

#[tokio::test]
async fn hung_store_does_not_block_the_other() {
    let timeout = Duration::from_millis(500);
    let orchestrator = ScrapeOrchestrator::new(
        vec![
            StubStore::new(1, Behaviour::Hang),
            StubStore::new(
                2,
                Behaviour::Records {
                    after: Duration::from_millis(300),
                    count: 2,
                },
            ),
        ],
        timeout,
    );

    let started = Instant::now();
    let outcome = orchestrator.run("portal").await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.listings.len(), 2);
    assert!(outcome.listings.iter().all(|l| l.store_id == 2));
    assert_eq!(outcome.tasks[0].status, TaskStatus::TimedOut);
    assert_eq!(outcome.tasks[1].status, TaskStatus::Listings(2));
    // bounded by the slower task (the timeout), not timeout + 300ms
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
}

#[tokio::test]
async fn failing_store_is_isolated() {
    let orchestrator = ScrapeOrchestrator::new(
        vec![
            StubStore::new(1, Behaviour::Fail),
            StubStore::new(
                2,
                Behaviour::Records {
                    after: Duration::ZERO,
                    count: 2,
                },
            ),
        ],
        Duration::from_secs(5),
    );
    let outcome = orchestrator.run("portal").await;
    assert_eq!(outcome.listings.len(), 2);
    assert!(matches!(&outcome.tasks[0].status, TaskStatus::Failed(r) if r.contains("connection refused")));
    assert_eq!(outcome.failed_stores(), 1);
}

struct FixedPage(String);

#[async_trait]
impl PageFetcher for FixedPage {
    async fn fetch(&self, _url: &str) -> Result<String, ScrapeError> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn pipeline_scrapes_then_ingests() {
    let page = r#"
        <a class="search_result_row" href="https://store.steampowered.com/app/620/Portal_2/">
            <span class="title">Portal 2</span>
            <div class="discount_pct">-90%</div>
            <div class="discount_final_price">$0.99</div>
        </a>
        <a class="search_result_row" href="https://store.steampowered.com/app/400/Portal/">
            <span class="title">Portal</span>
            <div class="discount_final_price">$9.99</div>
        </a>"#;
    let rates = RateTable::default();
    let scraper: Arc<dyn StoreScraper> = Arc::new(HtmlStoreScraper::new(
        steam::profile(5),
        Arc::new(FixedPage(page.to_string())),
        rates.clone(),
    ));
    let cat = Arc::new(MemoryCatalog::new());
    let pipeline = Pipeline::new(
        ScrapeOrchestrator::new(
            vec![scraper, StubStore::new(2, Behaviour::Fail)],
            Duration::from_secs(5),
        ),
        IngestionEngine::new(cat.clone(), rates),
    );

    let report = pipeline.run("portal").await;
    assert_eq!(report.scrape.listings.len(), 2);
    assert_eq!(report.ingest.ingested, 2);
    assert_eq!(report.ingest.failed, 0);
    assert_eq!(cat.count_games().await.unwrap(), 2);

    let hits = cat.search_games("portal 2", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    let listing = &cat.listings_for_game(hits[0].id).await.unwrap()[0];
    assert_eq!(listing.remote_id, "620");
    let latest = cat.latest_price_for(listing.id).await.unwrap().unwrap();
    assert_eq!(latest.discount_percent, 90);
}

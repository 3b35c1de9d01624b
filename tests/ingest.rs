use async_trait::async_trait;
use bigdecimal::BigDecimal;
use gamepulse::database_ops::catalog::{
    CatalogError, CatalogStore, Game, GameHit, Listing, NewGame, NewListing, NewPricePoint,
    PricePoint, Store,
};
use gamepulse::database_ops::ingest::{
    IngestError, IngestRequest, IngestionEngine, ScrapedListing, CONFLICT_REREADS,
    PLACEHOLDER_BASE_URL,
};
use gamepulse::database_ops::memory_catalog::MemoryCatalog;
use gamepulse::normalization::RateTable;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

fn listing(raw_title: &str, remote_id: &str, price: &str) -> ScrapedListing {
    ScrapedListing {
        store_id: 1,
        store_name: "Steam".into(),
        raw_title: raw_title.into(),
        remote_id: remote_id.into(),
        url: format!("https://store.steampowered.com/app/{remote_id}/"),
        price_usd: BigDecimal::from_str(price).unwrap(),
        currency: "USD".into(),
        discount_percent: 0,
    }
}

fn engine(cat: Arc<MemoryCatalog>) -> IngestionEngine {
    IngestionEngine::new(cat, RateTable::default())
}

#[tokio::test]
async fn equivalent_titles_share_one_game() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());

    let a = engine
        .ingest(&listing("The Witcher 3: Wild Hunt", "292030", "39.99"))
        .await
        .unwrap();
    let b = engine
        .ingest(&listing(
            "THE WITCHER® 3: Wild Hunt - Game of the Year Edition",
            "499450",
            "49.99",
        ))
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(a.slug, "the-witcher-3-wild-hunt");
    assert_eq!(cat.count_games().await.unwrap(), 1);
    assert_eq!(cat.listing_count(), 2);
    assert_eq!(cat.store_count(), 1);
}

#[tokio::test]
async fn repeated_listing_appends_history() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());

    let mut game = None;
    for price in ["59.99", "29.99", "19.99", "44.99"] {
        game = Some(engine.ingest(&listing("Elden Ring", "1245620", price)).await.unwrap());
    }
    let game = game.unwrap();

    let listings = cat.listings_for_game(game.id).await.unwrap();
    assert_eq!(listings.len(), 1);
    let history = cat.prices_for(listings[0].id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|p| p.currency == "USD"));

    let latest = cat.latest_price_for(listings[0].id).await.unwrap().unwrap();
    assert_eq!(latest.price, BigDecimal::from_str("44.99").unwrap());
    assert_eq!(latest.scraped_at, history.iter().map(|p| p.scraped_at).max().unwrap());
}

#[tokio::test]
async fn same_price_is_still_recorded() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());
    engine.ingest(&listing("Celeste", "504230", "19.99")).await.unwrap();
    engine.ingest(&listing("Celeste", "504230", "19.99")).await.unwrap();
    assert_eq!(cat.listing_count(), 1);
    assert_eq!(cat.price_count(), 2);
}

#[tokio::test]
async fn prices_rounded_and_discount_clamped() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());
    let mut record = listing("Hades", "1145360", "12.345");
    record.discount_percent = 250;
    let game = engine.ingest(&record).await.unwrap();

    let listing = &cat.listings_for_game(game.id).await.unwrap()[0];
    let point = cat.latest_price_for(listing.id).await.unwrap().unwrap();
    assert_eq!(point.price, BigDecimal::from_str("12.35").unwrap());
    assert_eq!(point.discount_percent, 100);
}

#[tokio::test]
async fn empty_canonical_title_is_rejected() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());
    let err = engine
        .ingest(&listing("Deluxe Edition (PC)", "1", "9.99"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert_eq!(cat.store_count(), 0);
    assert_eq!(cat.listing_count(), 0);
}

#[tokio::test]
async fn unreachable_storage_surfaces() {
    let cat = Arc::new(MemoryCatalog::new());
    cat.set_offline(true);
    let engine = engine(cat.clone());
    let err = engine
        .ingest(&listing("Hollow Knight", "367520", "14.99"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Storage(CatalogError::Unavailable(_))
    ));
}

#[tokio::test]
async fn batch_failures_do_not_cancel_siblings() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());
    let mut bad = listing("Portal 2", "620", "9.99");
    bad.price_usd = BigDecimal::from(-1);
    let report = engine
        .ingest_all(vec![
            listing("Portal 2", "620", "9.99"),
            bad,
            listing("Half-Life 2", "220", "9.99"),
        ])
        .await;
    assert_eq!(report.ingested, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(cat.count_games().await.unwrap(), 2);
}

#[tokio::test]
async fn oversized_request_writes_nothing() {
    let cat = Arc::new(MemoryCatalog::new());
    let engine = engine(cat.clone());
    let request: IngestRequest = serde_json::from_value(serde_json::json!({
        "store_id": 3,
        "store_name": "Epic",
        "raw_title": "Long ".repeat(62),
        "remote_id": "fn-1",
        "url": "https://store.epicgames.com/p/fn",
        "price": 9.99
    }))
    .unwrap();
    let err = engine.ingest_request(request).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
    assert!(cat.find_store(3).await.unwrap().is_none());

    let mut pricey = listing("Star Citizen", "sc", "0");
    pricey.price_usd = BigDecimal::from(123_456_789);
    assert!(matches!(
        engine.ingest(&pricey).await,
        Err(IngestError::Validation(_))
    ));
    assert_eq!(cat.store_count(), 0);
}

#[tokio::test]
async fn new_store_gets_placeholder_base_url() {
    let cat = Arc::new(MemoryCatalog::new());
    engine(cat.clone())
        .ingest(&listing("Celeste", "504230", "19.99"))
        .await
        .unwrap();
    let store = cat.find_store(1).await.unwrap().unwrap();
    assert_eq!(store.name, "Steam");
    assert_eq!(store.base_url, PLACEHOLDER_BASE_URL);
}

/// Which lookup the racing catalog holds at its barrier.
#[derive(Clone, Copy, PartialEq)]
enum Held {
    Store,
    Slug,
    Listing,
}

/// Holds the first two lookups of one kind until both have missed, so both
/// writers go on to insert the same new row.
struct RacingCatalog {
    inner: MemoryCatalog,
    held: Held,
    barrier: Barrier,
    held_reads: AtomicUsize,
    conflicts: AtomicUsize,
}

impl RacingCatalog {
    fn new(held: Held) -> Self {
        Self {
            inner: MemoryCatalog::new(),
            held,
            barrier: Barrier::new(2),
            held_reads: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    async fn hold(&self, kind: Held) {
        if kind == self.held && self.held_reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
    }

    fn count<T>(&self, kind: Held, res: Result<T, CatalogError>) -> Result<T, CatalogError> {
        if kind == self.held && matches!(&res, Err(e) if e.is_conflict()) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        res
    }
}

#[async_trait]
impl CatalogStore for RacingCatalog {
    async fn find_store(&self, id: i32) -> Result<Option<Store>, CatalogError> {
        let found = self.inner.find_store(id).await;
        self.hold(Held::Store).await;
        found
    }
    async fn insert_store(&self, store: &Store) -> Result<Store, CatalogError> {
        self.count(Held::Store, self.inner.insert_store(store).await)
    }
    async fn find_game(&self, id: Uuid) -> Result<Option<Game>, CatalogError> {
        self.inner.find_game(id).await
    }
    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>, CatalogError> {
        let found = self.inner.find_game_by_slug(slug).await;
        self.hold(Held::Slug).await;
        found
    }
    async fn insert_game(&self, game: &NewGame) -> Result<Game, CatalogError> {
        self.count(Held::Slug, self.inner.insert_game(game).await)
    }
    async fn find_listing(
        &self,
        store_id: i32,
        remote_id: &str,
    ) -> Result<Option<Listing>, CatalogError> {
        let found = self.inner.find_listing(store_id, remote_id).await;
        self.hold(Held::Listing).await;
        found
    }
    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing, CatalogError> {
        self.count(Held::Listing, self.inner.insert_listing(listing).await)
    }
    async fn listings_for_game(&self, game_id: Uuid) -> Result<Vec<Listing>, CatalogError> {
        self.inner.listings_for_game(game_id).await
    }
    async fn append_price(&self, point: &NewPricePoint) -> Result<PricePoint, CatalogError> {
        self.inner.append_price(point).await
    }
    async fn prices_for(&self, listing_id: Uuid) -> Result<Vec<PricePoint>, CatalogError> {
        self.inner.prices_for(listing_id).await
    }
    async fn latest_price_for(&self, listing_id: Uuid) -> Result<Option<PricePoint>, CatalogError> {
        self.inner.latest_price_for(listing_id).await
    }
    async fn search_games(&self, query: &str, limit: i64) -> Result<Vec<GameHit>, CatalogError> {
        self.inner.search_games(query, limit).await
    }
    async fn count_games(&self) -> Result<i64, CatalogError> {
        self.inner.count_games().await
    }
    async fn ping(&self) -> Result<(), CatalogError> {
        self.inner.ping().await
    }
}

/// Two writers ingest the same listing at once; returns both results.
async fn race(cat: Arc<RacingCatalog>) -> (Game, Game) {
    let engine = IngestionEngine::new(cat, RateTable::default());
    let e1 = engine.clone();
    let e2 = engine.clone();
    let t1 = tokio::spawn(async move { e1.ingest(&listing("Stardew Valley", "413150", "14.99")).await });
    let t2 = tokio::spawn(async move {
        e2.ingest(&listing("Stardew Valley™", "413150", "13.99")).await
    });
    let g1 = t1.await.unwrap().expect("first writer");
    let g2 = t2.await.unwrap().expect("second writer");
    (g1, g2)
}

fn assert_single_rows(cat: &RacingCatalog) {
    assert_eq!(cat.conflicts.load(Ordering::SeqCst), 1);
    assert_eq!(cat.inner.store_count(), 1);
    assert_eq!(cat.inner.listing_count(), 1);
    assert_eq!(cat.inner.price_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_new_slug_resolves_to_one_game() {
    let cat = Arc::new(RacingCatalog::new(Held::Slug));
    let (g1, g2) = race(cat.clone()).await;
    assert_eq!(g1.id, g2.id);
    assert_eq!(cat.inner.count_games().await.unwrap(), 1);
    assert_single_rows(&cat);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_new_listing_resolves_to_one_listing() {
    let cat = Arc::new(RacingCatalog::new(Held::Listing));
    let (g1, g2) = race(cat.clone()).await;
    assert_eq!(g1.id, g2.id);
    assert_single_rows(&cat);

    let listings = cat.inner.listings_for_game(g1.id).await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(cat.inner.prices_for(listings[0].id).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_new_store_resolves_to_one_store() {
    let cat = Arc::new(RacingCatalog::new(Held::Store));
    let (g1, g2) = race(cat.clone()).await;
    assert_eq!(g1.id, g2.id);
    assert_single_rows(&cat);
}

/// Every store insert conflicts yet the row never becomes readable.
struct PhantomStoreCatalog {
    inner: MemoryCatalog,
    inserts: AtomicUsize,
}

#[async_trait]
impl CatalogStore for PhantomStoreCatalog {
    async fn find_store(&self, _id: i32) -> Result<Option<Store>, CatalogError> {
        Ok(None)
    }
    async fn insert_store(&self, _store: &Store) -> Result<Store, CatalogError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(CatalogError::Conflict {
            constraint: "stores_pkey".into(),
        })
    }
    async fn find_game(&self, id: Uuid) -> Result<Option<Game>, CatalogError> {
        self.inner.find_game(id).await
    }
    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>, CatalogError> {
        self.inner.find_game_by_slug(slug).await
    }
    async fn insert_game(&self, game: &NewGame) -> Result<Game, CatalogError> {
        self.inner.insert_game(game).await
    }
    async fn find_listing(
        &self,
        store_id: i32,
        remote_id: &str,
    ) -> Result<Option<Listing>, CatalogError> {
        self.inner.find_listing(store_id, remote_id).await
    }
    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing, CatalogError> {
        self.inner.insert_listing(listing).await
    }
    async fn listings_for_game(&self, game_id: Uuid) -> Result<Vec<Listing>, CatalogError> {
        self.inner.listings_for_game(game_id).await
    }
    async fn append_price(&self, point: &NewPricePoint) -> Result<PricePoint, CatalogError> {
        self.inner.append_price(point).await
    }
    async fn prices_for(&self, listing_id: Uuid) -> Result<Vec<PricePoint>, CatalogError> {
        self.inner.prices_for(listing_id).await
    }
    async fn latest_price_for(&self, listing_id: Uuid) -> Result<Option<PricePoint>, CatalogError> {
        self.inner.latest_price_for(listing_id).await
    }
    async fn search_games(&self, query: &str, limit: i64) -> Result<Vec<GameHit>, CatalogError> {
        self.inner.search_games(query, limit).await
    }
    async fn count_games(&self) -> Result<i64, CatalogError> {
        self.inner.count_games().await
    }
    async fn ping(&self) -> Result<(), CatalogError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn endless_conflicts_give_up_as_unavailable() {
    let cat = Arc::new(PhantomStoreCatalog {
        inner: MemoryCatalog::new(),
        inserts: AtomicUsize::new(0),
    });
    let engine = IngestionEngine::new(cat.clone(), RateTable::default());
    let err = engine
        .ingest(&listing("Hollow Knight", "367520", "14.99"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Storage(CatalogError::Unavailable(ref m)) if m.contains("still conflicting")
    ));
    assert_eq!(cat.inserts.load(Ordering::SeqCst), CONFLICT_REREADS);
    assert_eq!(cat.inner.count_games().await.unwrap(), 0);
}

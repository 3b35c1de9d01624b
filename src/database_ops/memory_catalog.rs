use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::database_ops::catalog::{
    CatalogError, CatalogStore, Game, GameHit, Listing, NewGame, NewListing, NewPricePoint,
    PricePoint, Store,
};

/// In-process catalog with the same unique indexes and foreign keys as the
/// Postgres schema. Backs dry runs and tests.
#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

#[derive(Default)]
struct Inner {
    stores: BTreeMap<i32, Store>,
    games: HashMap<Uuid, Game>,
    games_by_slug: HashMap<String, Uuid>,
    listings: HashMap<Uuid, Listing>,
    listings_by_remote: HashMap<(i32, String), Uuid>,
    prices: Vec<PricePoint>,
    last_scraped_at: Option<DateTime<Utc>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection: every call fails with `Unavailable` until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn store_count(&self) -> usize {
        self.lock().map(|g| g.stores.len()).unwrap_or(0)
    }

    pub fn listing_count(&self) -> usize {
        self.lock().map(|g| g.listings.len()).unwrap_or(0)
    }

    pub fn price_count(&self) -> usize {
        self.lock().map(|g| g.prices.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, CatalogError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("memory catalog offline".into()));
        }
        self.inner
            .lock()
            .map_err(|_| CatalogError::Unavailable("memory catalog lock poisoned".into()))
    }
}

impl Inner {
    /// Strictly increasing timestamps so "latest by scraped_at" is never a tie.
    fn next_scraped_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_scraped_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_scraped_at = Some(at);
        at
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_store(&self, id: i32) -> Result<Option<Store>, CatalogError> {
        Ok(self.lock()?.stores.get(&id).cloned())
    }

    async fn insert_store(&self, store: &Store) -> Result<Store, CatalogError> {
        let mut g = self.lock()?;
        if g.stores.contains_key(&store.id) {
            return Err(CatalogError::conflict("stores_pkey"));
        }
        g.stores.insert(store.id, store.clone());
        Ok(store.clone())
    }

    async fn find_game(&self, id: Uuid) -> Result<Option<Game>, CatalogError> {
        Ok(self.lock()?.games.get(&id).cloned())
    }

    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>, CatalogError> {
        let g = self.lock()?;
        Ok(g.games_by_slug.get(slug).and_then(|id| g.games.get(id)).cloned())
    }

    async fn insert_game(&self, game: &NewGame) -> Result<Game, CatalogError> {
        let mut g = self.lock()?;
        if g.games_by_slug.contains_key(&game.slug) {
            return Err(CatalogError::conflict("ux_games_slug"));
        }
        if g.games.contains_key(&game.id) {
            return Err(CatalogError::conflict("games_pkey"));
        }
        let row = Game {
            id: game.id,
            title: game.title.clone(),
            slug: game.slug.clone(),
            created_at: Utc::now(),
        };
        g.games_by_slug.insert(row.slug.clone(), row.id);
        g.games.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_listing(
        &self,
        store_id: i32,
        remote_id: &str,
    ) -> Result<Option<Listing>, CatalogError> {
        let g = self.lock()?;
        Ok(g
            .listings_by_remote
            .get(&(store_id, remote_id.to_string()))
            .and_then(|id| g.listings.get(id))
            .cloned())
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing, CatalogError> {
        let mut g = self.lock()?;
        if !g.games.contains_key(&listing.game_id) {
            return Err(CatalogError::Integrity(format!(
                "game {} does not exist",
                listing.game_id
            )));
        }
        if !g.stores.contains_key(&listing.store_id) {
            return Err(CatalogError::Integrity(format!(
                "store {} does not exist",
                listing.store_id
            )));
        }
        let key = (listing.store_id, listing.remote_id.clone());
        if g.listings_by_remote.contains_key(&key) {
            return Err(CatalogError::conflict("ix_store_remote_id"));
        }
        if g.listings.contains_key(&listing.id) {
            return Err(CatalogError::conflict("game_listings_pkey"));
        }
        g.listings_by_remote.insert(key, listing.id);
        g.listings.insert(listing.id, listing.clone());
        Ok(listing.clone())
    }

    async fn listings_for_game(&self, game_id: Uuid) -> Result<Vec<Listing>, CatalogError> {
        let g = self.lock()?;
        let mut out: Vec<Listing> = g
            .listings
            .values()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.store_id, &a.remote_id).cmp(&(b.store_id, &b.remote_id)));
        Ok(out)
    }

    async fn append_price(&self, point: &NewPricePoint) -> Result<PricePoint, CatalogError> {
        let mut g = self.lock()?;
        if !g.listings.contains_key(&point.listing_id) {
            return Err(CatalogError::Integrity(format!(
                "listing {} does not exist",
                point.listing_id
            )));
        }
        let row = PricePoint {
            id: g.prices.len() as i64 + 1,
            listing_id: point.listing_id,
            price: point.price.clone(),
            currency: point.currency.clone(),
            discount_percent: point.discount_percent,
            scraped_at: g.next_scraped_at(),
        };
        g.prices.push(row.clone());
        Ok(row)
    }

    async fn prices_for(&self, listing_id: Uuid) -> Result<Vec<PricePoint>, CatalogError> {
        let g = self.lock()?;
        let mut out: Vec<PricePoint> = g
            .prices
            .iter()
            .filter(|p| p.listing_id == listing_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| (p.scraped_at, p.id));
        Ok(out)
    }

    async fn latest_price_for(&self, listing_id: Uuid) -> Result<Option<PricePoint>, CatalogError> {
        let g = self.lock()?;
        Ok(g
            .prices
            .iter()
            .filter(|p| p.listing_id == listing_id)
            .max_by_key(|p| (p.scraped_at, p.id))
            .cloned())
    }

    async fn search_games(&self, query: &str, limit: i64) -> Result<Vec<GameHit>, CatalogError> {
        let needle = query.to_lowercase();
        let g = self.lock()?;
        let mut hits: Vec<GameHit> = g
            .games
            .values()
            .filter(|game| game.title.to_lowercase().contains(&needle))
            .map(|game| GameHit {
                id: game.id,
                title: game.title.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.title.cmp(&b.title));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn count_games(&self) -> Result<i64, CatalogError> {
        Ok(self.lock()?.games.len() as i64)
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        self.lock().map(|_| ())
    }
}

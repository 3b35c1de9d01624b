//! Find-or-create ingestion of scraped listings into the catalog.
//!
//! Steps per record: store → game (by slug) → listing (by store + remote id)
//! → one new price row. The unique indexes are the only concurrency control;
//! an insert that loses a race comes back as `CatalogError::Conflict` and is
//! resolved by reading the winner's row.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::database_ops::catalog::{
    CatalogError, CatalogStore, Game, ListingStatus, NewGame, NewListing, NewPricePoint, Store,
};
use crate::normalization::currency::{is_currency_code, RateTable};
use crate::normalization::title::CanonicalTitle;

/// Base URL recorded for a store first seen through ingestion.
pub const PLACEHOLDER_BASE_URL: &str = "https://example.com";

/// How many times a find step is retried after losing an insert race.
pub const CONFLICT_REREADS: usize = 3;

pub const MAX_DISCOUNT_PERCENT: i32 = 100;

// Column widths in migrations/0001_catalog.sql.
pub const MAX_STORE_NAME_LEN: usize = 50;
pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_REMOTE_ID_LEN: usize = 100;
pub const MAX_URL_LEN: usize = 500;
/// NUMERIC(10,2) holds at most eight integer digits.
pub const PRICE_CEILING: i64 = 100_000_000;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingestion payload: {0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] CatalogError),
}

/// A listing as produced by a store scraper: price already converted to USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub store_id: i32,
    pub store_name: String,
    pub raw_title: String,
    pub remote_id: String,
    pub url: String,
    pub price_usd: BigDecimal,
    pub currency: String,
    pub discount_percent: i32,
}

impl ScrapedListing {
    fn validate(&self) -> Result<(), IngestError> {
        if self.remote_id.trim().is_empty() {
            return Err(IngestError::Validation("remote_id is empty".into()));
        }
        check_widths(&self.store_name, &self.raw_title, &self.remote_id, &self.url)?;
        if self.price_usd < BigDecimal::zero() {
            return Err(IngestError::Validation("price must be >= 0".into()));
        }
        let stored = self.price_usd.with_scale_round(2, RoundingMode::HalfUp);
        if stored >= BigDecimal::from(PRICE_CEILING) {
            return Err(IngestError::Validation(format!(
                "price {} USD exceeds {PRICE_CEILING}",
                self.price_usd
            )));
        }
        Ok(())
    }
}

/// Reject text that would not fit its column, before anything is written.
fn check_widths(
    store_name: &str,
    raw_title: &str,
    remote_id: &str,
    url: &str,
) -> Result<(), IngestError> {
    for (field, value, max) in [
        ("store_name", store_name.trim(), MAX_STORE_NAME_LEN),
        ("raw_title", raw_title, MAX_TITLE_LEN),
        ("remote_id", remote_id.trim(), MAX_REMOTE_ID_LEN),
        ("url", url, MAX_URL_LEN),
    ] {
        let len = value.chars().count();
        if len > max {
            return Err(IngestError::Validation(format!(
                "{field} is {len} chars, max {max}"
            )));
        }
    }
    Ok(())
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Payload accepted at the ingestion boundary (webhook or CLI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub store_id: i32,
    pub store_name: String,
    pub raw_title: String,
    pub remote_id: String,
    pub url: String,
    pub price: BigDecimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub discount_percent: i32,
}

impl IngestRequest {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.store_name.trim().is_empty() {
            return Err(IngestError::Validation("store_name is empty".into()));
        }
        if self.raw_title.trim().is_empty() {
            return Err(IngestError::Validation("raw_title is empty".into()));
        }
        if self.remote_id.trim().is_empty() {
            return Err(IngestError::Validation("remote_id is empty".into()));
        }
        check_widths(&self.store_name, &self.raw_title, &self.remote_id, &self.url)?;
        match Url::parse(&self.url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") && u.host().is_some() => {}
            _ => {
                return Err(IngestError::Validation(format!(
                    "url {:?} is not a valid http(s) URL",
                    self.url
                )))
            }
        }
        if self.price < BigDecimal::zero() {
            return Err(IngestError::Validation("price must be >= 0".into()));
        }
        if !is_currency_code(&self.currency) {
            return Err(IngestError::Validation(format!(
                "currency {:?} is not a 3-letter code",
                self.currency
            )));
        }
        Ok(())
    }

    /// Convert into a USD-denominated record.
    pub fn into_listing(self, rates: &RateTable) -> ScrapedListing {
        let price_usd = rates.to_usd(&self.price, &self.currency);
        ScrapedListing {
            store_id: self.store_id,
            store_name: self.store_name.trim().to_string(),
            raw_title: self.raw_title,
            remote_id: self.remote_id.trim().to_string(),
            url: self.url,
            price_usd,
            currency: "USD".to_string(),
            discount_percent: self.discount_percent,
        }
    }
}

/// Response body for a successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAck {
    pub status: String,
    pub message: String,
    pub normalized_title: String,
    pub game_id: Uuid,
}

impl From<&Game> for IngestAck {
    fn from(game: &Game) -> Self {
        Self {
            status: "success".into(),
            message: "Game and price successfully processed".into(),
            normalized_title: game.title.clone(),
            game_id: game.id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct IngestionEngine {
    store: Arc<dyn CatalogStore>,
    rates: RateTable,
}

impl IngestionEngine {
    pub fn new(store: Arc<dyn CatalogStore>, rates: RateTable) -> Self {
        Self { store, rates }
    }

    pub fn store(&self) -> &dyn CatalogStore {
        self.store.as_ref()
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Validate, convert and ingest a boundary payload.
    pub async fn ingest_request(&self, request: IngestRequest) -> Result<IngestAck, IngestError> {
        request.validate()?;
        let record = request.into_listing(&self.rates);
        let game = self.ingest(&record).await?;
        Ok(IngestAck::from(&game))
    }

    /// Resolve store, game and listing for `record` and append one price row.
    /// Returns the game the listing belongs to.
    #[instrument(skip(self, record), fields(store_id = record.store_id, remote_id = %record.remote_id))]
    pub async fn ingest(&self, record: &ScrapedListing) -> Result<Game, IngestError> {
        record.validate()?;
        let canonical = CanonicalTitle::new(&record.raw_title);
        if canonical.is_empty() {
            return Err(IngestError::Validation(format!(
                "title {:?} normalizes to nothing",
                record.raw_title
            )));
        }
        if canonical.title.chars().count() > MAX_TITLE_LEN {
            return Err(IngestError::Validation(format!(
                "canonical title is wider than {MAX_TITLE_LEN} chars"
            )));
        }
        let store: &dyn CatalogStore = self.store.as_ref();

        let new_store = Store {
            id: record.store_id,
            name: record.store_name.clone(),
            base_url: PLACEHOLDER_BASE_URL.to_string(),
        };
        let store_key = record.store_id.to_string();
        let store_id = record.store_id;
        let new_store = &new_store;
        resolve(
            "store",
            &store_key,
            move || store.find_store(store_id),
            move || store.insert_store(new_store),
        )
        .await?;

        let new_game = NewGame {
            id: Uuid::new_v4(),
            title: canonical.title.clone(),
            slug: canonical.slug.clone(),
        };
        let slug = canonical.slug.as_str();
        let new_game = &new_game;
        let game = resolve(
            "game",
            slug,
            move || store.find_game_by_slug(slug),
            move || store.insert_game(new_game),
        )
        .await?;

        let new_listing = NewListing {
            id: Uuid::new_v4(),
            game_id: game.id,
            store_id: record.store_id,
            remote_id: record.remote_id.clone(),
            listing_title: record.raw_title.clone(),
            url: record.url.clone(),
            status: ListingStatus::Active,
        };
        let remote_id = record.remote_id.as_str();
        let new_listing = &new_listing;
        let listing = resolve(
            "listing",
            remote_id,
            move || store.find_listing(store_id, remote_id),
            move || store.insert_listing(new_listing),
        )
        .await?;

        let point = store
            .append_price(&NewPricePoint {
                listing_id: listing.id,
                price: record.price_usd.with_scale_round(2, RoundingMode::HalfUp),
                currency: "USD".to_string(),
                discount_percent: clamp_discount(record.discount_percent),
            })
            .await?;

        debug!(
            game_id = %game.id,
            slug = %game.slug,
            listing_id = %listing.id,
            price = %point.price,
            "price recorded"
        );
        Ok(game)
    }

    /// Ingest every record concurrently, one task per record. Failures are
    /// counted and logged; they never cancel sibling records.
    pub async fn ingest_all(&self, records: Vec<ScrapedListing>) -> IngestReport {
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            let engine = self.clone();
            tasks.push(tokio::spawn(async move {
                let res = engine.ingest(&record).await;
                if let Err(e) = &res {
                    warn!(store = %record.store_name, remote_id = %record.remote_id, error = %e, "ingestion failed");
                }
                res.map(|game| game.id)
            }));
        }

        let mut report = IngestReport::default();
        for r in join_all(tasks).await {
            match r {
                Ok(Ok(_)) => report.ingested += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    report.errors.push(e.to_string());
                }
                Err(join_err) => {
                    report.failed += 1;
                    report.errors.push(join_err.to_string());
                }
            }
        }
        info!(ingested = report.ingested, failed = report.failed, "ingestion batch finished");
        report
    }
}

/// Find, else create; on a unique conflict re-run the find, since the row the
/// conflict points at now exists.
async fn resolve<T, Find, FindFut, Create, CreateFut>(
    entity: &'static str,
    key: &str,
    find: Find,
    create: Create,
) -> Result<T, IngestError>
where
    Find: Fn() -> FindFut,
    FindFut: Future<Output = Result<Option<T>, CatalogError>>,
    Create: Fn() -> CreateFut,
    CreateFut: Future<Output = Result<T, CatalogError>>,
{
    for attempt in 1..=CONFLICT_REREADS {
        if let Some(found) = find().await? {
            return Ok(found);
        }
        match create().await {
            Ok(created) => {
                debug!(entity, key, "created");
                return Ok(created);
            }
            Err(CatalogError::Conflict { constraint }) => {
                debug!(entity, key, %constraint, attempt, "lost insert race; re-reading");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(CatalogError::Unavailable(format!(
        "{entity} {key} still conflicting after {CONFLICT_REREADS} re-reads"
    ))
    .into())
}

/// Discounts are stored within 0..=100; anything else is clamped and logged.
pub fn clamp_discount(percent: i32) -> i32 {
    let clamped = percent.clamp(0, MAX_DISCOUNT_PERCENT);
    if clamped != percent {
        warn!(discount = percent, stored = clamped, "discount out of range; clamped");
    }
    clamped
}

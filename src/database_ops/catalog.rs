//! Storage boundary for the catalog: entity types and the `CatalogStore` trait.
//!
//! Writes are insert-or-conflict: a unique index violation comes back as
//! `CatalogError::Conflict` and the caller decides how to recover. Reads are
//! always fresh queries; no entity holds a live collection of its children.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A unique index rejected the insert; another writer got there first.
    #[error("unique constraint {constraint} violated")]
    Conflict { constraint: String },
    /// Foreign key or check constraint failure.
    #[error("integrity violation: {0}")]
    Integrity(String),
    /// The store could not be reached or the statement failed for IO reasons.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl CatalogError {
    pub fn conflict(constraint: impl Into<String>) -> Self {
        Self::Conflict {
            constraint: constraint.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// One storefront. Ids are small fixed integers (1 = Steam, 2 = GOG).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: i32,
    pub name: String,
    pub base_url: String,
}

/// Canonical title shared by every store's listing of the same game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    /// Link works; price is monitored.
    Active,
    /// Store returned 404 for the listing.
    Broken,
    /// Awaiting first scrape or title review.
    Pending,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Broken => "broken",
            ListingStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ListingStatus::Active),
            "broken" => Ok(ListingStatus::Broken),
            "pending" => Ok(ListingStatus::Pending),
            other => Err(CatalogError::Integrity(format!("unknown listing status {other:?}"))),
        }
    }
}

/// One store's offering of a game, keyed by (store_id, remote_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub game_id: Uuid,
    pub store_id: i32,
    pub remote_id: String,
    pub listing_title: String,
    pub url: String,
    pub status: ListingStatus,
}

pub type NewListing = Listing;

/// A row of a listing's append-only price history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: i64,
    pub listing_id: Uuid,
    pub price: BigDecimal,
    pub currency: String,
    pub discount_percent: i32,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPricePoint {
    pub listing_id: Uuid,
    pub price: BigDecimal,
    pub currency: String,
    pub discount_percent: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameHit {
    pub id: Uuid,
    pub title: String,
}

#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_store(&self, id: i32) -> Result<Option<Store>, CatalogError>;
    async fn insert_store(&self, store: &Store) -> Result<Store, CatalogError>;

    async fn find_game(&self, id: Uuid) -> Result<Option<Game>, CatalogError>;
    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>, CatalogError>;
    async fn insert_game(&self, game: &NewGame) -> Result<Game, CatalogError>;

    async fn find_listing(
        &self,
        store_id: i32,
        remote_id: &str,
    ) -> Result<Option<Listing>, CatalogError>;
    /// Fails with `Integrity` when the game or store does not exist.
    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing, CatalogError>;
    async fn listings_for_game(&self, game_id: Uuid) -> Result<Vec<Listing>, CatalogError>;

    /// Append-only; the store assigns `id` and `scraped_at`.
    async fn append_price(&self, point: &NewPricePoint) -> Result<PricePoint, CatalogError>;
    /// Oldest first, ordered by `scraped_at` then `id`.
    async fn prices_for(&self, listing_id: Uuid) -> Result<Vec<PricePoint>, CatalogError>;
    /// Row with the greatest `scraped_at`; `None` while the listing is awaiting its first price.
    async fn latest_price_for(&self, listing_id: Uuid) -> Result<Option<PricePoint>, CatalogError>;

    /// Case-insensitive substring match over canonical titles.
    async fn search_games(&self, query: &str, limit: i64) -> Result<Vec<GameHit>, CatalogError>;
    async fn count_games(&self) -> Result<i64, CatalogError>;
    async fn ping(&self) -> Result<(), CatalogError>;
}

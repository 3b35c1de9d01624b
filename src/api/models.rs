// API request/response models (DTOs)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database_ops::catalog::{Game, GameHit, Listing, ListingStatus, PricePoint};

/// Standard API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: Some(Meta::now()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            meta: Some(Meta::now()),
        }
    }
}

/// Metadata included in all enveloped responses
#[derive(Debug, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub version: String,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub collection: String,
    pub games: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthFailure {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    pub found: usize,
    pub data: Vec<GameHit>,
}

/// Flat `{status, message}` body used by the search endpoint for refusals.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

/// A listing with its most recent price point, if it has one yet.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListingView {
    pub id: Uuid,
    pub store_id: i32,
    pub remote_id: String,
    pub listing_title: String,
    pub url: String,
    pub status: ListingStatus,
    pub latest_price: Option<PricePoint>,
}

impl ListingView {
    pub fn new(listing: Listing, latest_price: Option<PricePoint>) -> Self {
        Self {
            id: listing.id,
            store_id: listing.store_id,
            remote_id: listing.remote_id,
            listing_title: listing.listing_title,
            url: listing.url,
            status: listing.status,
            latest_price,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GameListings {
    pub game: Game,
    pub listings: Vec<ListingView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PriceHistory {
    pub listing_id: Uuid,
    pub prices: Vec<PricePoint>,
}

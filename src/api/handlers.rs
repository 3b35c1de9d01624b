// HTTP request handlers for API endpoints

use crate::api::models::*;
use crate::database_ops::catalog::CatalogError;
use crate::database_ops::ingest::{IngestError, IngestRequest, IngestionEngine};
use crate::database_ops::search::{self, query_too_short, DEFAULT_LIMIT};
use actix_web::{error::InternalError, web, HttpResponse, Result};
use uuid::Uuid;

/// Malformed JSON bodies are reported like any other validation failure.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| {
            let body = ApiResponse::<()>::error(format!("invalid payload: {err}"));
            InternalError::from_response(err, HttpResponse::UnprocessableEntity().json(body)).into()
        })
}

fn storage_error(e: &CatalogError) -> HttpResponse {
    tracing::warn!(error = %e, "storage call failed");
    match e {
        CatalogError::Unavailable(_) => {
            HttpResponse::ServiceUnavailable().json(ApiResponse::<()>::error(e.to_string()))
        }
        _ => HttpResponse::InternalServerError().json(ApiResponse::<()>::error(e.to_string())),
    }
}

/// Liveness probe reporting catalog size.
pub async fn health_check(engine: web::Data<IngestionEngine>) -> Result<HttpResponse> {
    match engine.store().count_games().await {
        Ok(games) => Ok(HttpResponse::Ok().json(HealthResponse {
            collection: format!("Games in collection: {games}"),
            games,
        })),
        Err(e) => {
            tracing::error!(error = %e, "health check could not reach the catalog");
            Ok(HttpResponse::ServiceUnavailable().json(HealthFailure {
                error: "db_connection_failed".to_string(),
                details: e.to_string(),
            }))
        }
    }
}

/// Ingestion webhook: one scraped listing in, canonical game out.
pub async fn parse_game(
    engine: web::Data<IngestionEngine>,
    payload: web::Json<IngestRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    tracing::info!(
        store_id = request.store_id,
        remote_id = %request.remote_id,
        raw_title = %request.raw_title,
        "ingestion request"
    );
    match engine.ingest_request(request).await {
        Ok(ack) => Ok(HttpResponse::Ok().json(ack)),
        Err(IngestError::Validation(msg)) => Ok(HttpResponse::UnprocessableEntity()
            .json(ApiResponse::<()>::error(format!("invalid ingestion payload: {msg}")))),
        Err(IngestError::Storage(e)) => Ok(storage_error(&e)),
    }
}

pub async fn search_games(
    engine: web::Data<IngestionEngine>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse> {
    if query_too_short(&params.query) {
        return Ok(HttpResponse::BadRequest().json(StatusMessage {
            status: "error".to_string(),
            message: "Search query too short".to_string(),
        }));
    }
    match search::search_games(engine.store(), &params.query, DEFAULT_LIMIT).await {
        Ok(hits) => Ok(HttpResponse::Ok().json(SearchResponse {
            status: "success".to_string(),
            found: hits.len(),
            data: hits,
        })),
        Err(e) => Ok(storage_error(&e)),
    }
}

/// Every listing of a game with its latest price, read fresh per listing.
pub async fn game_listings(
    engine: web::Data<IngestionEngine>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let game_id = path.into_inner();
    let store = engine.store();
    let game = match store.find_game(game_id).await {
        Ok(Some(game)) => game,
        Ok(None) => {
            return Ok(HttpResponse::NotFound()
                .json(ApiResponse::<()>::error(format!("game {game_id} not found"))))
        }
        Err(e) => return Ok(storage_error(&e)),
    };
    let listings = match store.listings_for_game(game_id).await {
        Ok(l) => l,
        Err(e) => return Ok(storage_error(&e)),
    };
    let mut views = Vec::with_capacity(listings.len());
    for listing in listings {
        match store.latest_price_for(listing.id).await {
            Ok(latest) => views.push(ListingView::new(listing, latest)),
            Err(e) => return Ok(storage_error(&e)),
        }
    }
    Ok(HttpResponse::Ok().json(ApiResponse::success(GameListings {
        game,
        listings: views,
    })))
}

pub async fn listing_prices(
    engine: web::Data<IngestionEngine>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let listing_id = path.into_inner();
    match engine.store().prices_for(listing_id).await {
        Ok(prices) => Ok(HttpResponse::Ok().json(ApiResponse::success(PriceHistory {
            listing_id,
            prices,
        }))),
        Err(e) => Ok(storage_error(&e)),
    }
}

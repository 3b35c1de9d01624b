// API route configuration

use crate::api::handlers;
use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(handlers::json_config())
        .route("/health", web::get().to(handlers::health_check))
        .service(
            web::scope("/api/v1")
                // Ingestion webhook
                .route("/games/parse", web::post().to(handlers::parse_game))
                // Catalog queries
                .route("/games/search", web::get().to(handlers::search_games))
                .route("/games/{id}/listings", web::get().to(handlers::game_listings))
                .route("/listings/{id}/prices", web::get().to(handlers::listing_prices)),
        );
}

// HTTP boundary: ingestion webhook, title search, health and price queries.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::ApiServer;

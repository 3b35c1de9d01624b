//! Game price tracking: storefront search scraping, title canonicalization,
//! currency conversion and idempotent catalog ingestion.

pub mod api;
pub mod database_ops;
pub mod normalization;
pub mod orchestrator;
pub mod logging;

pub mod util {
    pub mod env;
}

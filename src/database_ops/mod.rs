pub mod catalog;
pub mod db;
pub mod ingest;
pub mod memory_catalog;
pub mod pg_catalog;
pub mod search;
pub mod storefront;

pub mod steam {
    pub mod provider;
}
pub mod gog {
    pub mod provider;
}

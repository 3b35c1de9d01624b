use tracing::debug;

use crate::database_ops::catalog::{CatalogError, CatalogStore, GameHit};

/// Queries shorter than this (in characters, after trimming) are refused.
pub const MIN_QUERY_LEN: usize = 2;
pub const DEFAULT_LIMIT: i64 = 5;
pub const MAX_RESULTS: i64 = 10;

pub fn query_too_short(q: &str) -> bool {
    q.trim().chars().count() < MIN_QUERY_LEN
}

/// Case-insensitive substring search over canonical titles. `limit` is
/// clamped into `1..=MAX_RESULTS`.
pub async fn search_games(
    store: &dyn CatalogStore,
    q: &str,
    limit: i64,
) -> Result<Vec<GameHit>, CatalogError> {
    let limit = limit.clamp(1, MAX_RESULTS);
    let hits = store.search_games(q.trim(), limit).await?;
    debug!(query = q, limit, found = hits.len(), "title search");
    Ok(hits)
}

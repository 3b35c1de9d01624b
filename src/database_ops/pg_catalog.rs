use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database_ops::catalog::{
    CatalogError, CatalogStore, Game, GameHit, Listing, ListingStatus, NewGame, NewListing,
    NewPricePoint, PricePoint, Store,
};
use crate::database_ops::db::Db;

/// Postgres-backed catalog. Every write is a single statement, so each
/// find-or-create step is atomic on its own and FKs guarantee a listing never
/// points at a missing game or store.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(db: &Db) -> Self {
        Self {
            pool: db.pool.clone(),
        }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CatalogError::conflict(db_err.constraint().unwrap_or("unique"))
            }
            sqlx::Error::Database(db_err)
                if db_err.is_foreign_key_violation() || db_err.is_check_violation() =>
            {
                CatalogError::Integrity(db_err.message().to_string())
            }
            sqlx::Error::Database(db_err) => CatalogError::Integrity(db_err.message().to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
                CatalogError::Integrity(err.to_string())
            }
            _ => CatalogError::Unavailable(err.to_string()),
        }
    }
}

fn game_from_row(row: &PgRow) -> Result<Game, sqlx::Error> {
    Ok(Game {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        created_at: row.try_get("created_at")?,
    })
}

fn store_from_row(row: &PgRow) -> Result<Store, sqlx::Error> {
    Ok(Store {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        base_url: row.try_get("base_url")?,
    })
}

fn listing_from_row(row: &PgRow) -> Result<Listing, CatalogError> {
    let status: String = row.try_get("status")?;
    Ok(Listing {
        id: row.try_get("id")?,
        game_id: row.try_get("game_id")?,
        store_id: row.try_get("store_id")?,
        remote_id: row.try_get("remote_id")?,
        listing_title: row.try_get("listing_title")?,
        url: row.try_get("url")?,
        status: status.parse::<ListingStatus>()?,
    })
}

fn price_from_row(row: &PgRow) -> Result<PricePoint, sqlx::Error> {
    Ok(PricePoint {
        id: row.try_get("id")?,
        listing_id: row.try_get("listing_id")?,
        price: row.try_get("price")?,
        currency: row.try_get("currency")?,
        discount_percent: row.try_get("discount_percent")?,
        scraped_at: row.try_get("scraped_at")?,
    })
}

/// Escape `%`, `_` and `\` so user input is matched literally by ILIKE.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const LISTING_COLUMNS: &str = "id, game_id, store_id, remote_id, listing_title, url, status";
const PRICE_COLUMNS: &str = "id, listing_id, price, currency, discount_percent, scraped_at";

#[async_trait::async_trait]
impl CatalogStore for PgCatalog {
    async fn find_store(&self, id: i32) -> Result<Option<Store>, CatalogError> {
        let row = sqlx::query("SELECT id, name, base_url FROM stores WHERE id = $1")
            .persistent(false)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(store_from_row).transpose()?)
    }

    #[instrument(skip(self), fields(store_id = store.id))]
    async fn insert_store(&self, store: &Store) -> Result<Store, CatalogError> {
        let row = sqlx::query(
            "INSERT INTO stores (id, name, base_url) VALUES ($1, $2, $3) \
             RETURNING id, name, base_url",
        )
        .persistent(false)
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.base_url)
        .fetch_one(&self.pool)
        .await?;
        debug!(store_name = %store.name, "store inserted");
        Ok(store_from_row(&row)?)
    }

    async fn find_game(&self, id: Uuid) -> Result<Option<Game>, CatalogError> {
        let row = sqlx::query("SELECT id, title, slug, created_at FROM games WHERE id = $1")
            .persistent(false)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>, CatalogError> {
        let row = sqlx::query("SELECT id, title, slug, created_at FROM games WHERE slug = $1")
            .persistent(false)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    #[instrument(skip(self), fields(slug = %game.slug))]
    async fn insert_game(&self, game: &NewGame) -> Result<Game, CatalogError> {
        let row = sqlx::query(
            "INSERT INTO games (id, title, slug) VALUES ($1, $2, $3) \
             RETURNING id, title, slug, created_at",
        )
        .persistent(false)
        .bind(game.id)
        .bind(&game.title)
        .bind(&game.slug)
        .fetch_one(&self.pool)
        .await?;
        debug!(game_id = %game.id, "game inserted");
        Ok(game_from_row(&row)?)
    }

    async fn find_listing(
        &self,
        store_id: i32,
        remote_id: &str,
    ) -> Result<Option<Listing>, CatalogError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM game_listings WHERE store_id = $1 AND remote_id = $2"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(store_id)
            .bind(remote_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    #[instrument(skip(self), fields(store_id = listing.store_id, remote_id = %listing.remote_id))]
    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing, CatalogError> {
        let sql = format!(
            "INSERT INTO game_listings ({LISTING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {LISTING_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(listing.id)
            .bind(listing.game_id)
            .bind(listing.store_id)
            .bind(&listing.remote_id)
            .bind(&listing.listing_title)
            .bind(&listing.url)
            .bind(listing.status.as_str())
            .fetch_one(&self.pool)
            .await?;
        listing_from_row(&row)
    }

    async fn listings_for_game(&self, game_id: Uuid) -> Result<Vec<Listing>, CatalogError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM game_listings WHERE game_id = $1 ORDER BY store_id, remote_id"
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(game_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(listing_from_row).collect()
    }

    async fn append_price(&self, point: &NewPricePoint) -> Result<PricePoint, CatalogError> {
        let sql = format!(
            "INSERT INTO price_history (listing_id, price, currency, discount_percent) \
             VALUES ($1, $2, $3, $4) RETURNING {PRICE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(point.listing_id)
            .bind(&point.price)
            .bind(&point.currency)
            .bind(point.discount_percent)
            .fetch_one(&self.pool)
            .await?;
        Ok(price_from_row(&row)?)
    }

    async fn prices_for(&self, listing_id: Uuid) -> Result<Vec<PricePoint>, CatalogError> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_history WHERE listing_id = $1 ORDER BY scraped_at, id"
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(listing_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(price_from_row).collect::<Result<_, _>>()?)
    }

    async fn latest_price_for(&self, listing_id: Uuid) -> Result<Option<PricePoint>, CatalogError> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_history WHERE listing_id = $1 \
             ORDER BY scraped_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(listing_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(price_from_row).transpose()?)
    }

    async fn search_games(&self, query: &str, limit: i64) -> Result<Vec<GameHit>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id, title FROM games WHERE title ILIKE $1 ESCAPE '\\' ORDER BY title LIMIT $2",
        )
        .persistent(false)
        .bind(like_pattern(query))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(GameHit {
                id: r.try_get("id")?,
                title: r.try_get("title")?,
            });
        }
        Ok(out)
    }

    async fn count_games(&self) -> Result<i64, CatalogError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn ping(&self) -> Result<(), CatalogError> {
        sqlx::query_scalar::<_, bool>("SELECT true")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

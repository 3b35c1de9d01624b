//! Generic HTML search-page scraping shared by every storefront.
//!
//! A store is described by a [`StoreProfile`]: where its search page lives, which
//! CSS selectors pick out result rows and their fields, and how the store-native
//! id is read from a row. [`HtmlStoreScraper`] turns a search term into
//! `ScrapedListing`s using those rules plus the text extractors.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::database_ops::gog::provider as gog;
use crate::database_ops::ingest::ScrapedListing;
use crate::database_ops::steam::provider as steam;
use crate::normalization::currency::RateTable;
use crate::normalization::extract::{
    extract_currency, extract_discount, extract_numeric_id, extract_price,
};

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("unparseable page: {0}")]
    Parse(String),
}

/// Source of raw search-page markup. HTTP by default; a headless browser can
/// stand in by implementing the same trait.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::Fetch {
                url: String::new(),
                reason: format!("building http client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        let fail = |e: reqwest::Error| {
            if e.is_timeout() {
                ScrapeError::Timeout(self.timeout)
            } else {
                ScrapeError::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };
        let resp = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(fail)?
            .error_for_status()
            .map_err(fail)?;
        resp.text().await.map_err(fail)
    }
}

/// CSS selectors for one result row and its fields.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub row: String,
    pub title: String,
    /// Anchor inside the row; `None` when the row element is the anchor.
    pub link: Option<String>,
    pub price: String,
    pub discount: String,
}

#[derive(Debug, Clone)]
pub enum IdRule {
    /// First capture group of the pattern, matched against the row's link.
    UrlPattern(Regex),
    /// Attribute on the row element carrying the id directly.
    Attribute(String),
}

#[derive(Debug, Clone)]
pub struct StoreProfile {
    pub id: i32,
    pub name: String,
    pub base_url: String,
    /// Search page with a `{query}` placeholder.
    pub search_url: String,
    pub selectors: SiteSelectors,
    pub id_rule: IdRule,
    pub top_n: usize,
}

impl StoreProfile {
    pub fn search_url_for(&self, term: &str) -> String {
        self.search_url
            .replace("{query}", &urlencoding::encode(term.trim()))
    }
}

/// Text pulled out of one result row before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCandidate {
    pub title: String,
    pub href: Option<String>,
    pub id_attr: Option<String>,
    pub price_text: String,
    pub discount_text: String,
}

fn compile(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse(format!("selector {css:?}: {e:?}")))
}

/// Visible text of the first match, one trimmed text node per line.
fn text_of(row: &ElementRef<'_>, sel: &Selector) -> String {
    row.select(sel)
        .next()
        .map(|el| {
            el.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Up to `profile.top_n` result rows, in page order.
pub fn parse_candidates(html: &str, profile: &StoreProfile) -> Result<Vec<RawCandidate>, ScrapeError> {
    let sel = &profile.selectors;
    let row_sel = compile(&sel.row)?;
    let title_sel = compile(&sel.title)?;
    let price_sel = compile(&sel.price)?;
    let discount_sel = compile(&sel.discount)?;
    let link_sel = sel.link.as_deref().map(compile).transpose()?;

    let doc = Html::parse_document(html);
    let mut out = Vec::new();
    for row in doc.select(&row_sel).take(profile.top_n) {
        let anchor = match &link_sel {
            Some(s) => row.select(s).next(),
            None => Some(row),
        };
        let id_attr = match &profile.id_rule {
            IdRule::Attribute(name) => row.value().attr(name).map(|v| v.trim().to_string()),
            IdRule::UrlPattern(_) => None,
        };
        out.push(RawCandidate {
            title: text_of(&row, &title_sel),
            href: anchor.and_then(|a| a.value().attr("href")).map(str::to_string),
            id_attr,
            price_text: text_of(&row, &price_sel),
            discount_text: text_of(&row, &discount_sel),
        });
    }
    Ok(out)
}

/// Absolute listing URL with query and fragment removed.
pub fn canonical_url(base_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let mut url = base.join(href.trim()).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

/// Interpret a candidate. `None` means skip: no readable id, no link or no title.
pub fn candidate_to_listing(
    profile: &StoreProfile,
    candidate: RawCandidate,
    rates: &RateTable,
) -> Option<ScrapedListing> {
    let title = candidate.title.trim();
    if title.is_empty() {
        debug!(store = %profile.name, "skipping candidate without a title");
        return None;
    }
    let Some(href) = candidate.href.as_deref() else {
        debug!(store = %profile.name, title, "skipping candidate without a link");
        return None;
    };
    let remote_id = match &profile.id_rule {
        IdRule::UrlPattern(re) => extract_numeric_id(re, href),
        IdRule::Attribute(_) => candidate.id_attr.clone().filter(|id| !id.is_empty()),
    };
    let Some(remote_id) = remote_id else {
        debug!(store = %profile.name, title, href, "skipping candidate with unparseable id");
        return None;
    };
    let Some(url) = canonical_url(&profile.base_url, href) else {
        debug!(store = %profile.name, title, href, "skipping candidate with bad link");
        return None;
    };

    let price = extract_price(&candidate.price_text);
    let currency = extract_currency(&candidate.price_text);
    Some(ScrapedListing {
        store_id: profile.id,
        store_name: profile.name.clone(),
        raw_title: title.to_string(),
        remote_id,
        url,
        price_usd: rates.to_usd(&price, currency),
        currency: "USD".to_string(),
        discount_percent: extract_discount(&candidate.discount_text),
    })
}

/// One store's search-to-listings task.
#[async_trait]
pub trait StoreScraper: Send + Sync {
    fn profile(&self) -> &StoreProfile;
    async fn scrape(&self, term: &str) -> Result<Vec<ScrapedListing>, ScrapeError>;
}

pub struct HtmlStoreScraper {
    profile: StoreProfile,
    fetcher: Arc<dyn PageFetcher>,
    rates: RateTable,
}

impl HtmlStoreScraper {
    pub fn new(profile: StoreProfile, fetcher: Arc<dyn PageFetcher>, rates: RateTable) -> Self {
        Self {
            profile,
            fetcher,
            rates,
        }
    }
}

#[async_trait]
impl StoreScraper for HtmlStoreScraper {
    fn profile(&self) -> &StoreProfile {
        &self.profile
    }

    async fn scrape(&self, term: &str) -> Result<Vec<ScrapedListing>, ScrapeError> {
        let url = self.profile.search_url_for(term);
        let html = self.fetcher.fetch(&url).await?;
        let candidates = parse_candidates(&html, &self.profile)?;
        let seen = candidates.len();
        let listings: Vec<ScrapedListing> = candidates
            .into_iter()
            .filter_map(|c| candidate_to_listing(&self.profile, c, &self.rates))
            .collect();
        info!(
            store = %self.profile.name,
            term,
            candidates = seen,
            listings = listings.len(),
            "store search parsed"
        );
        Ok(listings)
    }
}

/// Profile for a configured store name (`steam`, `gog`), case-insensitive.
pub fn builtin_profile(name: &str, top_n: usize) -> Option<StoreProfile> {
    match name.trim().to_ascii_lowercase().as_str() {
        "steam" => Some(steam::profile(top_n)),
        "gog" => Some(gog::profile(top_n)),
        _ => None,
    }
}

/// Profiles for every known name in `names`; unknown names are logged and dropped.
pub fn profiles_from_names(names: &[String], top_n: usize) -> Vec<StoreProfile> {
    names
        .iter()
        .filter_map(|n| {
            let p = builtin_profile(n, top_n);
            if p.is_none() {
                warn!(store = %n, "unknown store name; ignoring");
            }
            p
        })
        .collect()
}

/// One `HtmlStoreScraper` per profile, all sharing a fetcher and rate table.
pub fn scrapers_for(
    profiles: Vec<StoreProfile>,
    fetcher: Arc<dyn PageFetcher>,
    rates: &RateTable,
) -> Vec<Arc<dyn StoreScraper>> {
    profiles
        .into_iter()
        .map(|p| {
            Arc::new(HtmlStoreScraper::new(p, fetcher.clone(), rates.clone())) as Arc<dyn StoreScraper>
        })
        .collect()
}

use regex::Regex;
use std::sync::OnceLock;

use crate::database_ops::storefront::{IdRule, SiteSelectors, StoreProfile};

pub const STEAM_STORE_ID: i32 = 1;
pub const STEAM_NAME: &str = "Steam";
pub const STEAM_BASE_URL: &str = "https://store.steampowered.com";

fn app_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/app/(\d+)").expect("valid steam app id regex"))
}

/// Steam store search. Result rows are anchors linking to `/app/<id>/<slug>/`;
/// the final price block shows the struck-through original above the sale price.
pub fn profile(top_n: usize) -> StoreProfile {
    StoreProfile {
        id: STEAM_STORE_ID,
        name: STEAM_NAME.to_string(),
        base_url: STEAM_BASE_URL.to_string(),
        search_url: format!("{STEAM_BASE_URL}/search/?term={{query}}&cc=us"),
        selectors: SiteSelectors {
            row: "a.search_result_row".into(),
            title: "span.title".into(),
            link: None,
            price: "div.discount_final_price, div.search_price".into(),
            discount: "div.discount_pct, div.search_discount span".into(),
        },
        id_rule: IdRule::UrlPattern(app_id_pattern().clone()),
        top_n,
    }
}

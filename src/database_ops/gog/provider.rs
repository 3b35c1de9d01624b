use crate::database_ops::storefront::{IdRule, SiteSelectors, StoreProfile};

pub const GOG_STORE_ID: i32 = 2;
pub const GOG_NAME: &str = "GOG";
pub const GOG_BASE_URL: &str = "https://www.gog.com";

/// GOG catalogue search. Product tiles carry the numeric id in
/// `data-product-id`; links are locale-prefixed (`/en/game/<slug>`).
pub fn profile(top_n: usize) -> StoreProfile {
    StoreProfile {
        id: GOG_STORE_ID,
        name: GOG_NAME.to_string(),
        base_url: GOG_BASE_URL.to_string(),
        search_url: format!("{GOG_BASE_URL}/en/games?query={{query}}"),
        selectors: SiteSelectors {
            row: "a.product-tile".into(),
            title: ".product-tile__title".into(),
            link: None,
            price: ".final-value".into(),
            discount: ".price-discount".into(),
        },
        id_rule: IdRule::Attribute("data-product-id".into()),
        top_n,
    }
}

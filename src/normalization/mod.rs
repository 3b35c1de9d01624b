pub mod currency;
pub mod extract;
pub mod title;

pub use currency::RateTable;
pub use extract::{extract_currency, extract_discount, extract_price};
pub use title::{normalize, CanonicalTitle};

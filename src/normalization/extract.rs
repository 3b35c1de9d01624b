//! Pure extractors over free-form text scraped from listing elements.
//!
//! Nothing here fails: text with no usable match resolves to the zero value
//! (price 0, discount 0, currency USD).

use bigdecimal::{BigDecimal, Zero};
use regex::Regex;
use std::str::FromStr;
use std::sync::OnceLock;

/// Currency assumed when the text carries no recognizable marker.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Currency detection table, checked top to bottom against lowercased text.
/// When a fragment carries markers for several currencies the first row that
/// matches wins, so the order here is the tie-break policy.
pub const CURRENCY_MARKERS: [(&str, &str); 5] = [
    ("RON", r"\blei\b|\bron\b"),
    ("EUR", r"€|\beur\b"),
    ("UAH", r"₴|\bгрн\b|\buah\b"),
    ("GBP", r"£|\bgbp\b"),
    ("USD", r"\$|\busd\b"),
];

struct Patterns {
    decimal: Regex,
    integer: Regex,
    currencies: Vec<(&'static str, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        decimal: Regex::new(r"\d[\d.,]*[.,]\d+").expect("static regex"),
        integer: Regex::new(r"\d+(?:[ \u{a0}]\d{3})*").expect("static regex"),
        currencies: CURRENCY_MARKERS
            .iter()
            .map(|(code, pat)| (*code, Regex::new(pat).expect("static regex")))
            .collect(),
    })
}

/// Price amount from a price fragment such as `"$59.99\n$29.99"` or `"Free"`.
///
/// Lines are scanned from the bottom up because storefronts render the
/// crossed-out original price above the final one. The last decimal-looking
/// number wins; failing that, a bare integer on a line that also carries a
/// currency marker (`"499 ₴"`).
pub fn extract_price(text: &str) -> BigDecimal {
    if text.trim().is_empty() || text.to_lowercase().contains("free") {
        return BigDecimal::zero();
    }
    let p = patterns();

    for line in text.lines().rev() {
        if let Some(m) = p.decimal.find_iter(line).last() {
            return parse_amount(m.as_str());
        }
    }

    for line in text.lines().rev() {
        let lowered = line.to_lowercase();
        if !has_currency_marker(&lowered) {
            continue;
        }
        if let Some(m) = p.integer.find_iter(line).last() {
            return parse_amount(m.as_str());
        }
    }

    BigDecimal::zero()
}

/// Parse a matched number, treating the right-most `.` or `,` as the decimal
/// separator and discarding every other separator.
fn parse_amount(raw: &str) -> BigDecimal {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = match compact.rfind(['.', ',']) {
        Some(idx) => {
            let (whole, frac) = compact.split_at(idx);
            let whole: String = whole.chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", whole, &frac[1..])
        }
        None => compact,
    };
    BigDecimal::from_str(&normalized).unwrap_or_else(|_| BigDecimal::zero())
}

/// Discount percent from fragments like `"-50%"`. First integer wins; the value
/// is passed through without range checks.
pub fn extract_discount(text: &str) -> i32 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

/// Three-letter currency code detected from a price fragment. Best effort:
/// a bare number with no marker is USD.
pub fn extract_currency(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    patterns()
        .currencies
        .iter()
        .find(|(_, re)| re.is_match(&lowered))
        .map(|(code, _)| *code)
        .unwrap_or(DEFAULT_CURRENCY)
}

fn has_currency_marker(lowered: &str) -> bool {
    patterns()
        .currencies
        .iter()
        .any(|(_, re)| re.is_match(lowered))
}

/// Numeric store identifier captured by `pattern`'s first group, e.g. the
/// app id in `https://store.steampowered.com/app/292030/The_Witcher_3/`.
pub fn extract_numeric_id(pattern: &Regex, text: &str) -> Option<String> {
    let caps = pattern.captures(text)?;
    let id = caps.get(1)?.as_str();
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn price_defaults_to_zero() {
        assert_eq!(extract_price(""), BigDecimal::zero());
        assert_eq!(extract_price("   "), BigDecimal::zero());
        assert_eq!(extract_price("Free"), BigDecimal::zero());
        assert_eq!(extract_price("Free to Play"), BigDecimal::zero());
        assert_eq!(extract_price("Coming soon"), BigDecimal::zero());
    }

    #[test]
    fn price_prefers_final_line() {
        assert_eq!(extract_price("$59.99\n$29.99"), dec("29.99"));
        assert_eq!(extract_price("59,99€\n19,99€\n"), dec("19.99"));
        assert_eq!(extract_price("$19.99"), dec("19.99"));
    }

    #[test]
    fn price_handles_grouping_and_integer_fallback() {
        assert_eq!(extract_price("1,299.99 USD"), dec("1299.99"));
        assert_eq!(extract_price("1.299,50 lei"), dec("1299.50"));
        assert_eq!(extract_price("499 ₴"), dec("499"));
        assert_eq!(extract_price("1 299 грн"), dec("1299"));
        // a bare integer without any currency marker is not a price
        assert_eq!(extract_price("Top 10"), BigDecimal::zero());
    }

    #[test]
    fn price_decimal_line_beats_integer_line() {
        assert_eq!(extract_price("12.49 €\n-50% 10 €"), dec("12.49"));
    }

    #[test]
    fn discount_takes_first_integer() {
        assert_eq!(extract_discount("-50%"), 50);
        assert_eq!(extract_discount(""), 0);
        assert_eq!(extract_discount("no discount"), 0);
        assert_eq!(extract_discount("-75% off, was 40"), 75);
        assert_eq!(extract_discount("150%"), 150);
    }

    #[test]
    fn currency_markers_in_priority_order() {
        assert_eq!(extract_currency("149,99 lei"), "RON");
        assert_eq!(extract_currency("149.99 RON"), "RON");
        assert_eq!(extract_currency("19,99€"), "EUR");
        assert_eq!(extract_currency("499₴"), "UAH");
        assert_eq!(extract_currency("499 грн"), "UAH");
        assert_eq!(extract_currency("£9.99"), "GBP");
        assert_eq!(extract_currency("$9.99"), "USD");
        assert_eq!(extract_currency("9.99"), "USD");
        // two markers: the earlier table row wins
        assert_eq!(extract_currency("10 € / 50 lei"), "RON");
        // "ron" inside a longer word is not a marker
        assert_eq!(extract_currency("iron 9.99"), "USD");
    }

    #[test]
    fn numeric_id_from_url() {
        let re = Regex::new(r"/app/(\d+)").unwrap();
        assert_eq!(
            extract_numeric_id(&re, "https://store.steampowered.com/app/292030/The_Witcher/?snr=1"),
            Some("292030".to_string())
        );
        assert_eq!(extract_numeric_id(&re, "https://store.steampowered.com/bundle/1/"), None);
    }
}

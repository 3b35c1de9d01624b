use bigdecimal::{BigDecimal, One, RoundingMode};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

/// Static currency → USD multipliers. Loaded once at process start and passed
/// into the converter explicitly; there is no runtime refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rates: BTreeMap<String, BigDecimal>,
}

impl RateTable {
    /// Built-in table for the currencies the storefront extractors can detect.
    pub fn with_defaults() -> Self {
        // Keep deterministic order for predictable logging
        let defaults = [
            ("USD", "1"),
            ("EUR", "1.08"),
            ("GBP", "1.27"),
            ("RON", "0.22"),
            ("UAH", "0.024"),
        ];
        let rates = defaults
            .into_iter()
            .filter_map(|(code, rate)| Some((code.to_string(), BigDecimal::from_str(rate).ok()?)))
            .collect();
        Self { rates }
    }

    /// Empty table: every currency converts at 1.0.
    pub fn empty() -> Self {
        Self {
            rates: BTreeMap::new(),
        }
    }

    /// Override or add a rate for a currency code (case-insensitive).
    pub fn with_rate(mut self, code: &str, rate: BigDecimal) -> Self {
        self.rates.insert(code.trim().to_ascii_uppercase(), rate);
        self
    }

    /// Apply overrides in the `EUR=1.08,GBP=1.27` format. Malformed pairs are
    /// logged and skipped.
    pub fn with_overrides(mut self, pairs: &str) -> Self {
        for pair in pairs.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let parsed = pair
                .split_once('=')
                .and_then(|(code, rate)| Some((code.trim(), BigDecimal::from_str(rate.trim()).ok()?)))
                .filter(|(code, rate)| is_currency_code(code) && *rate > BigDecimal::from(0));
            match parsed {
                Some((code, rate)) => self = self.with_rate(code, rate),
                None => warn!(pair = %pair, "ignoring malformed FX rate override"),
            }
        }
        self
    }

    /// Multiplier for a currency; unknown codes are treated as already-USD.
    pub fn rate(&self, currency: &str) -> BigDecimal {
        self.rates
            .get(&currency.trim().to_ascii_uppercase())
            .cloned()
            .unwrap_or_else(BigDecimal::one)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    /// Convert `amount` in `currency` to USD, rounded half-up to 2 decimals.
    pub fn to_usd(&self, amount: &BigDecimal, currency: &str) -> BigDecimal {
        (amount * self.rate(currency)).with_scale_round(2, RoundingMode::HalfUp)
    }
}

impl Default for RateTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Three ASCII letters, e.g. `EUR`.
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

//! Market symbol normalization
//!
//! Exchanges and callers spell the same market differently ("btc_ltc",
//! "BTC-LTC", "BTC/LTC"). Everything keyed by market goes through
//! [`normalize_symbol`] first.

/// Separator used by the canonical form.
pub const CANONICAL_SEPARATOR: char = '/';

/// Normalize a symbol to its canonical `BASE/QUOTE` upper-case form.
///
/// Symbols without a separator (e.g. "BTCUSDT") are only upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol
        .trim()
        .chars()
        .map(|c| match c {
            '_' | '-' | ':' | '/' => CANONICAL_SEPARATOR,
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// Compare two symbols after normalization.
pub fn same_market(a: &str, b: &str) -> bool {
    normalize_symbol(a) == normalize_symbol(b)
}

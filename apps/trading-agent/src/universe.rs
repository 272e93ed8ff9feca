//! Static trading universe with sector classification.
//!
//! Thirty liquid S&P 500 large caps. Sector labels drive the gate's
//! concentration cap; anything outside the table maps to "Unknown".

/// Symbol and sector pairs making up the tradeable universe.
pub const UNIVERSE: &[(&str, &str)] = &[
    ("AAPL", "Technology"),
    ("MSFT", "Technology"),
    ("NVDA", "Technology"),
    ("GOOGL", "Technology"),
    ("META", "Technology"),
    ("AVGO", "Technology"),
    ("UNH", "Healthcare"),
    ("JNJ", "Healthcare"),
    ("LLY", "Healthcare"),
    ("JPM", "Financials"),
    ("V", "Financials"),
    ("MA", "Financials"),
    ("AMZN", "Consumer Discretionary"),
    ("TSLA", "Consumer Discretionary"),
    ("HD", "Consumer Discretionary"),
    ("NFLX", "Communication Services"),
    ("DIS", "Communication Services"),
    ("CAT", "Industrials"),
    ("GE", "Industrials"),
    ("UNP", "Industrials"),
    ("PG", "Consumer Staples"),
    ("KO", "Consumer Staples"),
    ("PEP", "Consumer Staples"),
    ("XOM", "Energy"),
    ("CVX", "Energy"),
    ("NEE", "Utilities"),
    ("SO", "Utilities"),
    ("PLD", "Real Estate"),
    ("LIN", "Materials"),
    ("APD", "Materials"),
];

/// Sector label for `symbol`, "Unknown" if not in the universe.
#[must_use]
pub fn sector_of(symbol: &str) -> &'static str {
    UNIVERSE
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map_or("Unknown", |(_, sector)| sector)
}

/// All universe symbols in declaration order.
#[must_use]
pub fn symbols() -> Vec<&'static str> {
    UNIVERSE.iter().map(|(sym, _)| *sym).collect()
}

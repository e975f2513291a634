//! Provider boundary for OHLCV market-data ingestion.
//!
//! This module defines **only** the raw bar type. No CSV logic, no
//! normalization to micros, and no data-quality logic belong here.

// ---------------------------------------------------------------------------
// Raw bar
// ---------------------------------------------------------------------------

/// A single OHLCV bar as returned verbatim by an upstream data provider.
///
/// Prices are kept as decimal strings so downstream callers can normalise
/// deterministically (e.g. convert to integer micros) without floating-point
/// rounding being introduced at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBar {
    /// Ticker symbol exactly as given to the provider (e.g. `"AAPL"`).
    pub symbol: String,
    /// Canonical timeframe string (e.g. `"1D"`, `"1m"`, `"5m"`).
    pub timeframe: String,
    /// Bar end timestamp as UTC epoch seconds.
    pub end_ts: i64,
    /// Opening price as a decimal string (e.g. `"182.34"`).
    pub open: String,
    /// High price as a decimal string.
    pub high: String,
    /// Low price as a decimal string.
    pub low: String,
    /// Closing price as a decimal string.
    pub close: String,
    /// Trade volume (integer shares / contracts).
    pub volume: i64,
    /// `true` when the bar period has fully closed; `false` for a live/partial bar.
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar(symbol: &str) -> RawBar {
        RawBar {
            symbol: symbol.to_string(),
            timeframe: "1D".to_string(),
            end_ts: 1_700_000_000,
            open: "100.00".to_string(),
            high: "105.00".to_string(),
            low: "99.00".to_string(),
            close: "103.00".to_string(),
            volume: 1_000_000,
            is_complete: true,
        }
    }

    #[test]
    fn raw_bar_clone_eq() {
        let a = sample_bar("SPY");
        let b = a.clone();
        assert_eq!(a, b);
    }
}

//! Market-data API contract, consumed by `rbt-pricecache`.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct Trade {
    pub price: f64,
    pub size: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub price: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub latest_trade: Trade,
    pub latest_bid: Quote,
    pub latest_ask: Quote,
}

#[derive(Debug, Clone, Copy)]
pub struct Bar {
    pub ts_utc: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("market data transport error: {0}")]
    Transport(String),
    #[error("symbol not found: {0}")]
    NotFound(String),
}

pub trait MarketData: Send + Sync {
    fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError>;
    fn get_latest_trade(&self, symbol: &str) -> Result<Trade, MarketDataError>;
    fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError>;
}

/// Mirrors the `Arc<dyn Broker>` forwarding impl — lets the same `Arc`-shared
/// adapter instance (e.g. paper trading's in-memory price map) satisfy both
/// `Broker` and `MarketData` at once.
impl<T: MarketData + ?Sized> MarketData for std::sync::Arc<T> {
    fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        (**self).get_snapshot(symbol)
    }
    fn get_latest_trade(&self, symbol: &str) -> Result<Trade, MarketDataError> {
        (**self).get_latest_trade(symbol)
    }
    fn get_bars(&self, symbol: &str, timeframe: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>, MarketDataError> {
        (**self).get_bars(symbol, timeframe, start, end)
    }
}

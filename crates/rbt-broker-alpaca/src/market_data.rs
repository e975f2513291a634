//! Live market-data adapter against Alpaca's data API. Separate base
//! URL and key from the trading API (`DATA_FEED`/`BROKER_DATA_KEY`) since
//! Alpaca serves the two from distinct hosts.

use chrono::{DateTime, Utc};
use rbt_schemas::marketdata::{Bar, MarketData, MarketDataError, Quote, Snapshot, Trade};
use serde::Deserialize;
use tokio::runtime::Handle;

#[derive(Clone)]
pub struct AlpacaMarketData {
    base_url: String,
    data_key: String,
    secret_key: String,
    feed: String,
    client: reqwest::Client,
}

impl AlpacaMarketData {
    pub fn new(
        base_url: impl Into<String>,
        data_key: impl Into<String>,
        secret_key: impl Into<String>,
        feed: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            data_key: data_key.into(),
            secret_key: secret_key.into(),
            feed: feed.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.data_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
    }

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::task::block_in_place(|| Handle::current().block_on(fut))
    }

    async fn get_snapshot_async(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        let response = self
            .request(&format!("/v2/stocks/{symbol}/snapshot?feed={}", self.feed))
            .send()
            .await
            .map_err(|e| MarketDataError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::NotFound(symbol.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Transport(format!("{status}: {text}")));
        }

        let raw: AlpacaSnapshot = response.json().await.map_err(|e| MarketDataError::Transport(e.to_string()))?;
        Ok(Snapshot {
            latest_trade: Trade { price: raw.latest_trade.p, size: raw.latest_trade.s },
            latest_bid: Quote { price: raw.latest_quote.bp },
            latest_ask: Quote { price: raw.latest_quote.ap },
        })
    }

    async fn get_latest_trade_async(&self, symbol: &str) -> Result<Trade, MarketDataError> {
        let response = self
            .request(&format!("/v2/stocks/{symbol}/trades/latest?feed={}", self.feed))
            .send()
            .await
            .map_err(|e| MarketDataError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MarketDataError::NotFound(symbol.to_string()));
        }
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Transport(format!("{status}: {text}")));
        }

        let raw: AlpacaLatestTrade = response.json().await.map_err(|e| MarketDataError::Transport(e.to_string()))?;
        Ok(Trade { price: raw.trade.p, size: raw.trade.s })
    }

    async fn get_bars_async(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let path = format!(
            "/v2/stocks/{symbol}/bars?timeframe={timeframe}&start={}&end={}",
            start.to_rfc3339(),
            end.to_rfc3339(),
        );
        let response = self.request(&path).send().await.map_err(|e| MarketDataError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Transport(format!("{status}: {text}")));
        }

        let raw: AlpacaBars = response.json().await.map_err(|e| MarketDataError::Transport(e.to_string()))?;
        Ok(raw
            .bars
            .into_iter()
            .map(|b| Bar { ts_utc: b.t, open: b.o, high: b.h, low: b.l, close: b.c, volume: b.v })
            .collect())
    }
}

impl MarketData for AlpacaMarketData {
    fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        Self::block_on(self.get_snapshot_async(symbol))
    }

    fn get_latest_trade(&self, symbol: &str) -> Result<Trade, MarketDataError> {
        Self::block_on(self.get_latest_trade_async(symbol))
    }

    fn get_bars(&self, symbol: &str, timeframe: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>, MarketDataError> {
        Self::block_on(self.get_bars_async(symbol, timeframe, start, end))
    }
}

#[derive(Debug, Deserialize)]
struct AlpacaTradeRaw {
    p: f64,
    s: i64,
}

#[derive(Debug, Deserialize)]
struct AlpacaQuoteRaw {
    bp: f64,
    ap: f64,
}

#[derive(Debug, Deserialize)]
struct AlpacaSnapshot {
    #[serde(rename = "latestTrade")]
    latest_trade: AlpacaTradeRaw,
    #[serde(rename = "latestQuote")]
    latest_quote: AlpacaQuoteRaw,
}

#[derive(Debug, Deserialize)]
struct AlpacaLatestTrade {
    trade: AlpacaTradeRaw,
}

#[derive(Debug, Deserialize)]
struct AlpacaBarRaw {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: i64,
}

#[derive(Debug, Deserialize)]
struct AlpacaBars {
    bars: Vec<AlpacaBarRaw>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_deserializes_trade_and_quote() {
        let json = serde_json::json!({
            "latestTrade": {"p": 10.25, "s": 100},
            "latestQuote": {"bp": 10.20, "ap": 10.30}
        });
        let raw: AlpacaSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(raw.latest_trade.p, 10.25);
        assert_eq!(raw.latest_quote.bp, 10.20);
    }
}

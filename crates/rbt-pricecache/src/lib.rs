//! Price Cache: a tiered read-through over the `price_cache` table.
//!
//! `get(ticker, max_age)` returns the cached quote if it is still fresh,
//! else falls through to a live snapshot, else to the latest trade; every
//! successful fetch writes back to `price_cache` tagged with its source
//! tier. `clean_stale(max_age)` deletes rows older than a bound (default
//! 60 minutes).
//!
//! `normalizer`/`quality`/`provider`/`ingest_csv` are the historical-bar
//! ingestion path: decimal-string bars in, integer-micro `NormalizedBar`s
//! out, with a Stage-A/B data-quality classification feeding
//! `data_quality_log`. They are independent of the live tiered read;
//! `backfill` is the entry point that wires all four together for an
//! operator backfilling bar history from a CSV export.

pub mod backfill;
pub mod ingest_csv;
pub mod normalizer;
pub mod provider;
pub mod quality;

use chrono::{Duration, Utc};
use rbt_schemas::marketdata::MarketData;
use rbt_schemas::PriceCacheEntry;
use sqlx::SqlitePool;

use quality::{classify_snapshot, Severity, ValidationIssue};

/// Default staleness bound for `clean_stale`.
pub const DEFAULT_CLEAN_STALE_MINUTES: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum PriceCacheError {
    #[error("all tiers failed for {ticker}: {last_error}")]
    AllTiersFailed { ticker: String, last_error: String },
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Result of one `get` call: the resolved quote plus any Stage-A/B issues
/// observed while resolving it (empty when the cache tier was used, since a
/// cached row was already validated at the time it was written through).
#[derive(Debug)]
pub struct Resolved {
    pub entry: PriceCacheEntry,
    pub issues: Vec<ValidationIssue>,
}

pub struct PriceCache<M> {
    pool: SqlitePool,
    market: M,
}

impl<M: MarketData> PriceCache<M> {
    pub fn new(pool: SqlitePool, market: M) -> Self {
        Self { pool, market }
    }

    /// Tiered read-through: cache → snapshot → last-trade.
    ///
    /// A CRITICAL Stage-A/B finding (NaN or non-positive price) disqualifies
    /// the snapshot tier and falls through to last-trade; non-CRITICAL
    /// findings are returned alongside the resolved entry for the caller to
    /// log, but do not block the fetch.
    pub async fn get(&self, ticker: &str, max_age: Duration) -> Result<Resolved, PriceCacheError> {
        if let Some(entry) = rbt_db::price_cache::get(&self.pool, ticker).await? {
            if Utc::now() - entry.timestamp <= max_age {
                return Ok(Resolved { entry, issues: Vec::new() });
            }
        }

        if let Ok(snapshot) = self.market.get_snapshot(ticker) {
            let issues = classify_snapshot(
                ticker,
                snapshot.latest_trade.price,
                snapshot.latest_bid.price,
                snapshot.latest_ask.price,
                snapshot.latest_trade.size,
            );
            if !issues.iter().any(|i| i.severity == Severity::Critical) {
                let entry = PriceCacheEntry {
                    ticker: ticker.to_string(),
                    price: snapshot.latest_trade.price,
                    volume: snapshot.latest_trade.size,
                    bid: Some(snapshot.latest_bid.price),
                    ask: Some(snapshot.latest_ask.price),
                    timestamp: Utc::now(),
                    source: "snapshot".to_string(),
                };
                rbt_db::price_cache::write_through(&self.pool, &entry).await?;
                return Ok(Resolved { entry, issues });
            }
        }

        match self.market.get_latest_trade(ticker) {
            Ok(trade) => {
                let issues = classify_snapshot(ticker, trade.price, trade.price, trade.price, trade.size);
                if issues.iter().any(|i| i.severity == Severity::Critical) {
                    return Err(PriceCacheError::AllTiersFailed {
                        ticker: ticker.to_string(),
                        last_error: "last-trade price failed validation".to_string(),
                    });
                }
                let entry = PriceCacheEntry {
                    ticker: ticker.to_string(),
                    price: trade.price,
                    volume: trade.size,
                    bid: None,
                    ask: None,
                    timestamp: Utc::now(),
                    source: "last_trade".to_string(),
                };
                rbt_db::price_cache::write_through(&self.pool, &entry).await?;
                Ok(Resolved { entry, issues })
            }
            Err(e) => Err(PriceCacheError::AllTiersFailed { ticker: ticker.to_string(), last_error: e.to_string() }),
        }
    }

    /// Deletes `price_cache` rows older than `max_age`.
    pub async fn clean_stale(&self, max_age: Duration) -> Result<u64, PriceCacheError> {
        Ok(rbt_db::price_cache::clean_stale(&self.pool, Utc::now() - max_age).await?)
    }

    /// `clean_stale` with the default 60-minute bound.
    pub async fn clean_stale_default(&self) -> Result<u64, PriceCacheError> {
        self.clean_stale(Duration::minutes(DEFAULT_CLEAN_STALE_MINUTES)).await
    }
}

//! `price_cache` table access.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::PriceCacheEntry;
use sqlx::{Row, SqlitePool};

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<PriceCacheEntry> {
    let timestamp: String = row.try_get("timestamp")?;
    Ok(PriceCacheEntry {
        ticker: row.try_get("ticker")?,
        price: row.try_get("price")?,
        volume: row.try_get("volume")?,
        bid: row.try_get("bid")?,
        ask: row.try_get("ask")?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc),
        source: row.try_get("source")?,
    })
}

pub async fn get(pool: &SqlitePool, ticker: &str) -> Result<Option<PriceCacheEntry>> {
    let row = sqlx::query("SELECT * FROM price_cache WHERE ticker = ?")
        .bind(ticker)
        .fetch_optional(pool)
        .await
        .context("get price_cache failed")?;
    row.as_ref().map(row_to_entry).transpose()
}

pub async fn write_through(pool: &SqlitePool, entry: &PriceCacheEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO price_cache (ticker, price, volume, bid, ask, timestamp, source) \
         VALUES (?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(ticker) DO UPDATE SET \
           price = excluded.price, volume = excluded.volume, bid = excluded.bid, \
           ask = excluded.ask, timestamp = excluded.timestamp, source = excluded.source",
    )
    .bind(&entry.ticker)
    .bind(entry.price)
    .bind(entry.volume)
    .bind(entry.bid)
    .bind(entry.ask)
    .bind(entry.timestamp.to_rfc3339())
    .bind(&entry.source)
    .execute(pool)
    .await
    .context("write_through price_cache failed")?;
    Ok(())
}

pub async fn clean_stale(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM price_cache WHERE timestamp < ?")
        .bind(cutoff.to_rfc3339())
        .execute(pool)
        .await
        .context("clean_stale price_cache failed")?;
    Ok(result.rows_affected())
}

//! `ignore_list` table access. `backoff_level` is enforced monotone
//! non-decreasing at the call site in `rbt-risk::ignore_list`, not here;
//! this module is pure storage.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::IgnoreEntry;
use sqlx::{Row, SqlitePool};

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<IgnoreEntry> {
    let ttl_utc: String = row.try_get("ttl_utc")?;
    let first_seen: String = row.try_get("first_seen")?;
    Ok(IgnoreEntry {
        ticker: row.try_get("ticker")?,
        reason_code: row.try_get("reason_code")?,
        scope: row.try_get("scope")?,
        ttl_utc: DateTime::parse_from_rfc3339(&ttl_utc)?.with_timezone(&Utc),
        retry_count: row.try_get("retry_count")?,
        backoff_level: row.try_get::<i64, _>("backoff_level")? as u8,
        first_seen: DateTime::parse_from_rfc3339(&first_seen)?.with_timezone(&Utc),
        notes: row.try_get("notes")?,
    })
}

pub async fn find(pool: &SqlitePool, ticker: &str) -> Result<Option<IgnoreEntry>> {
    let row = sqlx::query("SELECT * FROM ignore_list WHERE ticker = ?")
        .bind(ticker)
        .fetch_optional(pool)
        .await
        .context("find ignore entry failed")?;
    row.as_ref().map(row_to_entry).transpose()
}

pub async fn upsert(pool: &SqlitePool, entry: &IgnoreEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO ignore_list (ticker, reason_code, scope, ttl_utc, retry_count, backoff_level, first_seen, notes) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(ticker) DO UPDATE SET \
           reason_code = excluded.reason_code, \
           scope = excluded.scope, \
           ttl_utc = excluded.ttl_utc, \
           retry_count = excluded.retry_count, \
           backoff_level = excluded.backoff_level, \
           notes = excluded.notes",
    )
    .bind(&entry.ticker)
    .bind(&entry.reason_code)
    .bind(&entry.scope)
    .bind(entry.ttl_utc.to_rfc3339())
    .bind(entry.retry_count)
    .bind(entry.backoff_level as i64)
    .bind(entry.first_seen.to_rfc3339())
    .bind(&entry.notes)
    .execute(pool)
    .await
    .context("upsert ignore entry failed")?;
    Ok(())
}

pub async fn reset(pool: &SqlitePool, ticker: &str) -> Result<()> {
    sqlx::query("DELETE FROM ignore_list WHERE ticker = ?")
        .bind(ticker)
        .execute(pool)
        .await
        .context("reset ignore entry failed")?;
    Ok(())
}
